use auth_functions_sdk::{AuthConfig, ValidationError};
use http::HeaderMap;

use super::{basic_credentials, required, set_header};

pub(super) fn apply(headers: &mut HeaderMap, auth: &AuthConfig) -> Result<(), ValidationError> {
    let username = required(auth, "BasicAuth", "username")?;
    let password = required(auth, "BasicAuth", "password")?;
    set_header(headers, "authorization", &basic_credentials(username, password))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn sets_basic_authorization() {
        let mut headers = HeaderMap::new();
        let auth = AuthConfig::new("basicauth", [("username", "alice"), ("password", "secret")]);
        apply(&mut headers, &auth).unwrap();
        assert_eq!(headers["authorization"], "Basic YWxpY2U6c2VjcmV0");
        assert!(headers["authorization"].is_sensitive());
    }

    #[test]
    fn password_is_required() {
        let mut headers = HeaderMap::new();
        let err = apply(&mut headers, &AuthConfig::new("basicauth", [("username", "alice")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingProperty {
                property: "password",
                ..
            }
        ));
    }
}
