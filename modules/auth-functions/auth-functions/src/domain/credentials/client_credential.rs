use auth_functions_sdk::{AuthConfig, SecretString, ValidationError};

use super::required;

/// Client-credential grant parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentialParams {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub token_endpoint: String,
    pub scope: Option<String>,
}

impl ClientCredentialParams {
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: SecretString,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token_endpoint: token_endpoint.into(),
            scope: None,
        }
    }

    /// Read `consumerKey`, `consumerSecret`, `tokenEndpoint` and the optional
    /// `scope` from the auth properties.
    ///
    /// # Errors
    ///
    /// Returns `MissingProperty` naming the first absent required property.
    pub fn from_auth(auth: &AuthConfig) -> Result<Self, ValidationError> {
        const STRATEGY: &str = "ClientCredential";
        Ok(Self {
            consumer_key: required(auth, STRATEGY, "consumerKey")?.to_owned(),
            consumer_secret: SecretString::new(required(auth, STRATEGY, "consumerSecret")?),
            token_endpoint: required(auth, STRATEGY, "tokenEndpoint")?.to_owned(),
            scope: auth.property("scope").map(str::to_owned),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn reads_all_properties() {
        let auth = AuthConfig::new(
            "clientcredential",
            [
                ("consumerKey", "ck"),
                ("consumerSecret", "cs"),
                ("tokenEndpoint", "https://sts.example.com/token"),
                ("scope", "risk:read"),
            ],
        );
        let params = ClientCredentialParams::from_auth(&auth).unwrap();
        assert_eq!(params.consumer_key, "ck");
        assert_eq!(params.consumer_secret.expose(), "cs");
        assert_eq!(params.scope.as_deref(), Some("risk:read"));
        assert!(!format!("{params:?}").contains("cs\""));
    }

    #[test]
    fn token_endpoint_is_required() {
        let auth = AuthConfig::new(
            "clientcredential",
            [("consumerKey", "ck"), ("consumerSecret", "cs")],
        );
        let err = ClientCredentialParams::from_auth(&auth).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingProperty {
                strategy: "ClientCredential",
                property: "tokenEndpoint"
            }
        );
    }
}
