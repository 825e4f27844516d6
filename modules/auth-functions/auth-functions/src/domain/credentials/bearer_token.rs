use auth_functions_sdk::{AuthConfig, ValidationError};
use http::HeaderMap;

use super::{required, set_bearer};

pub(super) fn apply(headers: &mut HeaderMap, auth: &AuthConfig) -> Result<(), ValidationError> {
    set_bearer(headers, required(auth, "BearerToken", "token")?)
}
