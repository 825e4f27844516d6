use auth_functions_sdk::{AuthConfig, ValidationError};
use http::HeaderMap;

use super::{required, set_header};

pub const DEFAULT_HEADER: &str = "X-API-KEY";

pub(super) fn apply(headers: &mut HeaderMap, auth: &AuthConfig) -> Result<(), ValidationError> {
    let key = required(auth, "ApiKey", "apiKey")?;
    let header = auth.property("headerName").unwrap_or(DEFAULT_HEADER);
    set_header(headers, header, key)
}
