//! Authentication strategies for outbound calls.
//!
//! A strategy is picked from the script-declared `type` string and applied
//! to the request headers before execution.

mod api_key;
mod basic_auth;
mod bearer_token;
mod client_credential;

pub use client_credential::ClientCredentialParams;

use auth_functions_sdk::{
    AuthConfig, InvocationError, UnsupportedStrategyError, ValidationError,
};
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use outbound_http::PooledClient;

use crate::domain::token_fetcher::TokenFetcher;

/// Known authentication strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    ApiKey,
    BasicAuth,
    BearerToken,
    ClientCredential,
}

/// Collaborators a strategy may need while applying credentials.
pub struct CredentialContext<'a> {
    pub tokens: &'a TokenFetcher,
    pub client: &'a PooledClient,
    pub tenant_domain: &'a str,
}

impl CredentialStrategy {
    /// Select the strategy declared by `auth.auth_type` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedStrategyError`] for unknown types.
    pub fn resolve(auth: &AuthConfig) -> Result<Self, UnsupportedStrategyError> {
        match auth.auth_type.trim().to_ascii_lowercase().as_str() {
            "apikey" => Ok(Self::ApiKey),
            "basicauth" => Ok(Self::BasicAuth),
            "bearertoken" => Ok(Self::BearerToken),
            "clientcredential" => Ok(Self::ClientCredential),
            _ => Err(UnsupportedStrategyError {
                auth_type: auth.auth_type.clone(),
            }),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ApiKey => "ApiKey",
            Self::BasicAuth => "BasicAuth",
            Self::BearerToken => "BearerToken",
            Self::ClientCredential => "ClientCredential",
        }
    }

    /// Add this strategy's credentials to `headers`.
    ///
    /// # Errors
    ///
    /// A missing required property is a [`ValidationError`]; exhausted token
    /// requests surface as a `TokenAcquisitionError`.
    pub async fn apply(
        self,
        headers: &mut HeaderMap,
        auth: &AuthConfig,
        ctx: &CredentialContext<'_>,
    ) -> Result<(), InvocationError> {
        match self {
            Self::ApiKey => api_key::apply(headers, auth)?,
            Self::BasicAuth => basic_auth::apply(headers, auth)?,
            Self::BearerToken => bearer_token::apply(headers, auth)?,
            Self::ClientCredential => {
                let params = ClientCredentialParams::from_auth(auth)?;
                let token = ctx
                    .tokens
                    .access_token(&params, ctx.tenant_domain, ctx.client)
                    .await?;
                set_bearer(headers, token.expose())?;
            }
        }
        Ok(())
    }
}

fn required<'a>(
    auth: &'a AuthConfig,
    strategy: &'static str,
    property: &'static str,
) -> Result<&'a str, ValidationError> {
    auth.property(property)
        .ok_or(ValidationError::MissingProperty { strategy, property })
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ValidationError> {
    let name = HeaderName::try_from(name)
        .map_err(|e| ValidationError::InvalidRequest(format!("header name: {e}")))?;
    let mut value = HeaderValue::try_from(value)
        .map_err(|_| ValidationError::InvalidRequest(format!("value of header '{name}'")))?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

pub(crate) fn set_bearer(headers: &mut HeaderMap, token: &str) -> Result<(), ValidationError> {
    set_header(headers, "authorization", &format!("Bearer {token}"))
}

pub(crate) fn basic_credentials(user: &str, password: &str) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}
