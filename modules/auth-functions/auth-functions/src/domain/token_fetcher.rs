//! Client-credential token acquisition with bounded retry.

use std::sync::Arc;

use auth_functions_sdk::{SecretString, TokenAcquisitionError};
use outbound_http::{HttpError, PooledClient};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::credentials::ClientCredentialParams;
use super::request::{APPLICATION_JSON, FORM_URLENCODED};
use super::token_cache::{TokenCache, TokenKey};
use crate::domain::credentials::basic_credentials;

/// Failure of a single token request.
#[derive(Debug, Error)]
enum TokenRequestError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("token endpoint returned HTTP {0}")]
    Status(u16),

    #[error("token response is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),

    #[error("token response has no access_token")]
    MissingToken,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Obtains access tokens, consulting the shared [`TokenCache`] first.
#[derive(Debug, Clone)]
pub struct TokenFetcher {
    cache: Arc<TokenCache>,
    max_request_attempts: u32,
}

impl TokenFetcher {
    /// `max_request_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn new(cache: Arc<TokenCache>, max_request_attempts: u32) -> Self {
        Self {
            cache,
            max_request_attempts: max_request_attempts.max(1),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    #[must_use]
    pub fn max_request_attempts(&self) -> u32 {
        self.max_request_attempts
    }

    /// A valid token for `params.consumer_key` in `tenant_domain`.
    ///
    /// Returns the cached token without any network call when it has not
    /// expired; otherwise requests a new one.
    ///
    /// # Errors
    ///
    /// Returns [`TokenAcquisitionError`] when every attempt failed.
    pub async fn access_token(
        &self,
        params: &ClientCredentialParams,
        tenant_domain: &str,
        client: &PooledClient,
    ) -> Result<SecretString, TokenAcquisitionError> {
        let key = TokenKey::new(&params.consumer_key, tenant_domain);
        if let Some(token) = self.cache.get_valid(&key) {
            debug!(client_id = %key.client_id, tenant = tenant_domain, "using cached access token");
            return Ok(token);
        }
        self.fetch(params, key, client).await
    }

    /// Request a new token regardless of the cache and store it.
    ///
    /// # Errors
    ///
    /// Returns [`TokenAcquisitionError`] when every attempt failed.
    pub async fn refresh(
        &self,
        params: &ClientCredentialParams,
        tenant_domain: &str,
        client: &PooledClient,
    ) -> Result<SecretString, TokenAcquisitionError> {
        let key = TokenKey::new(&params.consumer_key, tenant_domain);
        self.fetch(params, key, client).await
    }

    async fn fetch(
        &self,
        params: &ClientCredentialParams,
        key: TokenKey,
        client: &PooledClient,
    ) -> Result<SecretString, TokenAcquisitionError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_request_attempts {
            match request_access_token(params, client).await {
                Ok(token) => {
                    debug!(
                        client_id = %key.client_id,
                        tenant = %key.tenant_domain,
                        attempt,
                        "access token acquired"
                    );
                    self.cache.insert(key, token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    warn!(
                        client_id = %key.client_id,
                        tenant = %key.tenant_domain,
                        endpoint = %params.token_endpoint,
                        attempt,
                        max_attempts = self.max_request_attempts,
                        error = %e,
                        "access token request failed"
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(TokenAcquisitionError {
            attempts: self.max_request_attempts,
            last_error,
        })
    }
}

async fn request_access_token(
    params: &ClientCredentialParams,
    client: &PooledClient,
) -> Result<SecretString, TokenRequestError> {
    let mut form = vec![("grant_type", "client_credentials")];
    if let Some(scope) = &params.scope {
        form.push(("scope", scope.as_str()));
    }

    let response = client
        .post(&params.token_endpoint)
        .header("accept", APPLICATION_JSON)
        .header("content-type", FORM_URLENCODED)
        .header(
            "authorization",
            &basic_credentials(&params.consumer_key, params.consumer_secret.expose()),
        )
        .form(&form)?
        .send()
        .await?;

    if !response.is_success() {
        return Err(TokenRequestError::Status(response.status().as_u16()));
    }
    response
        .json::<TokenResponse>()?
        .access_token
        .filter(|t| !t.is_empty())
        .map(SecretString::new)
        .ok_or(TokenRequestError::MissingToken)
}
