//! Shared cache of client-credential access tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use auth_functions_sdk::SecretString;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use serde::Deserialize;

/// Cache key: one token per client and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub client_id: String,
    pub tenant_domain: String,
}

impl TokenKey {
    #[must_use]
    pub fn new(client_id: impl Into<String>, tenant_domain: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_domain: tenant_domain.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: SecretString,
    /// `None` when the token carries no readable `exp` claim.
    expires_at: Option<SystemTime>,
}

impl CachedToken {
    fn new(token: SecretString) -> Self {
        let expires_at = decode_expiry(token.expose());
        Self { token, expires_at }
    }

    fn is_valid_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| now < exp)
    }
}

/// Thread-safe token cache.
///
/// Entries whose expiry has passed, or could not be read, are never
/// returned. They are replaced by the next insert rather than evicted.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<TokenKey, CachedToken>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token for `key` if it has not expired.
    #[must_use]
    pub fn get_valid(&self, key: &TokenKey) -> Option<SecretString> {
        self.get_valid_at(key, SystemTime::now())
    }

    fn get_valid_at(&self, key: &TokenKey, now: SystemTime) -> Option<SecretString> {
        let entry = self.entries.get(key)?;
        entry.is_valid_at(now).then(|| entry.token.clone())
    }

    /// Store `token`, replacing any previous entry for `key`.
    pub fn insert(&self, key: TokenKey, token: SecretString) {
        let cached = CachedToken::new(token);
        if cached.expires_at.is_none() {
            tracing::debug!(
                client_id = %key.client_id,
                tenant = %key.tenant_domain,
                "token has no readable expiry; it will be refetched on next use"
            );
        }
        self.entries.insert(key, cached);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: u64,
}

/// Read the `exp` claim of a compact JWT without verifying its signature.
///
/// Any signing algorithm is accepted; the header only has to parse.
fn decode_expiry(token: &str) -> Option<SystemTime> {
    jsonwebtoken::decode_header(token).ok()?;
    let claims = token.split('.').nth(1)?;
    let claims = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
    let ExpClaim { exp } = serde_json::from_slice(&claims).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(exp))
}
