//! Module configuration and per-tenant HTTP settings.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use auth_functions_sdk::{ConfigError, TenantConfigProvider};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use outbound_http::{
    HostnameVerification, PoolConfig, PooledClientConfig, TimeoutConfig, TransportSecurity,
    TrustStore,
};
use serde::{Deserialize, Serialize};

use crate::domain::allow_list::DomainAllowList;

/// Tenant key: connect timeout in milliseconds.
pub const CONNECTION_TIMEOUT_KEY: &str = "AdaptiveAuth.HTTPConnectionTimeout";
/// Tenant key: read timeout in milliseconds.
pub const READ_TIMEOUT_KEY: &str = "AdaptiveAuth.HTTPReadTimeout";
/// Tenant key: wait for a pooled connection, in milliseconds.
pub const CONNECTION_REQUEST_TIMEOUT_KEY: &str = "AdaptiveAuth.HTTPConnectionRequestTimeout";
pub const MAX_TOTAL_CONNECTIONS_KEY: &str = "AdaptiveAuth.MaxTotalConnections";
pub const MAX_CONNECTIONS_PER_ROUTE_KEY: &str = "AdaptiveAuth.MaxTotalConnectionsPerRoute";
/// Tenant key: `STRICT` or `ALLOW_ALL`.
pub const HOSTNAME_VERIFIER_KEY: &str = "AdaptiveAuth.HostnameVerifier";
/// Tenant key: comma-separated allow-list for `http_get`/`http_post`.
pub const HTTP_ALLOWED_DOMAINS_KEY: &str = "AdaptiveAuth.HTTPFunctionAllowedDomains";

/// Section of the application config holding this module's settings.
pub const CONFIG_SECTION: &str = "auth_functions";

/// Prefix of environment overrides, e.g. `AUTH_FUNCTIONS__READ_TIMEOUT=2s`.
pub const ENV_PREFIX: &str = "AUTH_FUNCTIONS__";

/// Module configuration.
///
/// Values here are the server-wide defaults; tenants may override the HTTP
/// tunables through their connector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthFunctionsConfig {
    #[serde(with = "humantime_duration")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub connection_request_timeout: Duration,

    pub max_total_connections: usize,
    pub max_connections_per_route: usize,

    /// `STRICT` or `ALLOW_ALL`; anything else means `STRICT`.
    pub hostname_verification: String,

    /// PEM trust store; the OS store is used when unset.
    pub trust_store: Option<PathBuf>,

    /// Permit plain `http://` targets.
    pub allow_insecure_http: bool,

    /// Maximum response body size in bytes.
    pub max_body_size: usize,

    /// Client-credential token requests per acquisition (at least 1).
    pub token_request_attempts: u32,

    /// Allow-list for `http_get`/`http_post`; empty allows every domain.
    pub http_allowed_domains: Vec<String>,

    /// Allow-list for `call_choreo`; empty allows every domain.
    pub choreo_domains: Vec<String>,

    /// Token endpoint used by `call_choreo`.
    pub choreo_token_endpoint: Option<String>,
}

impl Default for AuthFunctionsConfig {
    fn default() -> Self {
        Self {
            // Timeouts
            connect_timeout: outbound_http::DEFAULT_TIMEOUT,
            read_timeout: outbound_http::DEFAULT_TIMEOUT,
            connection_request_timeout: outbound_http::DEFAULT_TIMEOUT,

            // Pool
            max_total_connections: outbound_http::DEFAULT_MAX_TOTAL_CONNECTIONS,
            max_connections_per_route: outbound_http::DEFAULT_MAX_CONNECTIONS_PER_ROUTE,

            // TLS
            hostname_verification: "STRICT".to_owned(),
            trust_store: None,
            allow_insecure_http: false,

            max_body_size: outbound_http::DEFAULT_MAX_BODY_SIZE,
            token_request_attempts: 2,

            // Allow-lists
            http_allowed_domains: Vec::new(),
            choreo_domains: Vec::new(),
            choreo_token_endpoint: None,
        }
    }
}

impl AuthFunctionsConfig {
    /// Extract the `auth_functions` section from an application figment.
    ///
    /// A missing section yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is present but malformed.
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        if !figment.contains(CONFIG_SECTION) {
            return Ok(Self::default());
        }
        figment
            .extract_inner::<Self>(CONFIG_SECTION)
            .context("invalid auth_functions configuration")
    }

    /// Load from a YAML file, with `AUTH_FUNCTIONS__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is malformed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        std::fs::metadata(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        let figment = Figment::new()
            .merge(Yaml::file_exact(path))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                format!("{CONFIG_SECTION}.{}", key.as_str().to_ascii_lowercase()).into()
            }));
        Self::from_figment(&figment)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    /// Server-wide defaults for tenant HTTP clients.
    #[must_use]
    pub fn default_tenant_http(&self) -> TenantHttpConfig {
        TenantHttpConfig {
            timeouts: TimeoutConfig {
                connect: self.connect_timeout,
                read: self.read_timeout,
                connection_request: self.connection_request_timeout,
            },
            pool: PoolConfig {
                max_total: self.max_total_connections,
                max_per_route: self.max_connections_per_route,
            },
            hostname_verification: HostnameVerification::parse_or_strict(
                &self.hostname_verification,
            ),
        }
    }

    /// Allow-list for the HTTP functions of `tenant_domain`.
    ///
    /// The tenant's comma-separated list wins over the module list.
    #[must_use]
    pub fn http_allow_list(
        &self,
        provider: &dyn TenantConfigProvider,
        tenant_domain: &str,
    ) -> DomainAllowList {
        match provider.connector_config(HTTP_ALLOWED_DOMAINS_KEY, tenant_domain) {
            Some(csv) => DomainAllowList::parse(&csv),
            None => DomainAllowList::new(&self.http_allowed_domains),
        }
    }
}

/// HTTP settings of one tenant's pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantHttpConfig {
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub hostname_verification: HostnameVerification,
}

impl TenantHttpConfig {
    /// Resolve a tenant's settings, falling back to `defaults` for every
    /// absent or unparsable value.
    #[must_use]
    pub fn resolve(
        provider: &dyn TenantConfigProvider,
        defaults: &AuthFunctionsConfig,
        tenant_domain: &str,
    ) -> Self {
        let base = defaults.default_tenant_http();
        let millis = |key: &str, fallback: Duration| {
            lookup::<u64>(provider, key, tenant_domain)
                .map_or(fallback, Duration::from_millis)
        };
        let count = |key: &str, fallback: usize| {
            lookup::<usize>(provider, key, tenant_domain)
                .filter(|n| *n > 0)
                .unwrap_or(fallback)
        };

        Self {
            timeouts: TimeoutConfig {
                connect: millis(CONNECTION_TIMEOUT_KEY, base.timeouts.connect),
                read: millis(READ_TIMEOUT_KEY, base.timeouts.read),
                connection_request: millis(
                    CONNECTION_REQUEST_TIMEOUT_KEY,
                    base.timeouts.connection_request,
                ),
            },
            pool: PoolConfig {
                max_total: count(MAX_TOTAL_CONNECTIONS_KEY, base.pool.max_total),
                max_per_route: count(MAX_CONNECTIONS_PER_ROUTE_KEY, base.pool.max_per_route),
            },
            hostname_verification: provider
                .connector_config(HOSTNAME_VERIFIER_KEY, tenant_domain)
                .map_or(base.hostname_verification, |v| {
                    HostnameVerification::parse_or_strict(&v)
                }),
        }
    }

    /// Pooled client configuration for these settings.
    #[must_use]
    pub fn client_config(&self, module: &AuthFunctionsConfig) -> PooledClientConfig {
        PooledClientConfig {
            timeouts: self.timeouts,
            pool: self.pool,
            hostname_verification: self.hostname_verification,
            trust_store: module
                .trust_store
                .clone()
                .map_or(TrustStore::Native, TrustStore::PemFile),
            transport: if module.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            max_body_size: module.max_body_size,
            ..PooledClientConfig::default()
        }
    }
}

/// Read and parse one tenant value. Unparsable values are logged and
/// reported as absent.
fn lookup<T: FromStr>(
    provider: &dyn TenantConfigProvider,
    key: &str,
    tenant_domain: &str,
) -> Option<T> {
    let raw = provider.connector_config(key, tenant_domain)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            let err = ConfigError::InvalidValue {
                key: key.to_owned(),
                value: raw,
            };
            tracing::warn!(tenant = tenant_domain, error = %err, "using default");
            None
        }
    }
}

/// Serde adapter for `Duration` as humantime strings (`"5s"`, `"250ms"`).
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }

    #[allow(clippy::trivially_copy_pass_by_ref)] // serde `with` signature
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }
}
