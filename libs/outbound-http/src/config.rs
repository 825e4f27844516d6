use std::path::PathBuf;
use std::time::Duration;

/// Default connect, read and connection-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default cap on connections across all routes of one client.
pub const DEFAULT_MAX_TOTAL_CONNECTIONS: usize = 20;

/// Default cap on connections to a single route (scheme + authority).
pub const DEFAULT_MAX_CONNECTIONS_PER_ROUTE: usize = 20;

/// Default maximum response body size (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Timeouts applied to every request of a pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// TCP connect (and TLS handshake) timeout.
    pub connect: Duration,

    /// Time allowed for the response head and the full body to arrive.
    pub read: Duration,

    /// Time a request may wait for a free connection slot.
    pub connection_request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
            connection_request: DEFAULT_TIMEOUT,
        }
    }
}

/// Connection caps for a pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum in-flight connections across all routes (default: 20)
    pub max_total: usize,

    /// Maximum in-flight connections per route (default: 20)
    ///
    /// Also bounds how many idle connections are kept per host.
    pub max_per_route: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: DEFAULT_MAX_TOTAL_CONNECTIONS,
            max_per_route: DEFAULT_MAX_CONNECTIONS_PER_ROUTE,
        }
    }
}

/// Server hostname verification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostnameVerification {
    /// The certificate must be valid for the requested host name.
    #[default]
    Strict,
    /// The certificate chain is verified but any host name is accepted.
    AllowAll,
}

impl HostnameVerification {
    /// Parse a configured mode name (`STRICT` or `ALLOW_ALL`, case-insensitive).
    ///
    /// Unrecognized values fall back to [`HostnameVerification::Strict`].
    #[must_use]
    pub fn parse_or_strict(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("ALLOW_ALL") {
            Self::AllowAll
        } else {
            if !trimmed.eq_ignore_ascii_case("STRICT") {
                tracing::warn!(
                    value = trimmed,
                    "unrecognized hostname verification mode, using STRICT"
                );
            }
            Self::Strict
        }
    }
}

/// Source of trusted root certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrustStore {
    /// OS native root certificate store (loaded once per process)
    #[default]
    Native,
    /// PEM bundle on disk
    PemFile(PathBuf),
}

/// Which URL schemes a client will dial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// `https://` only
    #[default]
    TlsOnly,
    /// `http://` is dialed too; used against local test servers
    AllowInsecureHttp,
}

/// Everything needed to build one [`PooledClient`](crate::PooledClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledClientConfig {
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub hostname_verification: HostnameVerification,
    pub trust_store: TrustStore,
    pub transport: TransportSecurity,

    /// Maximum response body size in bytes (default: 10 MiB)
    pub max_body_size: usize,

    /// Idle connections older than this are closed (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for PooledClientConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            pool: PoolConfig::default(),
            hostname_verification: HostnameVerification::default(),
            trust_store: TrustStore::default(),
            transport: TransportSecurity::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}
