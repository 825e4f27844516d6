use crate::config::{
    HostnameVerification, PooledClientConfig, TimeoutConfig, TransportSecurity, TrustStore,
};
use crate::error::{HttpError, chain_timed_out};
use crate::request::RequestBuilder;
use crate::response::PooledResponse;
use crate::timeout::ReadTimeoutConnector;
use crate::tls;
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type HyperClient = Client<HttpsConnector<ReadTimeoutConnector>, Full<Bytes>>;

/// Pooled HTTP client with per-route and total connection caps.
///
/// Cheap to clone; clones share the connection pool and the caps. Redirects
/// are never followed. Every request is bounded by three timeouts: waiting for
/// a connection slot, connecting, and reading the response.
#[derive(Clone)]
pub struct PooledClient {
    inner: Arc<Inner>,
}

struct Inner {
    hyper: HyperClient,
    limits: ConnectionLimits,
    timeouts: TimeoutConfig,
    max_body_size: usize,
    transport: TransportSecurity,
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("timeouts", &self.inner.timeouts)
            .field("max_total", &self.inner.limits.max_total)
            .field("max_per_route", &self.inner.limits.max_per_route)
            .field("transport", &self.inner.transport)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct ConnectionLimits {
    total: Arc<Semaphore>,
    per_route: Arc<RouteSlots>,
    max_total: usize,
    max_per_route: usize,
}

/// Per-route semaphores. An entry lives only while a request holds or
/// waits for one of its slots.
struct RouteSlots {
    routes: DashMap<String, Arc<Semaphore>>,
    max_per_route: usize,
}

impl RouteSlots {
    fn slots(&self, route: &str) -> Arc<Semaphore> {
        Arc::clone(
            self.routes
                .entry(route.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_route)))
                .value(),
        )
    }

    /// Drop the entry for `route` if nobody holds or awaits its slots.
    fn prune(&self, route: &str) {
        self.routes.remove_if(route, |_, slots| {
            Arc::strong_count(slots) == 1 && slots.available_permits() == self.max_per_route
        });
    }
}

/// Slots held for the duration of one exchange.
struct ConnectionPermit {
    route_slot: Option<OwnedSemaphorePermit>,
    _total: OwnedSemaphorePermit,
    route: String,
    slots: Arc<RouteSlots>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        drop(self.route_slot.take());
        self.slots.prune(&self.route);
    }
}

impl ConnectionLimits {
    fn new(max_total: usize, max_per_route: usize) -> Self {
        let max_total = max_total.clamp(1, Semaphore::MAX_PERMITS);
        let max_per_route = max_per_route.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            total: Arc::new(Semaphore::new(max_total)),
            per_route: Arc::new(RouteSlots {
                routes: DashMap::new(),
                max_per_route,
            }),
            max_total,
            max_per_route,
        }
    }

    async fn acquire(&self, route: &str, wait: Duration) -> Result<ConnectionPermit, HttpError> {
        if self.total.is_closed() {
            return Err(HttpError::Closed);
        }

        let route_slots = self.per_route.slots(route);
        let total = Arc::clone(&self.total);

        let slots = async move {
            let route_slot = route_slots.acquire_owned().await?;
            let total = total.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((route_slot, total))
        };

        match tokio::time::timeout(wait, slots).await {
            Ok(Ok((route_slot, total))) => Ok(ConnectionPermit {
                route_slot: Some(route_slot),
                _total: total,
                route: route.to_owned(),
                slots: Arc::clone(&self.per_route),
            }),
            Ok(Err(_)) => Err(HttpError::Closed),
            Err(_) => {
                self.per_route.prune(route);
                Err(HttpError::PoolTimeout(wait))
            }
        }
    }

    fn close(&self) {
        self.total.close();
        for route in &self.per_route.routes {
            route.value().close();
        }
    }

    #[cfg(test)]
    fn tracked_routes(&self) -> usize {
        self.per_route.routes.len()
    }
}

/// Route key used for the per-route cap: scheme plus authority.
fn route_key(uri: &http::Uri) -> String {
    format!(
        "{}://{}",
        uri.scheme_str().unwrap_or("http"),
        uri.authority().map_or("", http::uri::Authority::as_str)
    )
}

impl PooledClient {
    /// Create a builder with default configuration
    #[must_use]
    pub fn builder() -> PooledClientBuilder {
        PooledClientBuilder::new()
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    /// Start a POST request
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }

    /// Start a request with an arbitrary method
    pub fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.to_owned())
    }

    #[must_use]
    pub fn timeouts(&self) -> TimeoutConfig {
        self.inner.timeouts
    }

    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        self.inner.transport
    }

    /// Stop admitting requests. Requests waiting for a slot fail with
    /// [`HttpError::Closed`]; in-flight exchanges run to completion. Pooled
    /// connections are released when the last clone is dropped.
    pub fn close(&self) {
        self.inner.limits.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.limits.total.is_closed()
    }

    pub(crate) async fn execute(
        &self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<PooledResponse, HttpError> {
        let timeouts = self.inner.timeouts;
        let route = route_key(request.uri());
        let _permit = self
            .inner
            .limits
            .acquire(&route, timeouts.connection_request)
            .await?;

        // Connect is bounded by the connector; reads by the per-connection read timeout.
        let response = self
            .inner
            .hyper
            .request(request)
            .await
            .map_err(|e| HttpError::from_client_error(e, timeouts))?;

        let (parts, body) = response.into_parts();
        let limit = self.inner.max_body_size;
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => return Err(HttpError::BodyTooLarge { limit }),
            Err(e) if chain_timed_out(&*e) => {
                return Err(HttpError::ReadTimeout(timeouts.read));
            }
            Err(e) => return Err(HttpError::Transport(e)),
        };

        Ok(PooledResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Builder for [`PooledClient`].
#[derive(Debug, Clone, Default)]
pub struct PooledClientBuilder {
    config: PooledClientConfig,
}

impl PooledClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: PooledClientConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.connect = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.read = timeout;
        self
    }

    #[must_use]
    pub fn connection_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.connection_request = timeout;
        self
    }

    /// Cap on in-flight connections across all routes (clamped to at least 1)
    #[must_use]
    pub fn max_total_connections(mut self, max: usize) -> Self {
        self.config.pool.max_total = max;
        self
    }

    /// Cap on in-flight connections per route (clamped to at least 1)
    #[must_use]
    pub fn max_connections_per_route(mut self, max: usize) -> Self {
        self.config.pool.max_per_route = max;
        self
    }

    #[must_use]
    pub fn hostname_verification(mut self, mode: HostnameVerification) -> Self {
        self.config.hostname_verification = mode;
        self
    }

    #[must_use]
    pub fn trust_store(mut self, trust_store: TrustStore) -> Self {
        self.config.trust_store = trust_store;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain HTTP targets (for testing with mock servers)
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Build the pooled client.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` if the trust store or TLS context cannot be built.
    pub fn build(self) -> Result<PooledClient, HttpError> {
        let config = self.config;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!("insecure HTTP enabled; plain http:// targets will not be encrypted");
        }

        let tls_config = tls::client_config(&config.trust_store, config.hostname_verification)?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.timeouts.connect));

        let tcp = ReadTimeoutConnector::new(http, config.timeouts.read);

        let builder = hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls_config);
        let https = if config.transport == TransportSecurity::AllowInsecureHttp {
            builder
                .https_or_http()
                .enable_all_versions()
                .wrap_connector(tcp)
        } else {
            builder.https_only().enable_all_versions().wrap_connector(tcp)
        };

        // pool_timer is required for pool_idle_timeout to take effect
        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool.max_per_route);
        if let Some(idle) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle);
        }
        let hyper = client_builder.build::<_, Full<Bytes>>(https);

        tracing::debug!(
            connect_timeout = ?config.timeouts.connect,
            read_timeout = ?config.timeouts.read,
            connection_request_timeout = ?config.timeouts.connection_request,
            max_total = config.pool.max_total,
            max_per_route = config.pool.max_per_route,
            hostname_verification = ?config.hostname_verification,
            "built pooled HTTP client"
        );

        Ok(PooledClient {
            inner: Arc::new(Inner {
                hyper,
                limits: ConnectionLimits::new(config.pool.max_total, config.pool.max_per_route),
                timeouts: config.timeouts,
                max_body_size: config.max_body_size,
                transport: config.transport,
            }),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_route_key() {
        let uri: http::Uri = "https://svc.example.com:8443/a/b?c=d".parse().unwrap();
        assert_eq!(route_key(&uri), "https://svc.example.com:8443");
    }

    #[tokio::test]
    async fn test_limits_time_out_when_route_is_saturated() {
        let limits = ConnectionLimits::new(10, 1);
        let held = limits
            .acquire("http://a", Duration::from_millis(50))
            .await
            .unwrap();

        let err = limits
            .acquire("http://a", Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HttpError::PoolTimeout(_)));

        // Other routes are unaffected
        assert!(limits.acquire("http://b", Duration::from_millis(50)).await.is_ok());

        drop(held);
        assert!(limits.acquire("http://a", Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_limits_total_cap_spans_routes() {
        let limits = ConnectionLimits::new(1, 5);
        let _held = limits
            .acquire("http://a", Duration::from_millis(50))
            .await
            .unwrap();
        let err = limits
            .acquire("http://b", Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HttpError::PoolTimeout(_)));
    }

    #[tokio::test]
    async fn test_closed_limits_reject() {
        let limits = ConnectionLimits::new(2, 2);
        limits.close();
        let err = limits
            .acquire("http://a", Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HttpError::Closed));
    }

    #[tokio::test]
    async fn idle_routes_are_forgotten() {
        let limits = ConnectionLimits::new(10, 2);
        let a = limits.acquire("http://a", Duration::from_millis(50)).await.unwrap();
        let a2 = limits.acquire("http://a", Duration::from_millis(50)).await.unwrap();
        let b = limits.acquire("http://b", Duration::from_millis(50)).await.unwrap();
        assert_eq!(limits.tracked_routes(), 2);

        drop(a);
        assert_eq!(limits.tracked_routes(), 2, "route a still has a slot in use");
        drop(a2);
        drop(b);
        assert_eq!(limits.tracked_routes(), 0);
    }

    #[tokio::test]
    async fn timed_out_waiter_does_not_pin_its_route() {
        let limits = ConnectionLimits::new(1, 5);
        let held = limits.acquire("http://a", Duration::from_millis(50)).await.unwrap();
        let err = limits
            .acquire("http://b", Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HttpError::PoolTimeout(_)));
        assert_eq!(limits.tracked_routes(), 1);

        drop(held);
        assert_eq!(limits.tracked_routes(), 0);
    }

    #[tokio::test]
    async fn test_zero_caps_are_clamped() {
        let limits = ConnectionLimits::new(0, 0);
        assert!(limits.acquire("http://a", Duration::from_millis(50)).await.is_ok());
    }
}
