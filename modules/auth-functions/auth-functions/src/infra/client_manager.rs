//! Per-tenant pooled HTTP clients.

use std::sync::Arc;

use auth_functions_sdk::TenantConfigProvider;
use dashmap::DashMap;
use outbound_http::{HttpError, PooledClient, PooledClientBuilder};
use tracing::{debug, info};

use crate::config::{AuthFunctionsConfig, TenantHttpConfig};

/// Owns one pooled client per tenant domain.
///
/// Clients are built on first use from the tenant's resolved
/// [`TenantHttpConfig`] and live until [`close_client`](Self::close_client).
pub struct HttpClientManager {
    clients: DashMap<String, PooledClient>,
    config: Arc<AuthFunctionsConfig>,
    tenant_config: Arc<dyn TenantConfigProvider>,
}

impl HttpClientManager {
    #[must_use]
    pub fn new(config: Arc<AuthFunctionsConfig>, tenant_config: Arc<dyn TenantConfigProvider>) -> Self {
        Self {
            clients: DashMap::new(),
            config,
            tenant_config,
        }
    }

    /// The tenant's client, created if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn get_client(&self, tenant_domain: &str) -> Result<PooledClient, HttpError> {
        if let Some(client) = self.clients.get(tenant_domain) {
            return Ok(client.clone());
        }

        let settings =
            TenantHttpConfig::resolve(self.tenant_config.as_ref(), &self.config, tenant_domain);
        let client =
            PooledClientBuilder::with_config(settings.client_config(&self.config)).build()?;

        // A concurrent caller may have won; keep whichever was stored first
        let client = self
            .clients
            .entry(tenant_domain.to_owned())
            .or_insert(client)
            .clone();
        info!(
            tenant = tenant_domain,
            connect_timeout = ?settings.timeouts.connect,
            read_timeout = ?settings.timeouts.read,
            max_total = settings.pool.max_total,
            max_per_route = settings.pool.max_per_route,
            hostname_verification = ?settings.hostname_verification,
            "tenant HTTP client ready"
        );
        Ok(client)
    }

    /// Close and forget the tenant's client. No-op when none exists.
    pub fn close_client(&self, tenant_domain: &str) {
        if let Some((_, client)) = self.clients.remove(tenant_domain) {
            client.close();
            debug!(tenant = tenant_domain, "tenant HTTP client closed");
        }
    }

    /// Close every client, e.g. on shutdown.
    pub fn close_all(&self) {
        let tenants: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for tenant in &tenants {
            self.close_client(tenant);
        }
    }

    /// Number of live tenant clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &AuthFunctionsConfig {
        &self.config
    }

    #[must_use]
    pub fn tenant_config(&self) -> &Arc<dyn TenantConfigProvider> {
        &self.tenant_config
    }
}
