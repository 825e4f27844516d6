//! In-memory tenant configuration.

use auth_functions_sdk::TenantConfigProvider;
use dashmap::DashMap;

/// Tenant that applies to every tenant without its own value.
pub const ANY_TENANT: &str = "*";

/// [`TenantConfigProvider`] backed by an in-memory map.
///
/// Values set for [`ANY_TENANT`] act as fallbacks for all tenants.
#[derive(Debug, Default)]
pub struct StaticTenantConfig {
    values: DashMap<(String, String), String>,
}

impl StaticTenantConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, tenant_domain: &str, key: &str, value: &str) -> Self {
        self.set(tenant_domain, key, value);
        self
    }

    pub fn set(&self, tenant_domain: &str, key: &str, value: &str) {
        self.values
            .insert((tenant_domain.to_owned(), key.to_owned()), value.to_owned());
    }

    pub fn remove(&self, tenant_domain: &str, key: &str) {
        self.values
            .remove(&(tenant_domain.to_owned(), key.to_owned()));
    }
}

impl TenantConfigProvider for StaticTenantConfig {
    fn connector_config(&self, key: &str, tenant_domain: &str) -> Option<String> {
        let lookup = |tenant: &str| {
            self.values
                .get(&(tenant.to_owned(), key.to_owned()))
                .map(|v| v.value().clone())
        };
        lookup(tenant_domain).or_else(|| lookup(ANY_TENANT))
    }
}
