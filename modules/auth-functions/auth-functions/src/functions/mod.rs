//! Functions bound into adaptive authentication scripts.
//!
//! Each function returns as soon as the work is scheduled; the result
//! reaches the script through its [`AsyncResultSink`](auth_functions_sdk::AsyncResultSink).

mod analytics;
mod choreo;
mod outbound;

pub use analytics::{
    ANALYTICS_BASIC_AUTH_ENABLED_KEY, ANALYTICS_PASSWORD_KEY, ANALYTICS_RECEIVER_KEY,
    ANALYTICS_USERNAME_KEY,
};
pub use choreo::{
    CONSUMER_KEY_KEY, CONSUMER_SECRET_KEY, INACTIVE_TOKEN_CODE, MAX_TOKEN_REFRESHES,
    TOKEN_ENDPOINT_KEY, URL_KEY,
};

use std::sync::Arc;

use auth_functions_sdk::TenantConfigProvider;

use crate::config::AuthFunctionsConfig;
use crate::domain::allow_list::DomainAllowList;
use crate::domain::executor::RequestExecutor;
use crate::domain::token_cache::TokenCache;
use crate::domain::token_fetcher::TokenFetcher;
use crate::infra::client_manager::HttpClientManager;

/// Entry point for the script-facing functions.
///
/// Holds the shared token cache and tenant clients; build one per process
/// and share it.
pub struct AuthFunctions {
    config: Arc<AuthFunctionsConfig>,
    tenant_config: Arc<dyn TenantConfigProvider>,
    executor: RequestExecutor,
    choreo_allow_list: Arc<DomainAllowList>,
}

impl AuthFunctions {
    #[must_use]
    pub fn new(config: AuthFunctionsConfig, tenant_config: Arc<dyn TenantConfigProvider>) -> Self {
        let config = Arc::new(config);
        let clients = Arc::new(HttpClientManager::new(config.clone(), tenant_config.clone()));
        let tokens = TokenFetcher::new(Arc::new(TokenCache::new()), config.token_request_attempts);
        let choreo_allow_list = Arc::new(DomainAllowList::new(&config.choreo_domains));
        Self {
            config,
            tenant_config,
            executor: RequestExecutor::new(clients, tokens),
            choreo_allow_list,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthFunctionsConfig {
        &self.config
    }

    #[must_use]
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    #[must_use]
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        self.executor.tokens().cache()
    }

    #[must_use]
    pub fn clients(&self) -> &Arc<HttpClientManager> {
        self.executor.clients()
    }

    /// Release the tenant's pooled connections.
    pub fn on_tenant_unloaded(&self, tenant_domain: &str) {
        tracing::info!(tenant = tenant_domain, "tenant unloaded");
        self.executor.clients().close_client(tenant_domain);
    }

    /// Close every tenant client.
    pub fn shutdown(&self) {
        self.executor.clients().close_all();
    }
}
