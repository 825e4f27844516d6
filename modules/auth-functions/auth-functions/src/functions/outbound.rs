use std::collections::BTreeMap;
use std::sync::Arc;

use auth_functions_sdk::{AsyncResultSink, AuthConfig, InvocationContext, Payload};
use tokio::task::JoinHandle;

use super::AuthFunctions;
use crate::domain::request::OutboundCall;

impl AuthFunctions {
    /// `httpGet(url, headers, authConfig, eventHandlers)`.
    ///
    /// The target's parent domain must be in the tenant's HTTP allow-list.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn http_get(
        &self,
        context: InvocationContext,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        auth: Option<AuthConfig>,
        sink: Arc<dyn AsyncResultSink>,
    ) -> JoinHandle<()> {
        let call = OutboundCall::get(context, url);
        self.invoke_http(call, headers, auth, sink)
    }

    /// `httpPost(url, payload, headers, authConfig, eventHandlers)`.
    ///
    /// The payload is sent as JSON unless `headers` set a form
    /// `Content-Type`.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn http_post(
        &self,
        context: InvocationContext,
        url: impl Into<String>,
        payload: Payload,
        headers: BTreeMap<String, String>,
        auth: Option<AuthConfig>,
        sink: Arc<dyn AsyncResultSink>,
    ) -> JoinHandle<()> {
        let call = OutboundCall::post(context, url, payload);
        self.invoke_http(call, headers, auth, sink)
    }

    fn invoke_http(
        &self,
        call: OutboundCall,
        headers: BTreeMap<String, String>,
        auth: Option<AuthConfig>,
        sink: Arc<dyn AsyncResultSink>,
    ) -> JoinHandle<()> {
        let allow_list = self
            .config
            .http_allow_list(self.tenant_config.as_ref(), &call.context.tenant_domain);
        let call = call
            .with_headers(headers)
            .with_auth(auth)
            .with_allow_list(Arc::new(allow_list));
        self.executor.invoke(call, sink)
    }
}
