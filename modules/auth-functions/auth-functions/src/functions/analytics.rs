use std::collections::BTreeMap;
use std::sync::Arc;

use auth_functions_sdk::{
    AsyncResultSink, AuthConfig, InvocationContext, InvocationError, Outcome, Payload,
    ValidationError,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::AuthFunctions;
use crate::domain::delivery::Delivery;
use crate::domain::executor::{Completion, RequestExecutor};
use crate::domain::request::{OutboundCall, SuccessPolicy};

/// Tenant key: receiver base URLs, separated by `;`.
pub const ANALYTICS_RECEIVER_KEY: &str = "adaptive_authentication.analytics.receiver";
pub const ANALYTICS_BASIC_AUTH_ENABLED_KEY: &str =
    "adaptive_authentication.analytics.basicAuth.enabled";
pub const ANALYTICS_USERNAME_KEY: &str = "adaptive_authentication.analytics.basicAuth.username";
pub const ANALYTICS_PASSWORD_KEY: &str =
    "__secret__adaptive_authentication.analytics.basicAuth.password";

const APPLICATION_KEY: &str = "Application";
const INPUT_STREAM_KEY: &str = "InputStream";
const RECEIVER_URL_KEY: &str = "ReceiverUrl";

impl AuthFunctions {
    /// `callAnalytics(metadata, payloadData, eventHandlers)`.
    ///
    /// Posts `{"event": payload}` to the tenant's analytics receivers, one
    /// host at a time. The first host that answers decides the outcome;
    /// only `200` is success.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn call_analytics(
        &self,
        context: InvocationContext,
        metadata: &BTreeMap<String, String>,
        payload: Payload,
        sink: Arc<dyn AsyncResultSink>,
    ) -> JoinHandle<()> {
        let delivery = Delivery::new(sink, context.clone());
        let calls = self.analytics_calls(context, metadata, payload);
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let completion = match calls {
                Ok(calls) => run_failover(&executor, &calls).await,
                Err(err) => {
                    warn!(error = %err, "analytics call not sent");
                    Completion::failed(&err)
                }
            };
            delivery.deliver(completion.payload, completion.outcome);
        })
    }

    /// `publishToAnalytics(metadata, payloadData)`.
    ///
    /// Same request as [`call_analytics`](Self::call_analytics) without a
    /// result; the outcome is only logged.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn publish_to_analytics(
        &self,
        context: InvocationContext,
        metadata: &BTreeMap<String, String>,
        payload: Payload,
    ) -> JoinHandle<()> {
        let context_id = context.context_id.clone();
        let calls = self.analytics_calls(context, metadata, payload);
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let calls = match calls {
                Ok(calls) => calls,
                Err(err) => {
                    warn!(%context_id, error = %err, "analytics event not published");
                    return;
                }
            };
            let completion = run_failover(&executor, &calls).await;
            if completion.outcome == Outcome::Success {
                debug!(%context_id, "analytics event published");
            } else {
                warn!(
                    %context_id,
                    status = completion.status,
                    outcome = %completion.outcome,
                    "analytics event not accepted"
                );
            }
        })
    }

    fn analytics_calls(
        &self,
        context: InvocationContext,
        metadata: &BTreeMap<String, String>,
        payload: Payload,
    ) -> Result<Vec<OutboundCall>, InvocationError> {
        let tenant = context.tenant_domain.as_str();
        let target_path = target_path(metadata).ok_or_else(|| {
            ValidationError::InvalidRequest("analytics target path cannot be found".to_owned())
        })?;
        let receivers = self
            .tenant_config
            .connector_config(ANALYTICS_RECEIVER_KEY, tenant)
            .ok_or(ValidationError::MissingEndpoint)?;
        let auth = self.analytics_auth(tenant);

        let mut event = Payload::new();
        event.insert("event".to_owned(), Value::Object(payload));

        let calls: Vec<OutboundCall> = receivers
            .split(';')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| {
                OutboundCall::post(context.clone(), target_url(host, &target_path), event.clone())
                    .with_auth(auth.clone())
                    .with_success(SuccessPolicy::OkOnly)
            })
            .collect();
        if calls.is_empty() {
            return Err(ValidationError::MissingEndpoint.into());
        }
        Ok(calls)
    }

    fn analytics_auth(&self, tenant: &str) -> Option<AuthConfig> {
        let enabled = self
            .tenant_config
            .connector_config(ANALYTICS_BASIC_AUTH_ENABLED_KEY, tenant)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if !enabled {
            return None;
        }
        let value = |key| self.tenant_config.connector_config(key, tenant).unwrap_or_default();
        Some(AuthConfig::new(
            "basicauth",
            [
                ("username", value(ANALYTICS_USERNAME_KEY)),
                ("password", value(ANALYTICS_PASSWORD_KEY)),
            ],
        ))
    }
}

/// `/{Application}/{InputStream}`, or the `ReceiverUrl` entry.
fn target_path(metadata: &BTreeMap<String, String>) -> Option<String> {
    match (metadata.get(APPLICATION_KEY), metadata.get(INPUT_STREAM_KEY)) {
        (Some(app), Some(stream)) => Some(format!("/{app}/{stream}")),
        _ => metadata.get(RECEIVER_URL_KEY).cloned(),
    }
}

/// Receiver scheme, host and port joined with the target path and query.
///
/// An unparsable host is passed through so the request fails as an
/// invalid URL.
fn target_url(host: &str, target_path: &str) -> String {
    let Ok(mut url) = Url::parse(host) else {
        return format!("{}{target_path}", host.trim_end_matches('/'));
    };
    let (path, query) = match target_path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target_path, None),
    };
    url.set_path(path);
    url.set_query(query);
    url.set_fragment(None);
    url.to_string()
}

/// Try each receiver until one answers.
async fn run_failover(executor: &RequestExecutor, calls: &[OutboundCall]) -> Completion {
    let mut last = None;
    for call in calls {
        let completion = executor.run(call).await;
        if completion.reached_server() {
            return completion;
        }
        debug!(url = call.url.as_deref(), "analytics receiver unreachable");
        last = Some(completion);
    }
    last.unwrap_or_else(|| Completion::failed(&ValidationError::MissingEndpoint.into()))
}
