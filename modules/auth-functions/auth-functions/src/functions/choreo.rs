use std::collections::BTreeMap;
use std::sync::Arc;

use auth_functions_sdk::{AsyncResultSink, AuthConfig, InvocationContext, Payload};
use http::Method;
use tokio::task::JoinHandle;
use tracing::warn;

use super::AuthFunctions;
use crate::domain::delivery::Delivery;
use crate::domain::executor::{Completion, RequestExecutor};
use crate::domain::request::{OutboundCall, SuccessPolicy};

pub const URL_KEY: &str = "url";
pub const CONSUMER_KEY_KEY: &str = "consumerKey";
pub const CONSUMER_SECRET_KEY: &str = "consumerSecret";
pub const TOKEN_ENDPOINT_KEY: &str = "tokenEndpoint";

/// Error code of a 401 caused by an inactive or revoked access token.
pub const INACTIVE_TOKEN_CODE: &str = "900901";

/// Token refreshes allowed per call after inactive-token rejections.
pub const MAX_TOKEN_REFRESHES: u32 = 2;

impl AuthFunctions {
    /// `callChoreo(connectionMetadata, payload, eventHandlers)`.
    ///
    /// POSTs `payload` to `connection_metadata["url"]` with a bearer token
    /// obtained through the client-credential grant. Only `200` counts as
    /// success.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn call_choreo(
        &self,
        context: InvocationContext,
        connection_metadata: &BTreeMap<String, String>,
        payload: Payload,
        sink: Arc<dyn AsyncResultSink>,
    ) -> JoinHandle<()> {
        let mut auth = vec![
            (CONSUMER_KEY_KEY.to_owned(), lookup(connection_metadata, CONSUMER_KEY_KEY)),
            (
                CONSUMER_SECRET_KEY.to_owned(),
                lookup(connection_metadata, CONSUMER_SECRET_KEY),
            ),
        ];
        // Module config wins over the connection metadata.
        if let Some(endpoint) = self
            .config
            .choreo_token_endpoint
            .as_ref()
            .or_else(|| connection_metadata.get(TOKEN_ENDPOINT_KEY))
        {
            auth.push((TOKEN_ENDPOINT_KEY.to_owned(), endpoint.clone()));
        }

        let call = OutboundCall::new(
            context,
            Method::POST,
            connection_metadata.get(URL_KEY).cloned(),
        )
        .with_payload(payload)
        .with_auth(Some(AuthConfig::new("clientcredential", auth)))
        .with_allow_list(self.choreo_allow_list.clone())
        .with_success(SuccessPolicy::OkOnly);

        let delivery = Delivery::new(sink, call.context.clone());
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let completion = run_with_refresh(&executor, &call).await;
            delivery.deliver(completion.payload, completion.outcome);
        })
    }
}

fn lookup(metadata: &BTreeMap<String, String>, key: &str) -> String {
    metadata.get(key).cloned().unwrap_or_default()
}

fn is_inactive_token(completion: &Completion) -> bool {
    completion.status == Some(401) && completion.error_code.as_deref() == Some(INACTIVE_TOKEN_CODE)
}

async fn run_with_refresh(executor: &RequestExecutor, call: &OutboundCall) -> Completion {
    let mut completion = executor.run(call).await;
    let mut refreshes = 0;
    while is_inactive_token(&completion) {
        if refreshes == MAX_TOKEN_REFRESHES {
            warn!(
                context_id = %call.context.context_id,
                refreshes,
                "access token still rejected as inactive"
            );
            break;
        }
        refreshes += 1;
        warn!(
            context_id = %call.context.context_id,
            attempt = refreshes,
            "access token rejected as inactive; refreshing"
        );
        if let Err(err) = executor.refresh_credentials(call).await {
            warn!(context_id = %call.context.context_id, error = %err, "token refresh failed");
            return Completion::failed(&err);
        }
        completion = executor.run(call).await;
    }
    completion
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use auth_functions_sdk::Outcome;

    fn completion(status: Option<u16>, code: Option<&str>) -> Completion {
        Completion {
            outcome: Outcome::Fail,
            payload: Payload::new(),
            status,
            error_code: code.map(str::to_owned),
        }
    }

    #[test]
    fn only_401_with_inactive_code_triggers_refresh() {
        assert!(is_inactive_token(&completion(Some(401), Some("900901"))));
        assert!(!is_inactive_token(&completion(Some(401), Some("900902"))));
        assert!(!is_inactive_token(&completion(Some(403), Some("900901"))));
        assert!(!is_inactive_token(&completion(Some(401), None)));
        assert!(!is_inactive_token(&completion(None, None)));
    }
}
