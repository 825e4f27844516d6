//! Outbound call state machine.
//!
//! Every call goes through building, domain validation, authentication,
//! execution and classification, and ends in exactly one delivery.

use std::sync::Arc;
use std::time::Instant;

use auth_functions_sdk::{
    AsyncResultSink, InvocationError, Outcome, Payload, ProtocolError, TransportError,
    ValidationError,
};
use http::StatusCode;
use outbound_http::{HttpError, PooledClient, PooledResponse};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::credentials::{ClientCredentialParams, CredentialContext, CredentialStrategy};
use super::delivery::Delivery;
use super::request::{OutboundCall, OutboundRequest, RequestBody, SuccessPolicy};
use super::token_fetcher::TokenFetcher;
use crate::infra::client_manager::HttpClientManager;

/// Key under which a `text/plain` response body is wrapped.
pub const TEXT_RESPONSE_KEY: &str = "response";

/// Final state of one call, before delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub outcome: Outcome,
    /// Parsed body on success, empty otherwise.
    pub payload: Payload,
    /// Response status, when the server answered.
    pub status: Option<u16>,
    /// `code` field of an error response body, if any.
    pub error_code: Option<String>,
}

impl Completion {
    fn success(status: StatusCode, payload: Payload) -> Self {
        Self {
            outcome: Outcome::Success,
            payload,
            status: Some(status.as_u16()),
            error_code: None,
        }
    }

    fn rejected(status: StatusCode, error_code: Option<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            payload: Payload::new(),
            status: Some(status.as_u16()),
            error_code,
        }
    }

    /// Completion for a call that failed before a usable response.
    #[must_use]
    pub fn failed(err: &InvocationError) -> Self {
        Self {
            outcome: err.outcome(),
            payload: Payload::new(),
            status: None,
            error_code: None,
        }
    }

    /// Whether an HTTP response was received.
    #[must_use]
    pub fn reached_server(&self) -> bool {
        self.status.is_some()
    }
}

/// Runs outbound calls on tenant clients.
#[derive(Clone)]
pub struct RequestExecutor {
    clients: Arc<HttpClientManager>,
    tokens: TokenFetcher,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(clients: Arc<HttpClientManager>, tokens: TokenFetcher) -> Self {
        Self { clients, tokens }
    }

    #[must_use]
    pub fn clients(&self) -> &Arc<HttpClientManager> {
        &self.clients
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenFetcher {
        &self.tokens
    }

    /// Run `call` on the Tokio runtime and deliver its result to `sink`.
    ///
    /// Returns immediately. The sink is called exactly once, from a runtime
    /// worker thread; if the task is aborted or panics, `onFail` is
    /// delivered.
    #[must_use = "the call runs detached; await the handle to join it"]
    pub fn invoke(&self, call: OutboundCall, sink: Arc<dyn AsyncResultSink>) -> JoinHandle<()> {
        let delivery = Delivery::new(sink, call.context.clone());
        let executor = self.clone();
        tokio::spawn(async move {
            let completion = executor.run(&call).await;
            delivery.deliver(completion.payload, completion.outcome);
        })
    }

    /// Run `call` to completion without delivering.
    #[tracing::instrument(
        name = "outbound_call",
        skip_all,
        fields(
            tenant = %call.context.tenant_domain,
            context_id = %call.context.context_id,
            method = %call.method,
        )
    )]
    pub async fn run(&self, call: &OutboundCall) -> Completion {
        match self.execute(call).await {
            Ok(completion) => completion,
            Err(err) => {
                let outcome = err.outcome();
                warn!(error = %err, %outcome, "outbound call failed");
                Completion::failed(&err)
            }
        }
    }

    /// Force a new client-credential token for `call`, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Fails when `call` has no client-credential auth or no token could be
    /// obtained.
    pub async fn refresh_credentials(&self, call: &OutboundCall) -> Result<(), InvocationError> {
        let auth = call.auth.as_ref().ok_or_else(|| {
            ValidationError::InvalidRequest("call has no credentials to refresh".to_owned())
        })?;
        if CredentialStrategy::resolve(auth)? != CredentialStrategy::ClientCredential {
            return Err(ValidationError::InvalidRequest(format!(
                "'{}' credentials cannot be refreshed",
                auth.auth_type
            ))
            .into());
        }
        let params = ClientCredentialParams::from_auth(auth)?;
        let client = self.client_for(&call.context.tenant_domain)?;
        self.tokens
            .refresh(&params, &call.context.tenant_domain, &client)
            .await?;
        Ok(())
    }

    async fn execute(&self, call: &OutboundCall) -> Result<Completion, InvocationError> {
        let tenant = call.context.tenant_domain.as_str();

        let mut request = call.build()?;

        if !call.allow_list.is_allowed(&request.url) {
            return Err(ValidationError::DomainNotAllowed { url: request.url }.into());
        }

        let client = self.client_for(tenant)?;

        if let Some(auth) = &call.auth {
            let strategy = CredentialStrategy::resolve(auth)?;
            debug!(strategy = strategy.name(), "applying credentials");
            let ctx = CredentialContext {
                tokens: &self.tokens,
                client: &client,
                tenant_domain: tenant,
            };
            strategy.apply(&mut request.headers, auth, &ctx).await?;
        }

        let url = request.url.clone();
        let started = Instant::now();
        let response = send(&client, request).await.map_err(from_http_error)?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let completion = classify(&response, call.success);
        info!(
            %url,
            status = response.status().as_u16(),
            outcome = %completion.outcome,
            duration_ms,
            "outbound call completed"
        );
        Ok(completion)
    }

    fn client_for(&self, tenant: &str) -> Result<PooledClient, InvocationError> {
        self.clients.get_client(tenant).map_err(from_http_error)
    }
}

async fn send(client: &PooledClient, request: OutboundRequest) -> Result<PooledResponse, HttpError> {
    let builder = client
        .request(request.method, &request.url)
        .headers(request.headers);
    let builder = match &request.body {
        RequestBody::Empty => builder,
        RequestBody::Json(payload) => builder.json(payload)?,
        RequestBody::Form(fields) => builder.form(fields)?,
    };
    builder.send().await
}

/// Map a transport-level error to the invocation taxonomy.
pub(crate) fn from_http_error(err: HttpError) -> InvocationError {
    if err.is_timeout() {
        return TransportError::Timeout(err.to_string()).into();
    }
    match err {
        HttpError::InvalidUri { .. }
        | HttpError::InvalidScheme { .. }
        | HttpError::InvalidHeaderName(_)
        | HttpError::InvalidHeaderValue(_)
        | HttpError::RequestBuild(_)
        | HttpError::Json(_)
        | HttpError::FormEncode(_) => ValidationError::InvalidRequest(err.to_string()).into(),
        HttpError::BodyTooLarge { .. } => ProtocolError::UnparsableBody(err.to_string()).into(),
        other => TransportError::Failed(other.to_string()).into(),
    }
}

fn classify(response: &PooledResponse, policy: SuccessPolicy) -> Completion {
    let status = response.status();
    if !policy.accepts(status) {
        let error_code = error_code(response.body());
        warn!(
            status = status.as_u16(),
            error_code = error_code.as_deref(),
            "unexpected response status"
        );
        return Completion::rejected(status, error_code);
    }

    match parse_payload(response) {
        Ok(payload) => Completion::success(status, payload),
        Err(err) => {
            warn!(status = status.as_u16(), error = %err, "response body is unusable");
            Completion::rejected(status, None)
        }
    }
}

fn parse_payload(response: &PooledResponse) -> Result<Payload, ProtocolError> {
    if response.media_type().as_deref() == Some("text/plain") {
        let mut payload = Payload::new();
        payload.insert(TEXT_RESPONSE_KEY.to_owned(), Value::String(response.text()));
        return Ok(payload);
    }
    response
        .json::<Payload>()
        .map_err(|e| ProtocolError::UnparsableBody(e.to_string()))
}

fn error_code(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("code")? {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}
