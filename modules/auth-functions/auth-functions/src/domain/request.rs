//! Outbound call description and request building.

use std::collections::BTreeMap;
use std::sync::Arc;

use auth_functions_sdk::{AuthConfig, InvocationContext, Payload, ValidationError};
use http::Method;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::domain::allow_list::DomainAllowList;

pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Which statuses count as success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// Any status in `200..300`.
    #[default]
    Any2xx,
    /// Exactly `200 OK`.
    OkOnly,
}

impl SuccessPolicy {
    #[must_use]
    pub fn accepts(self, status: http::StatusCode) -> bool {
        match self {
            SuccessPolicy::Any2xx => status.is_success(),
            SuccessPolicy::OkOnly => status == http::StatusCode::OK,
        }
    }
}

/// One outbound call issued by a script function.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub context: InvocationContext,
    pub method: Method,
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub payload: Option<Payload>,
    pub auth: Option<AuthConfig>,
    pub allow_list: Arc<DomainAllowList>,
    pub success: SuccessPolicy,
}

impl OutboundCall {
    #[must_use]
    pub fn new(context: InvocationContext, method: Method, url: Option<String>) -> Self {
        Self {
            context,
            method,
            url,
            headers: BTreeMap::new(),
            payload: None,
            auth: None,
            allow_list: Arc::new(DomainAllowList::allow_all()),
            success: SuccessPolicy::default(),
        }
    }

    #[must_use]
    pub fn get(context: InvocationContext, url: impl Into<String>) -> Self {
        Self::new(context, Method::GET, Some(url.into()))
    }

    #[must_use]
    pub fn post(context: InvocationContext, url: impl Into<String>, payload: Payload) -> Self {
        Self::new(context, Method::POST, Some(url.into())).with_payload(payload)
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_allow_list(mut self, allow_list: Arc<DomainAllowList>) -> Self {
        self.allow_list = allow_list;
        self
    }

    #[must_use]
    pub fn with_success(mut self, success: SuccessPolicy) -> Self {
        self.success = success;
        self
    }

    /// Assemble the wire request.
    ///
    /// `Accept` defaults to JSON. Bodies are JSON unless the caller set a
    /// form `Content-Type`, in which case the payload is form-encoded.
    ///
    /// # Errors
    ///
    /// `MissingEndpoint` when no usable URL was given, `InvalidRequest` for
    /// header names or values that are not valid HTTP.
    pub fn build(&self) -> Result<OutboundRequest, ValidationError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingEndpoint)?
            .to_owned();

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| ValidationError::InvalidRequest(format!("header '{name}': {e}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| ValidationError::InvalidRequest(format!("header '{name}': {e}")))?;
            headers.insert(name, value);
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        }

        let body = match (&self.method, &self.payload) {
            (&Method::GET, _) | (_, None) => RequestBody::Empty,
            (_, Some(payload)) => {
                if is_form(&headers) {
                    RequestBody::Form(form_fields(payload))
                } else {
                    if !headers.contains_key(CONTENT_TYPE) {
                        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                    }
                    RequestBody::Json(payload.clone())
                }
            }
        };

        Ok(OutboundRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
        })
    }
}

/// A built request, ready for authentication and execution.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Payload),
    Form(Vec<(String, String)>),
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

/// Strings are sent as-is; other values use their JSON text.
fn form_fields(payload: &Payload) -> Vec<(String, String)> {
    payload
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
