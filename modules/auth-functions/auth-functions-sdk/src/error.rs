//! Error types for outbound auth-function calls.
//!
//! None of these reach the script. Each one is logged and translated into a
//! single [`Outcome`](crate::Outcome) delivery with an empty payload.

use crate::models::Outcome;
use thiserror::Error;

/// Missing or invalid tenant configuration.
///
/// Recovered locally by falling back to defaults; only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value '{value}' for configuration key '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("required configuration key '{key}' is not set")]
    Missing { key: String },
}

/// The call was rejected before any network activity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("domain of '{url}' is not in the allow-list")]
    DomainNotAllowed { url: String },

    #[error("no target URL or endpoint was provided")]
    MissingEndpoint,

    #[error("{strategy} authentication requires property '{property}'")]
    MissingProperty {
        strategy: &'static str,
        property: &'static str,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// The exchange failed at transport level.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Connect, read or connection-request timeout
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// The server answered but the answer is unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("response body could not be parsed: {0}")]
    UnparsableBody(String),
}

/// Every client-credential token request attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no access token after {attempts} attempt(s): {last_error}")]
pub struct TokenAcquisitionError {
    pub attempts: u32,
    pub last_error: String,
}

/// The declared authentication type matches no known strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported authentication type '{auth_type}'")]
pub struct UnsupportedStrategyError {
    pub auth_type: String,
}

/// Any failure of an outbound call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvocationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    TokenAcquisition(#[from] TokenAcquisitionError),

    #[error(transparent)]
    UnsupportedStrategy(#[from] UnsupportedStrategyError),
}

impl InvocationError {
    /// Outcome reported to the script for this failure.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            InvocationError::Transport(TransportError::Timeout(_)) => Outcome::Timeout,
            _ => Outcome::Fail,
        }
    }
}
