#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Auth Functions SDK
//!
//! This crate provides the public contracts of the `auth-functions` module,
//! the outbound HTTP functions callable from adaptive authentication scripts:
//!
//! - [`AsyncResultSink`] - how a suspended script node is resumed
//! - [`TenantConfigProvider`] - per-tenant connector configuration lookup
//! - [`Outcome`], [`Payload`], [`InvocationContext`], [`AuthConfig`] - models
//! - [`InvocationError`] and its categories - error types
//!
//! ## Usage
//!
//! ```ignore
//! use auth_functions_sdk::{AsyncResultSink, InvocationContext, Outcome, Payload};
//!
//! struct GraphResumer;
//!
//! impl AsyncResultSink for GraphResumer {
//!     fn deliver(&self, context: InvocationContext, payload: Payload, outcome: Outcome) {
//!         // resume the node identified by `context.context_id` on `outcome`
//!     }
//! }
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod secret;

pub use api::{AsyncResultSink, TenantConfigProvider};
pub use error::{
    ConfigError, InvocationError, ProtocolError, TokenAcquisitionError, TransportError,
    UnsupportedStrategyError, ValidationError,
};
pub use models::{AuthConfig, InvocationContext, Outcome, Payload};
pub use secret::SecretString;
