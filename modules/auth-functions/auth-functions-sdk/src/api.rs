//! Collaborator traits consumed by the auth-functions core.

use crate::models::{InvocationContext, Outcome, Payload};

/// Resumes a suspended authentication graph node.
///
/// Implemented by the scripting engine. The core calls [`deliver`] exactly
/// once per invocation, possibly from a runtime worker thread other than the
/// one that issued the call.
///
/// [`deliver`]: AsyncResultSink::deliver
pub trait AsyncResultSink: Send + Sync {
    /// Hand the result of an outbound call back to the script.
    ///
    /// `payload` is the parsed response body for [`Outcome::Success`] and an
    /// empty map otherwise.
    fn deliver(&self, context: InvocationContext, payload: Payload, outcome: Outcome);
}

/// Per-tenant connector configuration lookup.
///
/// Used for every tenant tunable (timeouts, pool sizes, hostname
/// verification, allow-lists, receiver URLs, credentials). Returning `None`
/// means "not configured"; callers fall back to module defaults.
pub trait TenantConfigProvider: Send + Sync {
    fn connector_config(&self, key: &str, tenant_domain: &str) -> Option<String>;
}
