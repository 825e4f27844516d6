//! Models shared between the scripting engine and the auth-functions core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Result payload handed to the script: a JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Three-way classification of an outbound call, used by scripts for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "onSuccess")]
    Success,
    #[serde(rename = "onFail")]
    Fail,
    #[serde(rename = "onTimeout")]
    Timeout,
}

impl Outcome {
    /// Name of the script event handler this outcome triggers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "onSuccess",
            Outcome::Fail => "onFail",
            Outcome::Timeout => "onTimeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the suspended graph node to resume. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationContext {
    /// Tenant the authentication flow belongs to.
    pub tenant_domain: String,
    /// Session data key of the authentication flow.
    pub context_id: String,
}

impl InvocationContext {
    #[must_use]
    pub fn new(tenant_domain: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            tenant_domain: tenant_domain.into(),
            context_id: context_id.into(),
        }
    }
}

/// Script-supplied authentication settings for one outbound call.
///
/// `auth_type` is matched case-insensitively against the known strategies
/// when the call is made; property semantics depend on the type.
///
/// ```json
/// {"type": "clientcredential",
///  "properties": {"consumerKey": "...", "consumerSecret": "...", "tokenEndpoint": "..."}}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new<K, V>(
        auth_type: impl Into<String>,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            auth_type: auth_type.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A property value, treating blank values as absent.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

// Property values carry credentials, so only keys are printed.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("auth_type", &self.auth_type)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_to_handler_names() {
        assert_eq!(
            serde_json::to_string(&Outcome::Success).unwrap(),
            "\"onSuccess\""
        );
        assert_eq!(Outcome::Timeout.to_string(), "onTimeout");
        let parsed: Outcome = serde_json::from_str("\"onFail\"").unwrap();
        assert_eq!(parsed, Outcome::Fail);
    }

    #[test]
    fn auth_config_deserializes_type_and_properties() {
        let cfg: AuthConfig = serde_json::from_str(
            r#"{"type":"BearerToken","properties":{"token":"abc","empty":"  "}}"#,
        )
        .unwrap();
        assert_eq!(cfg.auth_type, "BearerToken");
        assert_eq!(cfg.property("token"), Some("abc"));
        assert_eq!(cfg.property("empty"), None);
        assert_eq!(cfg.property("missing"), None);
    }

    #[test]
    fn auth_config_debug_hides_values() {
        let cfg = AuthConfig::new("basicauth", [("username", "alice"), ("password", "hunter2")]);
        let dbg = format!("{cfg:?}");
        assert!(dbg.contains("password"));
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("alice"));
    }
}
