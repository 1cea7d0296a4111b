use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile data a provider knows about the authenticated person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i64>,
}

/// Result of a successful authentication, handed to the identity handler.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityInfo {
    /// Name of the provider that authenticated the user.
    pub provider: String,
    /// Provider-scoped identifier (username, `sub` claim, ...).
    pub identifier: String,
    pub data: IdentityData,
    /// Opaque provider metadata stored alongside the identity.
    pub multipass_data: serde_json::Value,
}

impl fmt::Display for IdentityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<IdentityInfo({}, {})>", self.provider, self.identifier)
    }
}
