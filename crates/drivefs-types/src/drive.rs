//! Registry entries and the registry document.

use serde::{Deserialize, Serialize};

/// Fork lineage recorded for a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkOf {
    /// Key of the parent drive. The parent always has its own registry entry.
    pub key: String,
    /// Local name the user gave to this fork.
    pub label: String,
}

/// One registered (non-root) drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Canonical drive key, unique within the registry.
    pub key: String,
    #[serde(rename = "forkOf", default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<ForkOf>,
}

impl DriveConfig {
    /// Entry with no fork lineage.
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fork_of: None,
        }
    }

    /// Entry recording a fork of `parent_key`.
    pub fn fork(key: impl Into<String>, parent_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fork_of: Some(ForkOf {
                key: parent_key.into(),
                label: label.into(),
            }),
        }
    }
}

/// Serialized registry: `{ "drives": [ ... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub drives: Vec<DriveConfig>,
}

impl RegistryDocument {
    /// Parse a document from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Pretty-printed JSON, the on-drive form.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Derived view of a URL relative to the root drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriveIdent {
    /// True iff the URL names the root drive.
    pub system: bool,
}
