//! Drive manifests and cached drive metadata.

use serde::{Deserialize, Serialize};

/// Path of the manifest inside every drive.
pub const MANIFEST_PATH: &str = "/index.json";

/// A drive's self-description, stored at [`MANIFEST_PATH`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL of the upstream drive this one was forked from.
    #[serde(rename = "forkOf", default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<String>,
}

impl Manifest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Cached metadata for a drive, as kept in the state store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveMeta {
    pub key: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub writable: bool,
}

impl DriveMeta {
    /// Metadata known only by key (cache miss).
    pub fn bare(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            url: crate::url::drive_url(&key),
            key,
            ..Default::default()
        }
    }

    /// Metadata derived from a manifest.
    pub fn from_manifest(key: impl Into<String>, manifest: &Manifest, writable: bool) -> Self {
        let mut meta = Self::bare(key);
        meta.title = manifest.title.clone().unwrap_or_default();
        meta.description = manifest.description.clone().unwrap_or_default();
        meta.writable = writable;
        meta
    }
}
