//! Drive store abstraction.
//!
//! The peer-to-peer drive stack is consumed through two traits:
//!
//! - `DriveStore`: resolves URLs to keys, opens and creates drives
//! - `DriveHandle`: file, directory and mount operations inside one drive
//!
//! Two implementations are provided:
//!
//! - `MemoryDriveStore`: ephemeral drives held in memory (tests, embedding)
//! - `LocalDriveStore`: one directory per drive, mounts as symlinks
//!
//! ```text
//! FilesystemManager
//!     ↓
//! Arc<dyn DriveStore> ──open/create──▶ Arc<dyn DriveHandle>
//!                                       ├─ read_file / write_file
//!                                       ├─ stat / mkdir
//!                                       ├─ mount / unmount
//!                                       └─ set_replication
//! ```

mod local;
mod memory;

pub use local::{LocalDrive, LocalDriveStore};
pub use memory::{MemoryDrive, MemoryDriveStore};

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use drivefs_types::{DriveUrl, Manifest, Stat, UrlError, MANIFEST_PATH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type for drive operations.
pub type DriveResult<T> = Result<T, DriveError>;

/// Drive operation errors.
#[derive(Debug, Clone, Error)]
pub enum DriveError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("not a mount: {0}")]
    NotMount(String),
    #[error("drive is read-only: {0}")]
    ReadOnly(String),
    #[error("cannot resolve drive url: {0}")]
    InvalidUrl(#[from] UrlError),
    #[error("invalid manifest: {0}")]
    Manifest(String),
    #[error("io error: {0}")]
    Io(String),
}

impl DriveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound(_))
    }
}

impl From<std::io::Error> for DriveError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => DriveError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => DriveError::AlreadyExists(err.to_string()),
            ErrorKind::NotADirectory => DriveError::NotDirectory(err.to_string()),
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                DriveError::ReadOnly(err.to_string())
            }
            _ => DriveError::Io(err.to_string()),
        }
    }
}

/// Options for opening an existing drive.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Keep the drive's network session alive after this handle is dropped.
    pub persist_session: bool,
}

/// Options for creating a new drive.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Participation in a drive's replication swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Replication {
    /// Actively announce and serve the drive's content.
    pub announce: bool,
    /// Look the drive up on the network when it is requested.
    pub lookup: bool,
}

impl Replication {
    /// Host the content for others.
    pub const SEED: Replication = Replication {
        announce: true,
        lookup: true,
    };

    /// Stop hosting, but stay resolvable.
    pub const LOOKUP_ONLY: Replication = Replication {
        announce: false,
        lookup: true,
    };
}

/// Resolves and opens drives.
#[async_trait]
pub trait DriveStore: Send + Sync {
    /// Turn a URL (or bare key) into the drive's canonical key.
    ///
    /// Fails if the URL is not resolvable.
    async fn resolve_key(&self, url: &str, normalize: bool) -> DriveResult<String> {
        Ok(drivefs_types::resolve_key(url, normalize)?)
    }

    /// Open a drive, loading it if the store has not seen it before.
    async fn open(&self, url: &str, opts: OpenOptions) -> DriveResult<Arc<dyn DriveHandle>>;

    /// Create a new drive owned (and therefore writable) by this store.
    async fn create(&self, opts: CreateOptions) -> DriveResult<Arc<dyn DriveHandle>>;
}

/// Operations inside a single drive.
///
/// Paths are absolute within the drive (`/bookmarks`, `/drives.json`).
#[async_trait]
pub trait DriveHandle: Send + Sync {
    /// Canonical key of this drive.
    fn key(&self) -> &str;

    /// Canonical `hyper://<key>` URL.
    fn url(&self) -> String {
        drivefs_types::drive_url(self.key())
    }

    /// True if this process can write to the drive.
    fn writable(&self) -> bool;

    /// Read the entire contents of a file.
    async fn read_file(&self, path: &Path) -> DriveResult<Vec<u8>>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &Path, data: &[u8]) -> DriveResult<()>;

    /// Describe what lives at `path`.
    async fn stat(&self, path: &Path) -> DriveResult<Stat>;

    /// Create a directory (and parents).
    async fn mkdir(&self, path: &Path) -> DriveResult<()>;

    /// Mount the drive `key` at `path`. Fails if `path` is occupied.
    async fn mount(&self, path: &Path, key: &str) -> DriveResult<()>;

    /// Remove the mount at `path`. Fails if `path` is not a mount.
    async fn unmount(&self, path: &Path) -> DriveResult<()>;

    /// Change this process's participation in the drive's swarm.
    async fn set_replication(&self, replication: Replication) -> DriveResult<()>;

    /// Read a file as UTF-8.
    async fn read_to_string(&self, path: &Path) -> DriveResult<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes)
            .map_err(|e| DriveError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read and parse the drive manifest.
    async fn read_manifest(&self) -> DriveResult<Manifest> {
        let bytes = self.read_file(Path::new(MANIFEST_PATH)).await?;
        serde_json::from_slice(&bytes).map_err(|e| DriveError::Manifest(e.to_string()))
    }

    /// Replace the drive manifest.
    async fn write_manifest(&self, manifest: &Manifest) -> DriveResult<()> {
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| DriveError::Manifest(e.to_string()))?;
        self.write_file(Path::new(MANIFEST_PATH), json.as_bytes()).await
    }
}

/// Parse `url` and return its key, for stores that key drives by URL.
pub(crate) fn key_of(url: &str) -> DriveResult<String> {
    Ok(DriveUrl::parse(url)?.key)
}

/// Normalize a drive path: drop the root, resolve `.` and `..`.
pub(crate) fn normalize_path(path: &Path) -> std::path::PathBuf {
    use std::path::Component;

    let mut result = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(s) => result.push(s),
        }
    }
    result
}
