//! In-memory drive store.
//!
//! Used for testing and embedding. All drives are ephemeral.

use super::{
    key_of, normalize_path, CreateOptions, DriveError, DriveHandle, DriveResult, DriveStore,
    OpenOptions, Replication,
};
use crate::keys::generate_key;
use async_trait::async_trait;
use drivefs_types::{Manifest, Stat, MANIFEST_PATH};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Entry in a memory drive.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8> },
    Directory,
    Mount { key: String },
}

/// A drive held entirely in memory.
///
/// Thread-safe via internal `RwLock`. Mounts are recorded as entries; the
/// drive does not traverse into the mounted drive.
#[derive(Debug)]
pub struct MemoryDrive {
    key: String,
    writable: bool,
    entries: RwLock<HashMap<PathBuf, Entry>>,
    replication: RwLock<Option<Replication>>,
}

fn poisoned() -> DriveError {
    DriveError::Io("lock poisoned".to_string())
}

impl MemoryDrive {
    /// Create an empty drive.
    pub fn new(key: impl Into<String>, writable: bool) -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(PathBuf::new(), Entry::Directory);
        Self {
            key: key.into(),
            writable,
            entries: RwLock::new(entries),
            replication: RwLock::new(None),
        }
    }

    /// Last replication setting applied, if any.
    pub fn replication(&self) -> Option<Replication> {
        self.replication.read().ok().and_then(|r| *r)
    }

    /// Store a file without the writability check. Used to stage remote content.
    pub fn put_file(&self, path: &Path, data: &[u8]) -> DriveResult<()> {
        let normalized = normalize_path(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Self::ensure_parents(&mut entries, &normalized)?;

        match entries.get(&normalized) {
            Some(Entry::Directory) | Some(Entry::Mount { .. }) => {
                return Err(DriveError::AlreadyExists(format!(
                    "is a directory: {}",
                    path.display()
                )));
            }
            _ => {}
        }

        entries.insert(
            normalized,
            Entry::File {
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    /// Ensure all parent directories of `path` exist.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> DriveResult<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let std::path::Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory) => {}
                    Some(_) => {
                        return Err(DriveError::NotDirectory(current.display().to_string()));
                    }
                    None => {
                        entries.insert(current.clone(), Entry::Directory);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_writable(&self) -> DriveResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(DriveError::ReadOnly(self.key.clone()))
        }
    }
}

#[async_trait]
impl DriveHandle for MemoryDrive {
    fn key(&self) -> &str {
        &self.key
    }

    fn writable(&self) -> bool {
        self.writable
    }

    async fn read_file(&self, path: &Path) -> DriveResult<Vec<u8>> {
        let normalized = normalize_path(path);
        let entries = self.entries.read().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::File { data }) => Ok(data.clone()),
            Some(_) => Err(DriveError::AlreadyExists(format!(
                "is a directory: {}",
                path.display()
            ))),
            None => Err(DriveError::NotFound(path.display().to_string())),
        }
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> DriveResult<()> {
        self.check_writable()?;
        self.put_file(path, data)
    }

    async fn stat(&self, path: &Path) -> DriveResult<Stat> {
        let normalized = normalize_path(path);
        let entries = self.entries.read().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::File { data }) => Ok(Stat::file(data.len() as u64)),
            Some(Entry::Directory) => Ok(Stat::directory()),
            Some(Entry::Mount { key }) => Ok(Stat::mount(key.clone())),
            None => Err(DriveError::NotFound(path.display().to_string())),
        }
    }

    async fn mkdir(&self, path: &Path) -> DriveResult<()> {
        self.check_writable()?;
        let normalized = normalize_path(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Self::ensure_parents(&mut entries, &normalized)?;

        // Check if something already exists
        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory => Ok(()), // Already exists, fine
                _ => Err(DriveError::AlreadyExists(path.display().to_string())),
            };
        }

        entries.insert(normalized, Entry::Directory);
        Ok(())
    }

    async fn mount(&self, path: &Path, key: &str) -> DriveResult<()> {
        self.check_writable()?;
        let normalized = normalize_path(path);
        if normalized.as_os_str().is_empty() {
            return Err(DriveError::AlreadyExists("cannot mount over root".to_string()));
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Self::ensure_parents(&mut entries, &normalized)?;

        if entries.contains_key(&normalized) {
            return Err(DriveError::AlreadyExists(path.display().to_string()));
        }

        entries.insert(
            normalized,
            Entry::Mount {
                key: key.to_string(),
            },
        );
        Ok(())
    }

    async fn unmount(&self, path: &Path) -> DriveResult<()> {
        self.check_writable()?;
        let normalized = normalize_path(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::Mount { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            Some(_) => Err(DriveError::NotMount(path.display().to_string())),
            None => Err(DriveError::NotFound(path.display().to_string())),
        }
    }

    async fn set_replication(&self, replication: Replication) -> DriveResult<()> {
        let mut current = self.replication.write().map_err(|_| poisoned())?;
        *current = Some(replication);
        Ok(())
    }
}

/// Store of in-memory drives.
///
/// Drives created here are writable. Opening a key the store has never seen
/// materializes an empty, read-only drive, standing in for a remote drive
/// fetched from the network.
#[derive(Debug, Default)]
pub struct MemoryDriveStore {
    drives: RwLock<HashMap<String, Arc<MemoryDrive>>>,
}

impl MemoryDriveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a drive the store already holds.
    pub fn drive(&self, key: &str) -> Option<Arc<MemoryDrive>> {
        self.drives.read().ok()?.get(key).cloned()
    }

    /// Stage a read-only drive authored elsewhere, with the given manifest.
    ///
    /// Returns the new drive's key.
    pub fn insert_remote(&self, manifest: Option<&Manifest>) -> DriveResult<String> {
        let key = generate_key();
        let drive = MemoryDrive::new(key.clone(), false);
        if let Some(manifest) = manifest {
            let json = serde_json::to_vec_pretty(manifest)
                .map_err(|e| DriveError::Manifest(e.to_string()))?;
            drive.put_file(Path::new(MANIFEST_PATH), &json)?;
        }
        self.insert(Arc::new(drive))?;
        Ok(key)
    }

    fn insert(&self, drive: Arc<MemoryDrive>) -> DriveResult<()> {
        let mut drives = self.drives.write().map_err(|_| poisoned())?;
        drives.insert(drive.key.clone(), drive);
        Ok(())
    }
}

#[async_trait]
impl DriveStore for MemoryDriveStore {
    async fn open(&self, url: &str, _opts: OpenOptions) -> DriveResult<Arc<dyn DriveHandle>> {
        let key = key_of(url)?;
        let mut drives = self.drives.write().map_err(|_| poisoned())?;
        let drive = drives
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MemoryDrive::new(key, false)))
            .clone();
        Ok(drive)
    }

    async fn create(&self, opts: CreateOptions) -> DriveResult<Arc<dyn DriveHandle>> {
        let drive = Arc::new(MemoryDrive::new(generate_key(), true));
        if opts.title.is_some() || opts.description.is_some() {
            let manifest = Manifest {
                title: opts.title,
                description: opts.description,
                fork_of: None,
            };
            drive.write_manifest(&manifest).await?;
        }
        self.insert(drive.clone())?;
        Ok(drive)
    }
}
