//! Local directory drive store.
//!
//! Each drive lives in its own directory under the store root:
//!
//! ```text
//! <root>/<key>/files/              # drive contents
//! <root>/<key>/meta/writable       # present iff this store created the drive
//! <root>/<key>/meta/replication.json
//! ```
//!
//! A mount is a symlink inside `files/` pointing at the mounted drive's
//! `files/` directory; the mounted key is read back from the link target.

use super::{
    key_of, normalize_path, CreateOptions, DriveError, DriveHandle, DriveResult, DriveStore,
    OpenOptions, Replication,
};
use crate::keys::generate_key;
use async_trait::async_trait;
use drivefs_types::{is_valid_key, Manifest, Stat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

const FILES_DIR: &str = "files";
const META_DIR: &str = "meta";
const WRITABLE_MARKER: &str = "writable";
const REPLICATION_FILE: &str = "replication.json";

/// A drive backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalDrive {
    key: String,
    /// `<root>/<key>`
    dir: PathBuf,
    /// Store root, used to build mount link targets.
    store_root: PathBuf,
    writable: bool,
}

impl LocalDrive {
    fn files_dir(&self) -> PathBuf {
        self.dir.join(FILES_DIR)
    }

    /// Resolve a drive path to a path under `files/`.
    ///
    /// `..` components are resolved before joining, so the result never
    /// escapes the drive.
    fn resolve(&self, path: &Path) -> PathBuf {
        self.files_dir().join(normalize_path(path))
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> DriveResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(DriveError::ReadOnly(self.key.clone()))
        }
    }

    /// Last replication setting persisted for this drive.
    pub async fn replication(&self) -> Option<Replication> {
        let bytes = fs::read(self.dir.join(META_DIR).join(REPLICATION_FILE)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Key of the drive a mount symlink points at.
    fn mount_key_of(target: &Path) -> Option<String> {
        // <root>/<key>/files
        let key = target.parent()?.file_name()?.to_str()?;
        is_valid_key(key).then(|| key.to_ascii_lowercase())
    }
}

#[async_trait]
impl DriveHandle for LocalDrive {
    fn key(&self) -> &str {
        &self.key
    }

    fn writable(&self) -> bool {
        self.writable
    }

    async fn read_file(&self, path: &Path) -> DriveResult<Vec<u8>> {
        Ok(fs::read(self.resolve(path)).await?)
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> DriveResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path);

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so readers never see a partial document
        let mut tmp = full_path.clone().into_os_string();
        tmp.push(".tmp~");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &full_path).await?;
        Ok(())
    }

    async fn stat(&self, path: &Path) -> DriveResult<Stat> {
        let full_path = self.resolve(path);
        let meta = fs::symlink_metadata(&full_path).await?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&full_path).await?;
            return Ok(match Self::mount_key_of(&target) {
                Some(key) => Stat::mount(key),
                None => Stat::file(0),
            });
        }

        if meta.is_dir() {
            Ok(Stat::directory())
        } else {
            Ok(Stat::file(meta.len()))
        }
    }

    async fn mkdir(&self, path: &Path) -> DriveResult<()> {
        self.check_writable()?;
        Ok(fs::create_dir_all(self.resolve(path)).await?)
    }

    async fn mount(&self, path: &Path, key: &str) -> DriveResult<()> {
        self.check_writable()?;
        let link = self.resolve(path);
        if link == self.files_dir() {
            return Err(DriveError::AlreadyExists("cannot mount over root".to_string()));
        }
        if fs::symlink_metadata(&link).await.is_ok() {
            return Err(DriveError::AlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).await?;
        }

        let target = self.store_root.join(key).join(FILES_DIR);
        symlink_dir(&target, &link).await
    }

    async fn unmount(&self, path: &Path) -> DriveResult<()> {
        self.check_writable()?;
        let link = self.resolve(path);
        let meta = fs::symlink_metadata(&link).await?;
        if !meta.file_type().is_symlink() {
            return Err(DriveError::NotMount(path.display().to_string()));
        }
        Ok(fs::remove_file(&link).await?)
    }

    async fn set_replication(&self, replication: Replication) -> DriveResult<()> {
        let meta_dir = self.dir.join(META_DIR);
        fs::create_dir_all(&meta_dir).await?;
        let json = serde_json::to_vec(&replication).map_err(|e| DriveError::Io(e.to_string()))?;
        Ok(fs::write(meta_dir.join(REPLICATION_FILE), json).await?)
    }
}

#[cfg(unix)]
async fn symlink_dir(target: &Path, link: &Path) -> DriveResult<()> {
    Ok(fs::symlink(target, link).await?)
}

#[cfg(windows)]
async fn symlink_dir(target: &Path, link: &Path) -> DriveResult<()> {
    Ok(fs::symlink_dir(target, link).await?)
}

/// Store of drives kept as directories on the local disk.
#[derive(Debug, Clone)]
pub struct LocalDriveStore {
    root: PathBuf,
}

impl LocalDriveStore {
    /// Create a store rooted at `root`. The directory is created on demand.
    ///
    /// Relative roots are made absolute so mount links stay valid.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open the drive directory for `key`, creating its layout if missing.
    async fn load(&self, key: &str, writable_if_new: bool) -> DriveResult<LocalDrive> {
        let dir = self.root.join(key);
        let meta_dir = dir.join(META_DIR);
        let marker = meta_dir.join(WRITABLE_MARKER);

        let existed = fs::metadata(&dir).await.is_ok();
        fs::create_dir_all(dir.join(FILES_DIR)).await?;
        fs::create_dir_all(&meta_dir).await?;
        if !existed && writable_if_new {
            fs::write(&marker, b"").await?;
        }

        let writable = fs::metadata(&marker).await.is_ok();
        Ok(LocalDrive {
            key: key.to_string(),
            dir,
            store_root: self.root.clone(),
            writable,
        })
    }
}

#[async_trait]
impl DriveStore for LocalDriveStore {
    async fn open(&self, url: &str, _opts: OpenOptions) -> DriveResult<Arc<dyn DriveHandle>> {
        let key = key_of(url)?;
        let drive = self.load(&key, false).await?;
        Ok(Arc::new(drive))
    }

    async fn create(&self, opts: CreateOptions) -> DriveResult<Arc<dyn DriveHandle>> {
        let key = generate_key();
        let drive = self.load(&key, true).await?;
        if opts.title.is_some() || opts.description.is_some() {
            let manifest = Manifest {
                title: opts.title,
                description: opts.description,
                fork_of: None,
            };
            drive.write_manifest(&manifest).await?;
        }
        tracing::debug!(key = %key, dir = %drive.dir.display(), "created local drive");
        Ok(Arc::new(drive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        env::temp_dir().join(format!("drivefs-test-{}-{}", std::process::id(), id))
    }

    async fn setup() -> (LocalDriveStore, PathBuf) {
        let dir = temp_dir();
        let _ = fs::remove_dir_all(&dir).await;
        fs::create_dir_all(&dir).await.unwrap();
        (LocalDriveStore::new(&dir), dir)
    }

    async fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn test_create_write_and_read() {
        let (store, dir) = setup().await;

        let drive = store.create(CreateOptions::default()).await.unwrap();
        assert!(drive.writable());
        drive.write_file(Path::new("/a/b.txt"), b"hello").await.unwrap();
        assert_eq!(drive.read_file(Path::new("a/b.txt")).await.unwrap(), b"hello");

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_writability_survives_reopen() {
        let (store, dir) = setup().await;

        let created = store.create(CreateOptions::default()).await.unwrap();
        let reopened = store.open(&created.url(), OpenOptions::default()).await.unwrap();
        assert!(reopened.writable());

        let remote = store.open(&generate_key(), OpenOptions::default()).await.unwrap();
        assert!(!remote.writable());
        assert!(remote.write_file(Path::new("/x"), b"x").await.is_err());

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_stat_kinds() {
        let (store, dir) = setup().await;

        let drive = store.create(CreateOptions::default()).await.unwrap();
        drive.write_file(Path::new("/file.txt"), b"content").await.unwrap();
        drive.mkdir(Path::new("/dir")).await.unwrap();

        let st = drive.stat(Path::new("/file.txt")).await.unwrap();
        assert!(st.is_file());
        assert_eq!(st.size, 7);
        assert!(drive.stat(Path::new("/dir")).await.unwrap().is_directory());
        assert!(drive.stat(Path::new("/none")).await.unwrap_err().is_not_found());

        cleanup(&dir).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mount_reads_back_key() {
        let (store, dir) = setup().await;

        let root = store.create(CreateOptions::default()).await.unwrap();
        let other = store.create(CreateOptions::default()).await.unwrap();
        other.write_file(Path::new("/hello.txt"), b"hi").await.unwrap();

        root.mount(Path::new("/mnt/other"), other.key()).await.unwrap();
        let st = root.stat(Path::new("/mnt/other")).await.unwrap();
        assert_eq!(st.mount_key(), Some(other.key()));

        // Content is visible through the link
        assert_eq!(root.read_file(Path::new("/mnt/other/hello.txt")).await.unwrap(), b"hi");

        assert!(root.mount(Path::new("/mnt/other"), other.key()).await.is_err());
        root.unmount(Path::new("/mnt/other")).await.unwrap();
        assert!(!root.exists(Path::new("/mnt/other")).await);

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_unmount_directory_fails() {
        let (store, dir) = setup().await;

        let drive = store.create(CreateOptions::default()).await.unwrap();
        drive.mkdir(Path::new("/d")).await.unwrap();
        let err = drive.unmount(Path::new("/d")).await.unwrap_err();
        assert!(matches!(err, DriveError::NotMount(_)));

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_path_escape_stays_inside() {
        let (store, dir) = setup().await;

        let drive = store.create(CreateOptions::default()).await.unwrap();
        drive.write_file(Path::new("/../../escape.txt"), b"x").await.unwrap();
        assert!(drive.exists(Path::new("/escape.txt")).await);

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_replication_persisted() {
        let (store, dir) = setup().await;

        let key = generate_key();
        store.open(&key, OpenOptions::default()).await.unwrap()
            .set_replication(Replication::LOOKUP_ONLY).await.unwrap();
        let drive = store.load(&key, false).await.unwrap();
        assert_eq!(drive.replication().await, Some(Replication::LOOKUP_ONLY));

        cleanup(&dir).await;
    }
}
