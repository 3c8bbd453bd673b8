//! The filesystem manager.
//!
//! `FilesystemManager` owns the root drive handle and composes the registry,
//! the reconciler, and the state store into the public operations. Nothing
//! here is ambient: the store, the state backends, and the registry are all
//! injected.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use drivefs_types::{AddressBook, DriveConfig, DriveIdent, DriveMeta, ProfileEntry, Stat};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::FilesystemConfig;
use crate::lock::LockTable;
use crate::reconcile::{MountReconciler, Reconciled};
use crate::registry::{ConfigOutcome, ConfigureOptions, DriveRegistry};
use crate::seed::ContentSeeder;
use crate::state::{DriveMetaStore, ProfileStore};
use crate::store::{CreateOptions, DriveError, DriveHandle, DriveStore, OpenOptions};

/// Errors from filesystem manager operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// A URL could not be turned into a drive key.
    #[error("cannot resolve drive: {0}")]
    Resolve(String),

    #[error(transparent)]
    Drive(DriveError),

    /// An operation needing the root drive ran before `setup()` finished.
    #[error("filesystem is not set up")]
    NotReady,

    #[error("no available name for {0}")]
    NameExhausted(String),

    #[error("cannot encode {path}: {message}")]
    Document { path: String, message: String },

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl From<DriveError> for FsError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::InvalidUrl(e) => FsError::Resolve(e.to_string()),
            other => FsError::Drive(other),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Parameters for [`FilesystemManager::setup_default_profile`].
#[derive(Debug, Clone, Default)]
pub struct ProfileInit {
    pub title: String,
    pub description: String,
    /// Image bytes and file extension, written to `/thumb.<ext>`.
    pub thumbnail: Option<(Vec<u8>, String)>,
}

/// Owns the root drive and exposes the filesystem operations.
pub struct FilesystemManager {
    store: Arc<dyn DriveStore>,
    profiles: Arc<dyn ProfileStore>,
    metas: Arc<dyn DriveMetaStore>,
    registry: DriveRegistry,
    config: FilesystemConfig,
    root: OnceLock<Arc<dyn DriveHandle>>,
    setup_lock: Mutex<()>,
    seeders: Vec<Arc<dyn ContentSeeder>>,
}

impl std::fmt::Debug for FilesystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemManager")
            .field("root", &self.root.get().map(|r| r.key().to_string()))
            .field("registry", &self.registry)
            .field("seeders", &self.seeders.len())
            .finish_non_exhaustive()
    }
}

impl FilesystemManager {
    /// Create a manager with its own registry, built from `config`.
    pub fn new(
        store: Arc<dyn DriveStore>,
        profiles: Arc<dyn ProfileStore>,
        metas: Arc<dyn DriveMetaStore>,
        config: FilesystemConfig,
    ) -> Self {
        let registry = DriveRegistry::new(
            config.registry_path.clone(),
            LockTable::new(),
            config.registry_lock.clone(),
        );
        Self {
            store,
            profiles,
            metas,
            registry,
            config,
            root: OnceLock::new(),
            setup_lock: Mutex::new(()),
            seeders: Vec::new(),
        }
    }

    /// Use `registry` instead of the one built from the config, e.g. to share
    /// a lock table with other components.
    pub fn with_registry(mut self, registry: DriveRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add content to seed when the root drive is first created.
    pub fn with_seeder(mut self, seeder: impl ContentSeeder + 'static) -> Self {
        self.seeders.push(Arc::new(seeder));
        self
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriveRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DriveStore> {
        &self.store
    }

    // ================================================================
    // Bootstrap
    // ================================================================

    /// Bootstrap the root drive. Runs once per manager; later calls return
    /// immediately.
    ///
    /// Profile and root-drive failures are returned. Directory enforcement and
    /// seeding are best effort: failures are logged and setup carries on.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn setup(&self) -> FsResult<()> {
        let _once = self.setup_lock.lock().await;
        if self.root.get().is_some() {
            return Ok(());
        }

        let profile_id = self.config.profile_id;
        let profile = self.profiles.load_or_create_profile(profile_id)?;
        let persist = OpenOptions {
            persist_session: true,
        };

        let (root, created) = match profile.url {
            Some(url) => {
                let root = self.store.open(&url, persist).await?;
                tracing::debug!(key = %root.key(), "opened root drive");
                (root, false)
            }
            None => {
                let root = self
                    .store
                    .create(CreateOptions {
                        title: Some("Root".to_string()),
                        description: None,
                    })
                    .await?;
                self.profiles.set_root_url(profile_id, &root.url())?;
                tracing::info!(key = %root.key(), profile = profile_id, "created root drive");
                (root, true)
            }
        };

        let reconciler = MountReconciler::new(root.as_ref());
        for dir in &self.config.well_known_dirs {
            if let Err(e) = reconciler.ensure_dir(Path::new(dir)).await {
                tracing::warn!(path = %dir, error = %e, "failed to ensure directory");
            }
        }

        if created {
            for seeder in &self.seeders {
                match seeder.seed(root.as_ref(), &self.config).await {
                    Ok(()) => tracing::info!(seeder = seeder.name(), "seeded default content"),
                    Err(e) => {
                        tracing::warn!(seeder = seeder.name(), error = %e, "failed to seed default content")
                    }
                }
            }
        }

        self.registry.load(root.as_ref()).await;

        if self.root.set(root).is_err() {
            tracing::debug!("root drive already set");
        }
        Ok(())
    }

    /// The root drive. Fails until `setup()` has completed.
    pub fn get(&self) -> FsResult<Arc<dyn DriveHandle>> {
        self.root.get().cloned().ok_or(FsError::NotReady)
    }

    fn root(&self) -> FsResult<&dyn DriveHandle> {
        self.root.get().map(|r| r.as_ref()).ok_or(FsError::NotReady)
    }

    // ================================================================
    // Queries
    // ================================================================

    /// True if `url` refers to the root drive, in any equivalent form.
    pub async fn is_root_url(&self, url: &str) -> bool {
        let Some(root) = self.root.get() else {
            return false;
        };
        match self.store.resolve_key(url, true).await {
            Ok(key) => key == root.key(),
            Err(_) => false,
        }
    }

    pub async fn get_drive_ident(&self, url: &str) -> DriveIdent {
        DriveIdent {
            system: self.is_root_url(url).await,
        }
    }

    /// Registered drives, optionally preceded by an entry for the root drive.
    pub fn list_drives(&self, include_system: bool) -> Vec<DriveConfig> {
        let system = if include_system {
            self.root.get().map(|r| r.key())
        } else {
            None
        };
        self.registry.list_drives(system)
    }

    pub fn get_drive_config(&self, key: &str) -> Option<DriveConfig> {
        self.registry.get_drive_config(key)
    }

    /// Cached metadata for every registered drive, fetched concurrently.
    ///
    /// One result per drive in registry order; a failed fetch is reported for
    /// that drive only.
    pub async fn list_drive_metas(&self) -> Vec<FsResult<DriveMeta>> {
        let drives = self.registry.list_drives(None);
        let fetches = drives.iter().map(|d| async move {
            self.metas.get_meta(&d.key).await.map_err(FsError::from)
        });
        join_all(fetches).await
    }

    // ================================================================
    // Registry
    // ================================================================

    /// Register `url` or update its fork lineage.
    ///
    /// Newly registered drives have their manifest details cached in the
    /// metadata store.
    pub async fn config_drive(
        &self,
        url: &str,
        opts: ConfigureOptions<'_>,
    ) -> FsResult<ConfigOutcome> {
        let root = self.root()?;
        let outcome = self
            .registry
            .configure(self.store.as_ref(), root, url, opts)
            .await?;

        if let ConfigOutcome::Configured {
            loaded: Some(meta), ..
        } = &outcome
            && let Err(e) = self.metas.put_meta(meta).await
        {
            tracing::warn!(key = %meta.key, error = %e, "failed to cache drive metadata");
        }
        Ok(outcome)
    }

    /// Unregister `url`. Returns whether anything was removed.
    pub async fn remove_drive(&self, url: &str) -> FsResult<bool> {
        let root = self.root()?;
        self.registry.remove(self.store.as_ref(), root, url).await
    }

    // ================================================================
    // Root drive shaping
    // ================================================================

    pub async fn stat(&self, path: impl AsRef<Path>) -> FsResult<Option<Stat>> {
        MountReconciler::new(self.root()?).stat(path.as_ref()).await
    }

    pub async fn ensure_dir(&self, path: impl AsRef<Path>) -> FsResult<Reconciled> {
        MountReconciler::new(self.root()?)
            .ensure_dir(path.as_ref())
            .await
    }

    pub async fn ensure_mount(&self, path: impl AsRef<Path>, url: &str) -> FsResult<Reconciled> {
        MountReconciler::new(self.root()?)
            .ensure_mount(self.store.as_ref(), path.as_ref(), url)
            .await
    }

    pub async fn ensure_unmount(&self, path: impl AsRef<Path>) -> FsResult<Reconciled> {
        MountReconciler::new(self.root()?)
            .ensure_unmount(path.as_ref())
            .await
    }

    /// First free name in `containing_path`: `basename`, then
    /// `basename<joining_char>2`, `basename<joining_char>3`, ...
    pub async fn get_available_name(
        &self,
        containing_path: impl AsRef<Path>,
        basename: &str,
        ext: Option<&str>,
        joining_char: char,
    ) -> FsResult<String> {
        available_name(
            self.root()?,
            containing_path.as_ref(),
            basename,
            ext,
            joining_char,
            self.config.name_search_limit,
        )
        .await
    }

    // ================================================================
    // Profile
    // ================================================================

    /// Create a profile drive and list it in the address book.
    ///
    /// The drive is registered before the address book is written, so a
    /// listed profile always has a registry entry.
    #[tracing::instrument(level = "info", skip(self, init), fields(title = %init.title), err)]
    pub async fn setup_default_profile(&self, init: ProfileInit) -> FsResult<ProfileEntry> {
        let root = self.root()?;

        let drive = self
            .store
            .create(CreateOptions {
                title: Some(init.title.clone()),
                description: Some(init.description.clone()),
            })
            .await?;
        if let Some((bytes, ext)) = &init.thumbnail {
            let thumb = PathBuf::from(format!("/thumb.{}", ext.trim_start_matches('.')));
            drive.write_file(&thumb, bytes).await?;
        }

        let entry = ProfileEntry {
            key: drive.key().to_string(),
            title: init.title,
            description: init.description,
        };

        self.config_drive(&drive.url(), ConfigureOptions::default())
            .await?;

        {
            let _guard = self
                .registry
                .locks()
                .lock(&format!("{}:address-book", self.config.registry_lock))
                .await;
            let mut book = self.read_address_book(root).await?.unwrap_or_default();
            book.profiles.push(entry.clone());
            let json = serde_json::to_string_pretty(&book).map_err(|e| FsError::Document {
                path: self.config.address_book_path.clone(),
                message: e.to_string(),
            })?;
            root.write_file(Path::new(&self.config.address_book_path), json.as_bytes())
                .await?;
        }

        tracing::info!(key = %entry.key, "created profile drive");
        Ok(entry)
    }

    /// The first profile in the address book, if any.
    pub async fn get_profile(&self) -> FsResult<Option<ProfileEntry>> {
        let book = self.read_address_book(self.root()?).await?;
        Ok(book.and_then(|b| b.profiles.into_iter().next()))
    }

    async fn read_address_book(&self, root: &dyn DriveHandle) -> FsResult<Option<AddressBook>> {
        let path = Path::new(&self.config.address_book_path);
        let bytes = match root.read_file(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(book) => Ok(Some(book)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "address book is malformed");
                Ok(None)
            }
        }
    }
}

/// Search `containing` in `drive` for the first unused name.
///
/// Index 1 is the bare `basename`; later indices append `joining_char` and the
/// index. `ext`, if given, is appended after a dot. Gives up after `limit`
/// attempts.
pub async fn available_name(
    drive: &dyn DriveHandle,
    containing: &Path,
    basename: &str,
    ext: Option<&str>,
    joining_char: char,
    limit: u64,
) -> FsResult<String> {
    let reconciler = MountReconciler::new(drive);
    let ext = ext
        .map(|e| e.trim_start_matches('.'))
        .filter(|e| !e.is_empty());

    for i in 1..=limit {
        let mut name = if i == 1 {
            basename.to_string()
        } else {
            format!("{basename}{joining_char}{i}")
        };
        if let Some(ext) = ext {
            name.push('.');
            name.push_str(ext);
        }
        if reconciler.stat(&containing.join(&name)).await?.is_none() {
            return Ok(name);
        }
    }
    Err(FsError::NameExhausted(
        containing.join(basename).display().to_string(),
    ))
}
