//! The drive registry.
//!
//! The registry is the list of non-root drives this profile participates in,
//! persisted as a single JSON document inside the root drive. The document is
//! the only commit point: mutations edit a copy of the list, write the whole
//! document, and only then publish the copy in memory. A failed write or an
//! aborted operation therefore leaves both the document and the list as they
//! were.
//!
//! Every mutation holds the registry lock for its full duration, including any
//! wait on a label prompt. Reads never take the lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use drivefs_types::{drive_url, DriveConfig, DriveMeta, ForkOf, Manifest, RegistryDocument};

use crate::lock::LockTable;
use crate::manager::{FsError, FsResult};
use crate::store::{DriveHandle, DriveStore, OpenOptions, Replication};

/// Asks the user for a fork label.
///
/// Returning `None` or an empty string declines, which cancels the operation
/// that asked.
#[async_trait]
pub trait LabelPrompt: Send + Sync {
    async fn ask(&self, message: &str) -> Option<String>;
}

/// What to do with an entry's fork lineage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForkOfUpdate {
    /// Leave existing lineage alone.
    #[default]
    Keep,
    /// Record this lineage.
    Set(ForkOfRequest),
    /// Drop any recorded lineage.
    Clear,
}

/// Caller-declared fork lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkOfRequest {
    /// URL or key of the parent drive.
    pub parent: String,
    /// Local label for the fork. May be empty when a label is supplied
    /// separately or obtained from a prompt.
    pub label: String,
}

/// Options for [`DriveRegistry::configure`].
#[derive(Clone, Copy, Default)]
pub struct ConfigureOptions<'a> {
    pub fork_of: Option<&'a ForkOfUpdate>,
    /// Label to use if one is needed and none is declared. This is how a
    /// caller resumes after [`ConfigOutcome::LabelRequired`].
    pub label: Option<&'a str>,
    /// Prompt to call, under the lock, when a label is needed.
    pub prompt: Option<&'a dyn LabelPrompt>,
}

impl<'a> ConfigureOptions<'a> {
    pub fn fork_of(update: &'a ForkOfUpdate) -> Self {
        Self {
            fork_of: Some(update),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_prompt(mut self, prompt: &'a dyn LabelPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

/// Result of [`DriveRegistry::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// Entry added or updated and the document written.
    Configured {
        config: DriveConfig,
        /// Metadata read while loading a newly registered drive.
        loaded: Option<DriveMeta>,
    },
    /// A fork label is needed and neither a label nor a prompt was given.
    /// Nothing changed.
    LabelRequired { key: String, parent_key: String },
    /// The prompt was declined or answered empty. Nothing changed.
    Cancelled { key: String },
    /// `url` names the root drive, which is never a registry entry. Nothing
    /// changed.
    System { key: String },
}

impl ConfigOutcome {
    /// True if the registry was changed (or re-written).
    pub fn is_applied(&self) -> bool {
        matches!(self, ConfigOutcome::Configured { .. })
    }

    pub fn config(&self) -> Option<&DriveConfig> {
        match self {
            ConfigOutcome::Configured { config, .. } => Some(config),
            _ => None,
        }
    }
}

enum Label {
    Known(String),
    Required,
    Declined,
}

/// In-memory registry backed by a document in the root drive.
pub struct DriveRegistry {
    path: PathBuf,
    locks: LockTable,
    lock_name: String,
    drives: RwLock<Arc<Vec<DriveConfig>>>,
}

impl std::fmt::Debug for DriveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveRegistry")
            .field("path", &self.path)
            .field("lock", &self.lock_name)
            .field("drives", &self.snapshot().len())
            .finish()
    }
}

impl DriveRegistry {
    /// Create an empty registry persisted at `path`, serialized by the lock
    /// `lock_name` in `locks`.
    pub fn new(path: impl Into<PathBuf>, locks: LockTable, lock_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            locks,
            lock_name: lock_name.into(),
            drives: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Path of the registry document inside the root drive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// The lock table mutations are serialized through.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn snapshot(&self) -> Arc<Vec<DriveConfig>> {
        self.drives
            .read()
            .map(|drives| Arc::clone(&*drives))
            .unwrap_or_else(|e| Arc::clone(&*e.into_inner()))
    }

    fn publish(&self, drives: Vec<DriveConfig>) {
        let mut current = self.drives.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(drives);
    }

    /// Rehydrate from the document in `root`.
    ///
    /// A missing or unreadable document yields an empty registry.
    pub async fn load(&self, root: &dyn DriveHandle) {
        let drives = match root.read_file(&self.path).await {
            Ok(bytes) => match RegistryDocument::from_slice(&bytes) {
                Ok(doc) => doc.drives,
                Err(e) => {
                    tracing::info!(path = %self.path.display(), error = %e, "drive registry is malformed, starting empty");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::info!(path = %self.path.display(), error = %e, "no drive registry, starting empty");
                Vec::new()
            }
        };
        tracing::debug!(count = drives.len(), "loaded drive registry");
        self.publish(drives);
    }

    /// Copy of the registered drives.
    ///
    /// With `system` set to the root drive's key, a synthetic entry for the
    /// root drive is listed first.
    pub fn list_drives(&self, system: Option<&str>) -> Vec<DriveConfig> {
        let drives = self.snapshot();
        let mut list = Vec::with_capacity(drives.len() + 1);
        if let Some(root_key) = system {
            list.push(DriveConfig::bare(root_key));
        }
        list.extend(drives.iter().cloned());
        list
    }

    /// Entry for `key`, if registered.
    pub fn get_drive_config(&self, key: &str) -> Option<DriveConfig> {
        self.snapshot().iter().find(|d| d.key == key).cloned()
    }

    /// Number of registered drives.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `url`, or update its fork lineage if already registered.
    ///
    /// Manifest-declared parentage wins over a caller-declared parent key, but
    /// a caller-declared label is always kept.
    #[tracing::instrument(level = "info", skip(self, store, root, opts), fields(registry = %self.path.display()), err)]
    pub async fn configure(
        &self,
        store: &dyn DriveStore,
        root: &dyn DriveHandle,
        url: &str,
        opts: ConfigureOptions<'_>,
    ) -> FsResult<ConfigOutcome> {
        let _guard = self.locks.lock(&self.lock_name).await;

        let key = store.resolve_key(url, true).await?;
        if key == root.key() {
            tracing::debug!(key = %key, "root drive is not registered");
            return Ok(ConfigOutcome::System { key });
        }

        let mut working: Vec<DriveConfig> = self.snapshot().as_ref().clone();
        let mut seed = None;
        let keep = ForkOfUpdate::Keep;
        let update = opts.fork_of.unwrap_or(&keep);

        let (config, loaded) = match working.iter().position(|d| d.key == key) {
            Some(idx) => {
                let fork_of = match update {
                    ForkOfUpdate::Keep => working[idx].fork_of.clone(),
                    ForkOfUpdate::Clear => None,
                    ForkOfUpdate::Set(req) => {
                        let parent_key = store.resolve_key(&req.parent, true).await?;
                        match self.label_for(&key, &parent_key, Some(&req.label), &opts).await {
                            Label::Known(label) => Some(ForkOf {
                                key: parent_key,
                                label,
                            }),
                            Label::Required => {
                                return Ok(ConfigOutcome::LabelRequired { key, parent_key });
                            }
                            Label::Declined => return Ok(ConfigOutcome::Cancelled { key }),
                        }
                    }
                };
                working[idx].fork_of = fork_of;
                (working[idx].clone(), None)
            }
            None => {
                let drive = store
                    .open(
                        &drive_url(&key),
                        OpenOptions {
                            persist_session: true,
                        },
                    )
                    .await?;
                let manifest = match drive.read_manifest().await {
                    Ok(manifest) => Some(manifest),
                    Err(e) => {
                        tracing::debug!(key = %key, error = %e, "no readable manifest");
                        None
                    }
                };

                let mut declared = match update {
                    ForkOfUpdate::Set(req) => {
                        Some((store.resolve_key(&req.parent, true).await?, req.label.clone()))
                    }
                    ForkOfUpdate::Keep | ForkOfUpdate::Clear => None,
                };

                if let Some(parent_key) = Self::manifest_parent(store, &key, manifest.as_ref()).await {
                    let label = declared.take().map(|(_, label)| label).unwrap_or_default();
                    declared = Some((parent_key, label));
                }

                let fork_of = match declared {
                    Some((parent_key, label)) => {
                        match self.label_for(&key, &parent_key, Some(&label), &opts).await {
                            Label::Known(label) => Some(ForkOf {
                                key: parent_key,
                                label,
                            }),
                            Label::Required => {
                                return Ok(ConfigOutcome::LabelRequired { key, parent_key });
                            }
                            Label::Declined => return Ok(ConfigOutcome::Cancelled { key }),
                        }
                    }
                    None => None,
                };

                let meta = DriveMeta::from_manifest(
                    key.clone(),
                    &manifest.unwrap_or_default(),
                    drive.writable(),
                );
                let config = DriveConfig { key, fork_of };
                working.push(config.clone());
                if !drive.writable() {
                    // Help host content we did not author
                    seed = Some(drive);
                }
                (config, Some(meta))
            }
        };

        // The root drive is always present, so it is never added as a parent
        if let Some(parent) = &config.fork_of
            && parent.key != root.key()
            && !working.iter().any(|d| d.key == parent.key)
        {
            tracing::debug!(parent = %parent.key, "registering fork parent");
            working.push(DriveConfig::bare(parent.key.clone()));
        }

        self.persist(root, &working).await?;
        self.publish(working);

        if let Some(drive) = seed
            && let Err(e) = drive.set_replication(Replication::SEED).await
        {
            tracing::warn!(key = %drive.key(), error = %e, "failed to start seeding drive");
        }
        Ok(ConfigOutcome::Configured { config, loaded })
    }

    /// Unregister `url`. Returns whether an entry was removed.
    ///
    /// A drive we do not own stops being announced but stays resolvable.
    #[tracing::instrument(level = "info", skip(self, store, root), fields(registry = %self.path.display()), err)]
    pub async fn remove(
        &self,
        store: &dyn DriveStore,
        root: &dyn DriveHandle,
        url: &str,
    ) -> FsResult<bool> {
        let _guard = self.locks.lock(&self.lock_name).await;

        let key = store.resolve_key(url, true).await?;
        let mut working: Vec<DriveConfig> = self.snapshot().as_ref().clone();
        let Some(idx) = working.iter().position(|d| d.key == key) else {
            tracing::debug!(key = %key, "not registered, nothing to remove");
            return Ok(false);
        };

        let drive = store.open(&drive_url(&key), OpenOptions::default()).await?;
        working.remove(idx);
        let orphans = working
            .iter()
            .filter(|d| d.fork_of.as_ref().is_some_and(|f| f.key == key))
            .count();
        if orphans > 0 {
            tracing::debug!(key = %key, orphans, "removed drive is still a fork parent");
        }

        self.persist(root, &working).await?;
        self.publish(working);

        if !drive.writable()
            && let Err(e) = drive.set_replication(Replication::LOOKUP_ONLY).await
        {
            tracing::warn!(key = %key, error = %e, "failed to stop seeding drive");
        }
        Ok(true)
    }

    /// Parent key declared by a manifest's `forkOf`, if any and resolvable.
    async fn manifest_parent(
        store: &dyn DriveStore,
        key: &str,
        manifest: Option<&Manifest>,
    ) -> Option<String> {
        let parent_url = manifest?.fork_of.as_deref()?;
        match store.resolve_key(parent_url, true).await {
            Ok(parent_key) => Some(parent_key),
            Err(e) => {
                tracing::warn!(key = %key, parent = %parent_url, error = %e, "ignoring unresolvable forkOf in manifest");
                None
            }
        }
    }

    /// Settle the label for a fork: declared, then supplied, then prompted.
    async fn label_for(
        &self,
        key: &str,
        parent_key: &str,
        declared: Option<&str>,
        opts: &ConfigureOptions<'_>,
    ) -> Label {
        let known = declared
            .filter(|l| !l.trim().is_empty())
            .or(opts.label.filter(|l| !l.trim().is_empty()));
        if let Some(label) = known {
            return Label::Known(label.trim().to_string());
        }

        let Some(prompt) = opts.prompt else {
            return Label::Required;
        };

        let message = format!("Label for your fork of {}", drive_url(parent_key));
        match prompt.ask(&message).await {
            Some(answer) if !answer.trim().is_empty() => Label::Known(answer.trim().to_string()),
            _ => {
                tracing::info!(key = %key, "fork label declined, drive not registered");
                Label::Declined
            }
        }
    }

    /// Write the whole document.
    async fn persist(&self, root: &dyn DriveHandle, drives: &[DriveConfig]) -> FsResult<()> {
        let doc = RegistryDocument {
            drives: drives.to_vec(),
        };
        let json = doc.to_pretty_json().map_err(|e| FsError::Document {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        root.write_file(&self.path, json.as_bytes()).await?;
        tracing::debug!(count = drives.len(), "wrote drive registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingDrive;
    use crate::store::{CreateOptions, MemoryDriveStore};
    use std::time::Duration;

    const REGISTRY: &str = "/drives.json";

    struct Answer(Option<&'static str>);

    #[async_trait]
    impl LabelPrompt for Answer {
        async fn ask(&self, _message: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct SlowAnswer;

    #[async_trait]
    impl LabelPrompt for SlowAnswer {
        async fn ask(&self, _message: &str) -> Option<String> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some("slow".to_string())
        }
    }

    async fn fixture() -> (MemoryDriveStore, Arc<RecordingDrive>, DriveRegistry) {
        let store = MemoryDriveStore::new();
        let root = store.create(CreateOptions::default()).await.unwrap();
        let root = Arc::new(RecordingDrive::new(root));
        let registry = DriveRegistry::new(REGISTRY, LockTable::new(), "filesystem:drives");
        (store, root, registry)
    }

    async fn document(root: &dyn DriveHandle) -> Option<Vec<u8>> {
        root.read_file(Path::new(REGISTRY)).await.ok()
    }

    fn forked(parent_url: &str) -> Manifest {
        Manifest {
            title: Some("fork".into()),
            description: None,
            fork_of: Some(parent_url.to_string()),
        }
    }

    #[tokio::test]
    async fn configure_registers_and_persists() {
        let (store, root, registry) = fixture().await;
        let key = store.insert_remote(Some(&Manifest::titled("Remote"))).unwrap();

        let outcome = registry
            .configure(&store, root.as_ref(), &drive_url(&key), ConfigureOptions::default())
            .await
            .unwrap();

        let ConfigOutcome::Configured { config, loaded } = outcome else {
            panic!("expected configured");
        };
        assert_eq!(config, DriveConfig::bare(key.clone()));
        assert_eq!(loaded.unwrap().title, "Remote");
        assert_eq!(registry.get_drive_config(&key), Some(config));

        let doc = RegistryDocument::from_slice(&document(root.as_ref()).await.unwrap()).unwrap();
        assert_eq!(doc.drives, registry.list_drives(None));
    }

    #[tokio::test]
    async fn equivalent_urls_share_one_entry() {
        let (store, root, registry) = fixture().await;
        let key = store.insert_remote(None).unwrap();

        for url in [drive_url(&key), key.to_uppercase(), format!("hyper://{}+5/x", key)] {
            registry
                .configure(&store, root.as_ref(), &url, ConfigureOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remote_drives_are_seeded_own_drives_are_not() {
        let (store, root, registry) = fixture().await;
        let remote = store.insert_remote(None).unwrap();
        let own = store.create(CreateOptions::default()).await.unwrap();

        registry.configure(&store, root.as_ref(), &remote, ConfigureOptions::default()).await.unwrap();
        registry.configure(&store, root.as_ref(), own.key(), ConfigureOptions::default()).await.unwrap();

        assert_eq!(store.drive(&remote).unwrap().replication(), Some(Replication::SEED));
        assert_eq!(store.drive(own.key()).unwrap().replication(), None);
    }

    #[tokio::test]
    async fn unresolvable_url_is_an_error() {
        let (store, root, registry) = fixture().await;
        let err = registry
            .configure(&store, root.as_ref(), "hyper://nope", ConfigureOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Resolve(_)));
        assert!(document(root.as_ref()).await.is_none());
    }

    #[tokio::test]
    async fn manifest_fork_without_label_requires_one() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(Some(&forked(&drive_url(&parent)))).unwrap();

        let outcome = registry
            .configure(&store, root.as_ref(), &child, ConfigureOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ConfigOutcome::LabelRequired {
                key: child.clone(),
                parent_key: parent.clone()
            }
        );
        assert!(registry.is_empty());
        assert!(document(root.as_ref()).await.is_none());

        // Resume with the label
        let outcome = registry
            .configure(&store, root.as_ref(), &child, ConfigureOptions::default().with_label("mine"))
            .await
            .unwrap();
        assert_eq!(
            outcome.config().unwrap().fork_of,
            Some(ForkOf {
                key: parent.clone(),
                label: "mine".into()
            })
        );
        assert!(registry.get_drive_config(&parent).is_some());
    }

    #[tokio::test]
    async fn declined_prompt_leaves_no_trace() {
        let (store, root, registry) = fixture().await;
        let existing = store.insert_remote(None).unwrap();
        registry.configure(&store, root.as_ref(), &existing, ConfigureOptions::default()).await.unwrap();
        let before = document(root.as_ref()).await.unwrap();

        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(Some(&forked(&parent))).unwrap();

        for answer in [None, Some(""), Some("   ")] {
            let prompt = Answer(answer);
            let outcome = registry
                .configure(&store, root.as_ref(), &child, ConfigureOptions::default().with_prompt(&prompt))
                .await
                .unwrap();
            assert_eq!(outcome, ConfigOutcome::Cancelled { key: child.clone() });
        }

        assert_eq!(document(root.as_ref()).await.unwrap(), before);
        assert_eq!(registry.len(), 1);
        assert_eq!(store.drive(&child).unwrap().replication(), None);
        assert!(!registry.locks.is_locked(registry.lock_name()));
    }

    #[tokio::test]
    async fn accepted_prompt_records_lineage() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(Some(&forked(&drive_url(&parent)))).unwrap();

        let prompt = Answer(Some("  weekend edits "));
        let outcome = registry
            .configure(&store, root.as_ref(), &child, ConfigureOptions::default().with_prompt(&prompt))
            .await
            .unwrap();

        let fork = outcome.config().unwrap().fork_of.clone().unwrap();
        assert_eq!(fork.key, parent);
        assert_eq!(fork.label, "weekend edits");
        assert_eq!(registry.get_drive_config(&parent), Some(DriveConfig::bare(parent.clone())));
    }

    #[tokio::test]
    async fn manifest_parent_overrides_declared_key_not_label() {
        let (store, root, registry) = fixture().await;
        let manifest_parent = store.insert_remote(None).unwrap();
        let declared_parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(Some(&forked(&manifest_parent))).unwrap();

        let update = ForkOfUpdate::Set(ForkOfRequest {
            parent: declared_parent.clone(),
            label: "declared".into(),
        });
        let prompt = Answer(None);
        let outcome = registry
            .configure(
                &store,
                root.as_ref(),
                &child,
                ConfigureOptions::fork_of(&update).with_prompt(&prompt),
            )
            .await
            .unwrap();

        let fork = outcome.config().unwrap().fork_of.clone().unwrap();
        assert_eq!(fork.key, manifest_parent);
        assert_eq!(fork.label, "declared");
        assert!(registry.get_drive_config(&declared_parent).is_none());
    }

    #[tokio::test]
    async fn declared_fork_registers_parent() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(None).unwrap();

        let update = ForkOfUpdate::Set(ForkOfRequest {
            parent: drive_url(&parent),
            label: "copy".into(),
        });
        registry
            .configure(&store, root.as_ref(), &child, ConfigureOptions::fork_of(&update))
            .await
            .unwrap();

        let keys: Vec<_> = registry.list_drives(None).into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![child.clone(), parent.clone()]);
    }

    #[tokio::test]
    async fn existing_entry_keep_set_clear() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(None).unwrap();
        registry.configure(&store, root.as_ref(), &child, ConfigureOptions::default()).await.unwrap();

        let set = ForkOfUpdate::Set(ForkOfRequest {
            parent: parent.clone(),
            label: "v1".into(),
        });
        registry.configure(&store, root.as_ref(), &child, ConfigureOptions::fork_of(&set)).await.unwrap();
        assert_eq!(registry.get_drive_config(&child).unwrap().fork_of.unwrap().label, "v1");
        assert!(registry.get_drive_config(&parent).is_some());

        // Keep leaves it alone
        registry.configure(&store, root.as_ref(), &child, ConfigureOptions::default()).await.unwrap();
        assert_eq!(registry.get_drive_config(&child).unwrap().fork_of.unwrap().label, "v1");

        let clear = ForkOfUpdate::Clear;
        registry.configure(&store, root.as_ref(), &child, ConfigureOptions::fork_of(&clear)).await.unwrap();
        assert_eq!(registry.get_drive_config(&child).unwrap().fork_of, None);
    }

    #[tokio::test]
    async fn failed_write_changes_nothing() {
        let (store, root, registry) = fixture().await;
        let key = store.insert_remote(None).unwrap();

        root.fail_writes(true);
        let result = registry
            .configure(&store, root.as_ref(), &key, ConfigureOptions::default())
            .await;
        assert!(matches!(result, Err(FsError::Drive(_))));
        assert!(registry.is_empty());
        assert_eq!(store.drive(&key).unwrap().replication(), None);

        root.fail_writes(false);
        registry.configure(&store, root.as_ref(), &key, ConfigureOptions::default()).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(store.drive(&key).unwrap().replication(), Some(Replication::SEED));

        root.fail_writes(true);
        let result = registry.remove(&store, root.as_ref(), &key).await;
        assert!(matches!(result, Err(FsError::Drive(_))));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.drive(&key).unwrap().replication(), Some(Replication::SEED));
    }

    #[tokio::test]
    async fn root_drive_is_never_an_entry() {
        let (store, root, registry) = fixture().await;
        let root_key = root.key().to_string();

        let outcome = registry
            .configure(&store, root.as_ref(), &drive_url(&root_key), ConfigureOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, ConfigOutcome::System { key: root_key.clone() });
        assert!(!outcome.is_applied());
        assert!(registry.is_empty());
        assert!(document(root.as_ref()).await.is_none());

        let fork = store.insert_remote(Some(&forked(&drive_url(&root_key)))).unwrap();
        let outcome = registry
            .configure(&store, root.as_ref(), &fork, ConfigureOptions::default().with_label("mine"))
            .await
            .unwrap();
        assert_eq!(outcome.config().unwrap().fork_of.as_ref().unwrap().key, root_key);
        assert_eq!(registry.list_drives(None).len(), 1);
        assert!(registry.get_drive_config(&root_key).is_none());

        let with_root = registry.list_drives(Some(&root_key));
        assert_eq!(with_root.iter().filter(|d| d.key == root_key).count(), 1);
    }

    #[tokio::test]
    async fn remove_stops_seeding_and_is_noop_when_absent() {
        let (store, root, registry) = fixture().await;
        let key = store.insert_remote(None).unwrap();
        registry.configure(&store, root.as_ref(), &key, ConfigureOptions::default()).await.unwrap();

        assert!(registry.remove(&store, root.as_ref(), &drive_url(&key)).await.unwrap());
        assert!(registry.get_drive_config(&key).is_none());
        assert_eq!(store.drive(&key).unwrap().replication(), Some(Replication::LOOKUP_ONLY));

        root.clear();
        assert!(!registry.remove(&store, root.as_ref(), &key).await.unwrap());
        assert!(root.ops().is_empty());

        // Content untouched, so it can be re-added
        registry.configure(&store, root.as_ref(), &key, ConfigureOptions::default()).await.unwrap();
        assert!(registry.get_drive_config(&key).is_some());
    }

    #[tokio::test]
    async fn load_round_trips_and_tolerates_garbage() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let child = store.insert_remote(Some(&forked(&parent))).unwrap();
        let other = store.insert_remote(None).unwrap();
        registry.configure(&store, root.as_ref(), &other, ConfigureOptions::default()).await.unwrap();
        registry
            .configure(&store, root.as_ref(), &child, ConfigureOptions::default().with_label("l"))
            .await
            .unwrap();

        let reloaded = DriveRegistry::new(REGISTRY, LockTable::new(), "filesystem:drives");
        reloaded.load(root.as_ref()).await;
        assert_eq!(reloaded.list_drives(None), registry.list_drives(None));

        root.write_file(Path::new(REGISTRY), b"{ not json").await.unwrap();
        reloaded.load(root.as_ref()).await;
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn list_drives_prepends_system_entry() {
        let (store, root, registry) = fixture().await;
        let key = store.insert_remote(None).unwrap();
        registry.configure(&store, root.as_ref(), &key, ConfigureOptions::default()).await.unwrap();

        let list = registry.list_drives(Some(root.key()));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].key, root.key());
        assert_eq!(list[1].key, key);
        assert_eq!(registry.list_drives(None).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_configures_do_not_clobber() {
        let (store, root, registry) = fixture().await;
        let parent = store.insert_remote(None).unwrap();
        let slow = store.insert_remote(Some(&forked(&parent))).unwrap();
        let fast = store.insert_remote(None).unwrap();

        let prompt = SlowAnswer;
        let (a, b) = tokio::join!(
            registry.configure(&store, root.as_ref(), &slow, ConfigureOptions::default().with_prompt(&prompt)),
            registry.configure(&store, root.as_ref(), &fast, ConfigureOptions::default()),
        );
        assert!(a.unwrap().is_applied());
        assert!(b.unwrap().is_applied());

        let doc = RegistryDocument::from_slice(&document(root.as_ref()).await.unwrap()).unwrap();
        let keys: Vec<_> = doc.drives.iter().map(|d| d.key.as_str()).collect();
        assert!(keys.contains(&slow.as_str()));
        assert!(keys.contains(&fast.as_str()));
        assert!(keys.contains(&parent.as_str()));
    }
}
