//! drivefs-kernel: the root drive and everything mounted into it.
//!
//! This crate provides:
//!
//! - **Store**: `DriveStore`/`DriveHandle` traits plus memory and local-directory stores
//! - **Lock**: named async locks serializing registry mutations
//! - **Registry**: the list of configured drives, persisted as `/drives.json`
//! - **Reconcile**: idempotent ensure-dir / ensure-mount / ensure-unmount
//! - **Manager**: bootstrap of the root drive and the public operations
//! - **State**: SQLite-backed profile record and drive metadata cache
//! - **Config / Paths**: TOML configuration and XDG-compliant path helpers

pub mod config;
pub mod keys;
pub mod lock;
pub mod manager;
pub mod paths;
pub mod reconcile;
pub mod registry;
pub mod seed;
pub mod state;
pub mod store;

pub use config::FilesystemConfig;
pub use lock::{LockGuard, LockTable};
pub use manager::{FilesystemManager, FsError, FsResult, ProfileInit};
pub use reconcile::{MountReconciler, Reconciled};
pub use registry::{
    ConfigOutcome, ConfigureOptions, DriveRegistry, ForkOfRequest, ForkOfUpdate, LabelPrompt,
};
pub use seed::{ContentSeeder, DefaultBookmarks};
pub use state::{DriveMetaStore, ProfileRecord, ProfileStore, StateStore};
pub use store::{
    CreateOptions, DriveError, DriveHandle, DriveResult, DriveStore, LocalDriveStore,
    MemoryDriveStore, OpenOptions, Replication,
};

// Data types, re-exported for embedders
pub use drivefs_types::{
    DriveConfig, DriveIdent, DriveMeta, DriveUrl, ForkOf, Manifest, RegistryDocument, Stat,
};
