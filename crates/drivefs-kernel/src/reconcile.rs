//! Idempotent reconciliation of paths inside the root drive.
//!
//! Each operation reads the current state of a path and issues only the calls
//! needed to reach the desired state. Repeating an operation is a no-op.
//! Nothing here takes the registry lock; safety under races comes from
//! re-reading state on every call.
//!
//! Paths occupied by something unexpected are reported with a warning and left
//! alone, so user data is never removed to make room.

use std::path::Path;

use drivefs_types::Stat;

use crate::manager::FsResult;
use crate::store::{DriveHandle, DriveStore};

/// What a reconciliation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Nothing was there; it was created.
    Created,
    /// A mount pointing elsewhere was swapped for the desired one.
    Replaced,
    /// A mount was removed.
    Removed,
    /// Already in the desired state.
    Unchanged,
    /// Something else occupies the path; left untouched.
    Conflict,
}

/// Reconciles paths inside one drive.
pub struct MountReconciler<'a> {
    drive: &'a dyn DriveHandle,
}

impl<'a> MountReconciler<'a> {
    pub fn new(drive: &'a dyn DriveHandle) -> Self {
        Self { drive }
    }

    /// Stat `path`, mapping "not found" to `None`.
    pub async fn stat(&self, path: &Path) -> FsResult<Option<Stat>> {
        match self.drive.stat(path).await {
            Ok(st) => Ok(Some(st)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Make sure a directory exists at `path`.
    pub async fn ensure_dir(&self, path: &Path) -> FsResult<Reconciled> {
        match self.stat(path).await? {
            None => {
                tracing::debug!(path = %path.display(), "creating directory");
                self.drive.mkdir(path).await?;
                Ok(Reconciled::Created)
            }
            Some(st) if st.is_directory() => Ok(Reconciled::Unchanged),
            Some(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "expected a directory, found something else; leaving it"
                );
                Ok(Reconciled::Conflict)
            }
        }
    }

    /// Make sure `path` is a mount of the drive `url` resolves to.
    pub async fn ensure_mount(
        &self,
        store: &dyn DriveStore,
        path: &Path,
        url: &str,
    ) -> FsResult<Reconciled> {
        let key = store.resolve_key(url, true).await?;

        match self.stat(path).await? {
            None => {
                tracing::debug!(path = %path.display(), key = %key, "mounting");
                self.drive.mount(path, &key).await?;
                Ok(Reconciled::Created)
            }
            Some(st) => match st.mount_key() {
                Some(current) if current == key => Ok(Reconciled::Unchanged),
                Some(current) => {
                    tracing::debug!(path = %path.display(), from = %current, to = %key, "replacing mount");
                    // A failure between these two leaves the path unmounted;
                    // calling again finishes the job.
                    self.drive.unmount(path).await?;
                    self.drive.mount(path, &key).await?;
                    Ok(Reconciled::Replaced)
                }
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        key = %key,
                        "expected a mount, found something else; leaving it"
                    );
                    Ok(Reconciled::Conflict)
                }
            },
        }
    }

    /// Make sure nothing is mounted at `path`.
    pub async fn ensure_unmount(&self, path: &Path) -> FsResult<Reconciled> {
        match self.stat(path).await? {
            Some(st) if st.mount.is_some() => {
                tracing::debug!(path = %path.display(), "unmounting");
                self.drive.unmount(path).await?;
                Ok(Reconciled::Removed)
            }
            _ => Ok(Reconciled::Unchanged),
        }
    }
}
