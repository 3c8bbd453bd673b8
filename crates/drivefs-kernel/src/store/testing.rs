//! Test utilities for the store module.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drivefs_types::Stat;

use super::{DriveError, DriveHandle, DriveResult, Replication};

/// Wraps a drive and records every mutating call.
///
/// Used to verify that reconciliation issues exactly the side effects it
/// should, and to inject write failures.
pub struct RecordingDrive {
    inner: Arc<dyn DriveHandle>,
    ops: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    fail_mounts: AtomicBool,
}

impl RecordingDrive {
    pub fn new(inner: Arc<dyn DriveHandle>) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            fail_mounts: AtomicBool::new(false),
        }
    }

    /// Mutating calls so far, e.g. `["mkdir /a", "mount /m <key>"]`.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Make every subsequent `write_file` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `mount` fail. `unmount` is unaffected.
    pub fn fail_mounts(&self, fail: bool) {
        self.fail_mounts.store(fail, Ordering::SeqCst);
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl DriveHandle for RecordingDrive {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn writable(&self) -> bool {
        self.inner.writable()
    }

    async fn read_file(&self, path: &Path) -> DriveResult<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> DriveResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DriveError::Io("injected write failure".to_string()));
        }
        self.record(format!("write {}", path.display()));
        self.inner.write_file(path, data).await
    }

    async fn stat(&self, path: &Path) -> DriveResult<Stat> {
        self.inner.stat(path).await
    }

    async fn mkdir(&self, path: &Path) -> DriveResult<()> {
        self.record(format!("mkdir {}", path.display()));
        self.inner.mkdir(path).await
    }

    async fn mount(&self, path: &Path, key: &str) -> DriveResult<()> {
        if self.fail_mounts.load(Ordering::SeqCst) {
            return Err(DriveError::Io("injected mount failure".to_string()));
        }
        self.record(format!("mount {} {}", path.display(), key));
        self.inner.mount(path, key).await
    }

    async fn unmount(&self, path: &Path) -> DriveResult<()> {
        self.record(format!("unmount {}", path.display()));
        self.inner.unmount(path).await
    }

    async fn set_replication(&self, replication: Replication) -> DriveResult<()> {
        self.record(format!(
            "replicate announce={} lookup={}",
            replication.announce, replication.lookup
        ));
        self.inner.set_replication(replication).await
    }
}
