//! Named async locks.
//!
//! A `LockTable` hands out one async mutex per logical resource name
//! (`"filesystem:drives"` for the registry). Holders keep the lock across
//! `.await` points, including while waiting on a user prompt.
//!
//! Locks are not reentrant: acquiring a name that the current task already
//! holds waits forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// Table of named mutexes. Cloning shares the table.
#[derive(Clone, Default)]
pub struct LockTable {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .inner
            .lock()
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("LockTable").field("names", &names).finish()
    }
}

/// Held lock. Dropping it releases the name, also when the holding future is
/// cancelled.
pub struct LockGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::trace!(lock = %self.name, "released");
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        // A poisoned table only means another thread panicked while inserting;
        // the map itself is still usable.
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(name.to_string()).or_default().clone()
    }

    /// Wait for and acquire the lock called `name`.
    pub async fn lock(&self, name: &str) -> LockGuard {
        let guard = self.mutex(name).lock_owned().await;
        tracing::trace!(lock = %name, "acquired");
        LockGuard {
            name: name.to_string(),
            _guard: guard,
        }
    }

    /// Acquire `name` only if nobody holds it.
    pub fn try_lock(&self, name: &str) -> Option<LockGuard> {
        let guard = self.mutex(name).try_lock_owned().ok()?;
        Some(LockGuard {
            name: name.to_string(),
            _guard: guard,
        })
    }

    /// True if some caller currently holds `name`.
    pub fn is_locked(&self, name: &str) -> bool {
        self.try_lock(name).is_none()
    }
}
