//! Drive key generation.
//!
//! Keys are 32 bytes rendered as 64 lowercase hex characters. Stores that
//! create drives locally (memory and directory stores) mint keys here; a real
//! peer-to-peer store derives them from the drive's signing keypair instead.

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh 64-character hex drive key.
///
/// Mixes `RandomState` seeds, the current time and a process-wide counter so
/// that two keys minted in the same nanosecond still differ.
pub fn generate_key() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut key = String::with_capacity(drivefs_types::KEY_HEX_LEN);
    for lane in 0..4u64 {
        let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
        hasher.write_u128(now.as_nanos());
        hasher.write_u64(sequence);
        hasher.write_u64(lane);
        key.push_str(&format!("{:016x}", hasher.finish()));
    }
    key
}
