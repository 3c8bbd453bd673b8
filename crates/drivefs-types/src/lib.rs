//! Pure data types for drivefs: registry entries, manifests, stats and drive URLs.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists
//! so that consumers can read and write the registry and address-book documents
//! without pulling in drivefs-kernel's storage stack.

pub mod drive;
pub mod meta;
pub mod profile;
pub mod stat;
pub mod url;

// Flat re-exports for convenience
pub use drive::*;
pub use meta::*;
pub use profile::*;
pub use stat::*;
pub use url::*;
