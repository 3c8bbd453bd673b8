//! Stat results for paths inside a drive.

/// Kind of entry at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Mount target of a path that is a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTarget {
    /// Key of the mounted drive.
    pub key: String,
}

/// What lives at a path.
///
/// Mount points report as directories and carry their target in `mount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// Size in bytes (0 for directories and mounts).
    pub size: u64,
    pub mount: Option<MountTarget>,
}

impl Stat {
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            mount: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            mount: None,
        }
    }

    pub fn mount(key: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            mount: Some(MountTarget { key: key.into() }),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Key of the mounted drive, if this is a mount point.
    pub fn mount_key(&self) -> Option<&str> {
        self.mount.as_ref().map(|m| m.key.as_str())
    }
}
