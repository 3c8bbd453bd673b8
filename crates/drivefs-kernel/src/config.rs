//! Configuration for the filesystem manager.
//!
//! Configuration is loaded from `~/.config/drivefs/filesystem.toml`. Every
//! field has a default, so an empty or missing file is valid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use drivefs_types::Bookmark;
use serde::{Deserialize, Serialize};

/// Configuration for [`FilesystemManager`](crate::FilesystemManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Which profile record owns the root drive.
    #[serde(default)]
    pub profile_id: i64,

    /// Registry document inside the root drive.
    #[serde(default = "default_registry_path")]
    pub registry_path: String,

    /// Address book document inside the root drive.
    #[serde(default = "default_address_book_path")]
    pub address_book_path: String,

    /// Directory default bookmarks are written into.
    #[serde(default = "default_bookmarks_dir")]
    pub bookmarks_dir: String,

    /// Directories ensured in the root drive on every setup.
    #[serde(default = "default_well_known_dirs")]
    pub well_known_dirs: Vec<String>,

    /// Name of the lock serializing registry mutations.
    #[serde(default = "default_registry_lock")]
    pub registry_lock: String,

    /// Upper bound on suffixes tried by `get_available_name`.
    #[serde(default = "default_name_search_limit")]
    pub name_search_limit: u64,

    /// Bookmarks written when the root drive is first created.
    #[serde(default)]
    pub default_bookmarks: Vec<Bookmark>,

    /// Override for the data directory (drives and state database).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_registry_path() -> String {
    "/drives.json".to_string()
}

fn default_address_book_path() -> String {
    "/address-book.json".to_string()
}

fn default_bookmarks_dir() -> String {
    "/bookmarks".to_string()
}

fn default_well_known_dirs() -> Vec<String> {
    vec![default_bookmarks_dir()]
}

fn default_registry_lock() -> String {
    "filesystem:drives".to_string()
}

fn default_name_search_limit() -> u64 {
    1_000_000_000
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            profile_id: 0,
            registry_path: default_registry_path(),
            address_book_path: default_address_book_path(),
            bookmarks_dir: default_bookmarks_dir(),
            well_known_dirs: default_well_known_dirs(),
            registry_lock: default_registry_lock(),
            name_search_limit: default_name_search_limit(),
            default_bookmarks: Vec::new(),
            data_dir: None,
        }
    }
}

impl FilesystemConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "drivefs")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("filesystem.toml"))
    }

    /// Data directory: the override if set, else the XDG default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::paths::data_dir)
    }
}
