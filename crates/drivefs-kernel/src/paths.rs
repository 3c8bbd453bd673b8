//! XDG Base Directory paths for drivefs.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` |
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` |
//!
//! Drive contents and the state database live under the data directory,
//! configuration under the config directory.

use std::path::PathBuf;

use directories::BaseDirs;

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Get XDG data home directory.
///
/// Returns `$XDG_DATA_HOME` or falls back to `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
}

/// Get XDG config home directory.
///
/// Returns `$XDG_CONFIG_HOME` or falls back to `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config"))
}

/// drivefs data directory: `$XDG_DATA_HOME/drivefs`.
pub fn data_dir() -> PathBuf {
    xdg_data_home().join("drivefs")
}

/// drivefs config directory: `$XDG_CONFIG_HOME/drivefs`.
pub fn config_dir() -> PathBuf {
    xdg_config_home().join("drivefs")
}

/// Where [`LocalDriveStore`](crate::LocalDriveStore) keeps drives by default.
pub fn drives_dir() -> PathBuf {
    data_dir().join("drives")
}

/// Path of the state database.
pub fn state_db_path() -> PathBuf {
    data_dir().join("state.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_paths_nest_under_data_dir() {
        let data = data_dir();
        assert!(data.ends_with("drivefs"));
        assert!(drives_dir().starts_with(&data));
        assert!(state_db_path().starts_with(&data));
        assert_eq!(state_db_path().file_name().and_then(|n| n.to_str()), Some("state.db"));
    }

    #[test]
    fn config_dir_is_separate_from_data_dir() {
        assert!(config_dir().ends_with("drivefs"));
        assert_ne!(config_dir(), data_dir());
    }

    #[test]
    fn home_is_never_empty() {
        assert!(!home_dir().as_os_str().is_empty());
    }
}
