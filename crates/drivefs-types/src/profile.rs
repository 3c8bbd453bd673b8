//! Address book and bookmark documents kept in the root drive.

use serde::{Deserialize, Serialize};

/// One user profile listed in the address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// `{ "profiles": [ ... ] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
}

/// A bookmark record as seeded into the bookmarks directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub href: String,
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
}
