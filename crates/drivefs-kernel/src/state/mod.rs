//! State persistence outside the root drive.
//!
//! Two things live here rather than in a drive:
//! - Profiles: which root drive belongs to the browsing profile
//! - Drive metadata: a cache of titles/descriptions for registered drives
//!
//! State is stored at `$XDG_DATA_HOME/drivefs/state.db`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use drivefs_types::DriveMeta;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

/// Schema SQL embedded from schema/state.sql.
const SCHEMA_SQL: &str = include_str!("../../../../schema/state.sql");

/// Version of `SCHEMA_SQL`, recorded in the `meta` table.
pub const SCHEMA_VERSION: u32 = 1;

/// The browsing profile record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: i64,
    /// URL of the profile's root drive, once created.
    pub url: Option<String>,
}

/// Reads and writes the profile record.
pub trait ProfileStore: Send + Sync {
    /// Fetch profile `id`, inserting an empty record if there is none.
    fn load_or_create_profile(&self, id: i64) -> Result<ProfileRecord>;

    /// Record the root drive URL for profile `id`.
    fn set_root_url(&self, id: i64, url: &str) -> Result<()>;
}

/// Cache of drive metadata.
#[async_trait]
pub trait DriveMetaStore: Send + Sync {
    /// Cached metadata for `key`. A cache miss yields [`DriveMeta::bare`].
    async fn get_meta(&self, key: &str) -> Result<DriveMeta>;

    /// Insert or replace the cached metadata for `meta.key`.
    async fn put_meta(&self, meta: &DriveMeta) -> Result<()>;
}

/// Persistent state store backed by SQLite.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

impl StateStore {
    /// Open or create a state database at the given path.
    ///
    /// Creates parent directories and initializes schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory: {}", parent.display()))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening state database: {}", path.display()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory state store (for testing or ephemeral profiles).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("creating in-memory state database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("state database lock poisoned"))
    }

    /// Initialize the database schema.
    ///
    /// Refuses a database written by a newer schema; stamps a fresh one with
    /// [`SCHEMA_VERSION`].
    fn init_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(SCHEMA_SQL)
            .context("initializing state schema")?;

        match self.schema_version()? {
            Some(found) if found > SCHEMA_VERSION => bail!(
                "state database has schema version {}, this build supports up to {}",
                found,
                SCHEMA_VERSION
            ),
            Some(found) => tracing::debug!(version = found, "state schema"),
            None => self.set_meta_value("schema_version", &SCHEMA_VERSION.to_string())?,
        }
        Ok(())
    }

    /// Schema version recorded in the database, if any.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        match self.get_meta_value("schema_version")? {
            Some(value) => value
                .parse()
                .map(Some)
                .with_context(|| format!("invalid schema_version: {}", value)),
            None => Ok(None),
        }
    }

    // ================================================================
    // Metadata
    // ================================================================

    fn get_meta_value(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("loading meta: {}", key))
    }

    fn set_meta_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .with_context(|| format!("saving meta: {}", key))?;
        Ok(())
    }

    // ================================================================
    // Drive metadata cache
    // ================================================================

    fn load_drive_meta(&self, key: &str) -> Result<Option<DriveMeta>> {
        self.conn()?
            .query_row(
                "SELECT key, url, title, description, writable FROM drive_meta WHERE key = ?1",
                params![key],
                |row| {
                    Ok(DriveMeta {
                        key: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        writable: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()
            .with_context(|| format!("loading drive meta: {}", key))
    }

    fn save_drive_meta(&self, meta: &DriveMeta) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO drive_meta (key, url, title, description, writable, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
                params![
                    meta.key,
                    meta.url,
                    meta.title,
                    meta.description,
                    meta.writable as i64,
                ],
            )
            .with_context(|| format!("saving drive meta: {}", meta.key))?;
        Ok(())
    }
}

impl ProfileStore for StateStore {
    fn load_or_create_profile(&self, id: i64) -> Result<ProfileRecord> {
        let conn = self.conn()?;
        conn.execute("INSERT OR IGNORE INTO profiles (id) VALUES (?1)", params![id])
            .with_context(|| format!("creating profile {}", id))?;
        let url = conn
            .query_row("SELECT url FROM profiles WHERE id = ?1", params![id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .with_context(|| format!("loading profile {}", id))?;
        Ok(ProfileRecord { id, url })
    }

    fn set_root_url(&self, id: i64, url: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO profiles (id, url) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET url = excluded.url",
                params![id, url],
            )
            .with_context(|| format!("saving root url for profile {}", id))?;
        Ok(())
    }
}

#[async_trait]
impl DriveMetaStore for StateStore {
    async fn get_meta(&self, key: &str) -> Result<DriveMeta> {
        Ok(self
            .load_drive_meta(key)?
            .unwrap_or_else(|| DriveMeta::bare(key)))
    }

    async fn put_meta(&self, meta: &DriveMeta) -> Result<()> {
        self.save_drive_meta(meta)
    }
}
