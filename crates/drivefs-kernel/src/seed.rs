//! Default content written into a freshly created root drive.

use std::path::Path;

use async_trait::async_trait;
use drivefs_types::Bookmark;

use crate::config::FilesystemConfig;
use crate::manager::{available_name, FsError, FsResult};
use crate::store::DriveHandle;

/// Writes default content into a new root drive.
///
/// Seeders run once, when setup creates the root drive. They are never run
/// against an existing root.
#[async_trait]
pub trait ContentSeeder: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    async fn seed(&self, root: &dyn DriveHandle, config: &FilesystemConfig) -> FsResult<()>;
}

/// Writes `config.default_bookmarks` as `<bookmarks_dir>/<slug>.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBookmarks;

#[async_trait]
impl ContentSeeder for DefaultBookmarks {
    fn name(&self) -> &str {
        "default-bookmarks"
    }

    async fn seed(&self, root: &dyn DriveHandle, config: &FilesystemConfig) -> FsResult<()> {
        let dir = Path::new(&config.bookmarks_dir);
        for bookmark in &config.default_bookmarks {
            write_bookmark(root, dir, bookmark, config.name_search_limit).await?;
        }
        Ok(())
    }
}

async fn write_bookmark(
    root: &dyn DriveHandle,
    dir: &Path,
    bookmark: &Bookmark,
    limit: u64,
) -> FsResult<()> {
    let name = available_name(root, dir, &slugify(&bookmark.title), Some("json"), '-', limit).await?;
    let path = dir.join(&name);
    let json = serde_json::to_string_pretty(bookmark).map_err(|e| FsError::Document {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    root.write_file(&path, json.as_bytes()).await?;
    tracing::debug!(path = %path.display(), href = %bookmark.href, "wrote bookmark");
    Ok(())
}

/// Lowercase, alphanumeric runs joined by `-`.
fn slugify(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "bookmark".to_string()
    } else {
        slug
    }
}
