//! Move-aside deletion of large directories.
//!
//! Deleting a big `node_modules` tree in place takes long enough that an
//! interrupted run can leave it half-deleted. The recycler instead renames
//! the directory into a holding folder (a single atomic operation on the same
//! volume) and deletes the holding folder's contents later.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::util::fs::ensure_dir;

/// Moves directories into a recycle folder for deferred deletion.
#[derive(Debug)]
pub struct Recycler {
    folder: PathBuf,
    counter: AtomicU64,
}

impl Recycler {
    /// Create a recycler that stages items under `folder`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Recycler {
            folder: folder.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// The holding folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Move `path` into the recycle folder. Missing paths are ignored.
    ///
    /// Returns the new location when something was moved.
    pub fn recycle(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        ensure_dir(&self.folder)?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let leaf = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string());
        let target = self
            .folder
            .join(format!("{}-{}-{}-{}", leaf, std::process::id(), stamp, n));

        std::fs::rename(path, &target).with_context(|| {
            format!(
                "failed to move {} to {}",
                path.display(),
                target.display()
            )
        })?;

        tracing::debug!("Recycled {} -> {}", path.display(), target.display());
        Ok(Some(target))
    }

    /// Delete everything staged in the recycle folder.
    ///
    /// Failures are logged and skipped; leftovers are retried next time.
    pub fn purge(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.folder) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
        removed
    }
}
