//! Filesystem utilities.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Write `contents` to `path` only if the file does not already hold exactly
/// those bytes. Returns `true` when the file was written.
///
/// The write goes through a temporary sibling file that is renamed into
/// place, so readers never observe a half-written file.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    // Same bytes: keep the old timestamp
    if let Ok(existing) = fs::read(path) {
        if existing == contents.as_bytes() {
            return Ok(false);
        }
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    ensure_dir(parent)?;

    // Write beside the target, then rename over it
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to write file: {}", path.display()))?;

    Ok(true)
}

/// Remove a file if it exists.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove file: {}", path.display())),
    }
}

/// Modification time of a file or directory, if it exists.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Check whether `reference` is at least as new as every path in `inputs`.
///
/// A missing reference, or any missing input, counts as "changed".
pub fn is_file_timestamp_current(reference: &Path, inputs: &[PathBuf]) -> bool {
    let Some(reference_time) = modified_time(reference) else {
        return false;
    };

    for input in inputs {
        match modified_time(input) {
            Some(time) if time <= reference_time => {}
            Some(_) => {
                tracing::debug!("{} is newer than {}", input.display(), reference.display());
                return false;
            }
            None => {
                tracing::debug!("{} does not exist", input.display());
                return false;
            }
        }
    }

    true
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // nothing left to pop: the path climbs above its start
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Render a path with forward slashes, as package managers expect in
/// workspace manifests and lockfiles.
pub fn to_slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
