//! The repo-state record: which preferred versions produced the lockfile.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::fs;

static CONFLICT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(<{7}|={7}|>{7})").expect("valid conflict pattern"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoStateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_versions_hash: Option<String>,
}

/// Persisted record of the preferred-versions fingerprint behind the
/// checked-in lockfile.
#[derive(Debug, Clone)]
pub struct RepoState {
    path: PathBuf,
    preferred_versions_hash: Option<String>,
    is_valid: bool,
}

impl RepoState {
    /// Load the record. A missing file is valid and empty; a file that does
    /// not parse or carries merge-conflict markers is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RepoState {
                path: path.to_path_buf(),
                preferred_versions_hash: None,
                is_valid: true,
            });
        }

        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(path, &contents))
    }

    /// Interpret record text.
    pub fn parse(path: &Path, contents: &str) -> Self {
        if CONFLICT_MARKER.is_match(contents) {
            tracing::debug!("{} contains merge conflict markers", path.display());
            return RepoState {
                path: path.to_path_buf(),
                preferred_versions_hash: None,
                is_valid: false,
            };
        }

        match serde_json::from_str::<RepoStateFile>(contents) {
            Ok(file) => RepoState {
                path: path.to_path_buf(),
                preferred_versions_hash: file.preferred_versions_hash,
                is_valid: true,
            },
            Err(e) => {
                tracing::debug!("{} is malformed: {}", path.display(), e);
                RepoState {
                    path: path.to_path_buf(),
                    preferred_versions_hash: None,
                    is_valid: false,
                }
            }
        }
    }

    /// Where the record lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is structurally valid.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The recorded fingerprint.
    pub fn preferred_versions_hash(&self) -> Option<&str> {
        self.preferred_versions_hash.as_deref()
    }

    /// Record a new fingerprint. The record becomes valid.
    pub fn set_preferred_versions_hash(&mut self, hash: impl Into<String>) {
        self.preferred_versions_hash = Some(hash.into());
        self.is_valid = true;
    }

    /// Persist the record if its content changed.
    pub fn save(&self) -> Result<bool> {
        let file = RepoStateFile {
            preferred_versions_hash: self.preferred_versions_hash.clone(),
        };
        let mut contents = serde_json::to_string_pretty(&file)
            .with_context(|| format!("failed to serialize {}", self.path.display()))?;
        contents.push('\n');
        fs::write_if_changed(&self.path, &contents)
    }
}
