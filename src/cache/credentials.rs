//! User credential cache (`~/.monorail/credentials.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialEntry {
    credential: String,
    /// Seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<u64>,
}

impl CredentialEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    entries: BTreeMap<String, CredentialEntry>,
}

/// Credentials keyed by opaque id, with optional expiry.
///
/// Expired entries are invisible to [`get`](Self::get) and dropped on save.
#[derive(Debug)]
pub struct CredentialCache {
    path: PathBuf,
    entries: BTreeMap<String, CredentialEntry>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn to_unix(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl CredentialCache {
    /// Load the cache. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str::<CredentialFile>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
                .entries
        } else {
            BTreeMap::new()
        };

        Ok(CredentialCache {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Load the cache, treating an unreadable file as empty.
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring credential cache: {:#}", e);
            CredentialCache {
                path: path.to_path_buf(),
                entries: BTreeMap::new(),
            }
        })
    }

    /// A live credential.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .get(id)
            .filter(|entry| !entry.is_expired(unix_now()))
            .map(|entry| entry.credential.as_str())
    }

    /// Store a credential, replacing any existing one.
    pub fn set(&mut self, id: &str, credential: &str, expires: Option<SystemTime>) {
        self.entries.insert(
            id.to_string(),
            CredentialEntry {
                credential: credential.to_string(),
                expires: expires.map(to_unix),
            },
        );
    }

    /// Remove a credential. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop expired entries.
    pub fn trim_expired(&mut self) {
        let now = unix_now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Trim and persist.
    pub fn save(&mut self) -> Result<bool> {
        self.trim_expired();
        let file = CredentialFile {
            entries: self.entries.clone(),
        };
        let mut contents =
            serde_json::to_string_pretty(&file).context("failed to serialize credentials")?;
        contents.push('\n');
        fs::write_if_changed(&self.path, &contents)
    }
}
