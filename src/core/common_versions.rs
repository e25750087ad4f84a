//! Workspace-wide preferred versions (`common-versions.json`).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs;
use crate::util::hash::Fingerprint;

/// Preferred version ranges applied across the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommonVersions {
    /// Package name → preferred range
    pub preferred_versions: BTreeMap<String, String>,
}

impl CommonVersions {
    /// Load preferred versions. A missing file means "none".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(CommonVersions::default());
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Fingerprint of the preferred versions, independent of file formatting
    /// and key order.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str("preferredVersions");
        for (name, range) in &self.preferred_versions {
            fp.update_pair(name, range);
        }
        fp.finish()
    }

    /// The preferred range for a package, if any.
    pub fn preferred(&self, name: &str) -> Option<&str> {
        self.preferred_versions.get(name).map(String::as_str)
    }
}
