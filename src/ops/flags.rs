//! Durable markers in the temp folder.
//!
//! `last-install.flag` records the environment of the last fully successful
//! install; its modification time is the reference the cheap freshness gate
//! compares against. `last-link.flag` tells the linking phase that the
//! dependency environment is complete.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::workspace::{InstallMode, StoreMode, Workspace};
use crate::util::fs;

/// The install environment recorded in the install flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallState {
    pub package_manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager_version: Option<String>,
    pub store: StoreMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub mode: InstallMode,
}

impl InstallState {
    /// The state a run against `ws` would record.
    pub fn current(ws: &Workspace, variant: Option<&str>) -> Self {
        let pm = &ws.config().package_manager;
        InstallState {
            package_manager: pm.name.clone(),
            package_manager_version: pm.version.clone(),
            store: pm.store,
            variant: variant.map(str::to_string),
            mode: ws.mode(),
        }
    }
}

/// The last-install flag.
#[derive(Debug, Clone)]
pub struct LastInstallFlag {
    path: PathBuf,
    state: InstallState,
}

impl LastInstallFlag {
    pub fn new(path: impl Into<PathBuf>, state: InstallState) -> Self {
        LastInstallFlag {
            path: path.into(),
            state,
        }
    }

    /// The flag for `ws` in its current configuration.
    pub fn for_workspace(ws: &Workspace, variant: Option<&str>) -> Self {
        LastInstallFlag::new(ws.install_flag_path(), InstallState::current(ws, variant))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    /// Whether the flag exists and records the same environment.
    pub fn is_valid(&self) -> bool {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        match serde_json::from_str::<InstallState>(&contents) {
            Ok(saved) if saved == self.state => true,
            Ok(saved) => {
                tracing::debug!(
                    "Install flag records {:?}, current environment is {:?}",
                    saved,
                    self.state
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Write the flag. Always rewrites, so the modification time moves.
    pub fn create(&self) -> Result<()> {
        let mut contents = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize install flag")?;
        contents.push('\n');
        fs::write_string(&self.path, &contents)
    }

    /// Remove the flag.
    pub fn clear(&self) -> Result<()> {
        fs::remove_file_if_exists(&self.path)
    }
}

/// The "linked" flag.
#[derive(Debug, Clone)]
pub struct LinkFlag {
    path: PathBuf,
}

impl LinkFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LinkFlag { path: path.into() }
    }

    pub fn for_workspace(ws: &Workspace) -> Self {
        LinkFlag::new(ws.link_flag_path())
    }

    pub fn is_set(&self) -> bool {
        self.path.is_file()
    }

    pub fn create(&self) -> Result<()> {
        fs::write_string(&self.path, "{}\n")
    }

    pub fn clear(&self) -> Result<()> {
        fs::remove_file_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state() -> InstallState {
        InstallState {
            package_manager: "pnpm".to_string(),
            package_manager_version: Some("8.15.0".to_string()),
            store: StoreMode::Local,
            variant: None,
            mode: InstallMode::Workspace,
        }
    }

    #[test]
    fn test_install_flag_round_trip() {
        let tmp = TempDir::new().unwrap();
        let flag = LastInstallFlag::new(tmp.path().join("last-install.flag"), state());
        assert!(!flag.is_valid());

        flag.create().unwrap();
        assert!(flag.is_valid());

        flag.clear().unwrap();
        assert!(!flag.is_valid());
    }

    #[test]
    fn test_install_flag_invalid_when_environment_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("last-install.flag");
        LastInstallFlag::new(&path, state()).create().unwrap();

        let mut other = state();
        other.variant = Some("legacy".to_string());
        assert!(!LastInstallFlag::new(&path, other).is_valid());
    }

    #[test]
    fn test_link_flag() {
        let tmp = TempDir::new().unwrap();
        let flag = LinkFlag::new(tmp.path().join("temp/last-link.flag"));
        assert!(!flag.is_set());
        flag.create().unwrap();
        assert!(flag.is_set());
        flag.clear().unwrap();
        assert!(!flag.is_set());
    }
}
