//! User configuration file support for monorail.
//!
//! monorail supports two configuration file locations:
//! - Global: `~/.monorail/config.toml` - User-wide defaults
//! - Project: `<repo>/.monorail/config.toml` - Per-checkout overrides
//!
//! Project config takes precedence over global config. Repository-wide
//! settings that every contributor must share live in `monorail.toml`
//! instead (see [`crate::core::workspace`]).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// User configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Install settings
    pub install: InstallConfig,
}

/// Install-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallConfig {
    /// How many times to invoke the package manager before giving up
    pub max_attempts: Option<u32>,

    /// Upper bound on concurrent per-project work (None = auto-detect)
    pub parallelism: Option<usize>,

    /// Pass diagnostic flags to the package manager
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.install.max_attempts.is_some() {
            self.install.max_attempts = other.install.max_attempts;
        }
        if other.install.parallelism.is_some() {
            self.install.parallelism = other.install.parallelism;
        }
        if other.install.debug {
            self.install.debug = true;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (<repo>/.monorail/config.toml)
/// 2. Global config (~/.monorail/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global monorail config directory (~/.monorail).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".monorail"))
}

/// Get the project config path (<repo>/.monorail/config.toml).
pub fn project_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".monorail").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.install.max_attempts.is_none());
        assert!(config.install.parallelism.is_none());
        assert!(!config.install.debug);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[install]
max-attempts = 5
parallelism = 4
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.install.max_attempts, Some(5));
        assert_eq!(config.install.parallelism, Some(4));
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(&global_path, "[install]\nmax-attempts = 2\nparallelism = 8\n").unwrap();
        std::fs::write(&project_path, "[install]\nmax-attempts = 4\n").unwrap();

        let config = load_config(Some(&global_path), &project_path);

        assert_eq!(config.install.max_attempts, Some(4));
        assert_eq!(config.install.parallelism, Some(8));
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[install\nbroken").unwrap();

        let config = Config::load_or_default(&path);
        assert!(config.install.max_attempts.is_none());
    }
}
