//! Global context for monorail operations.
//!
//! Provides centralized access to the working directory, the user's
//! monorail home, and output preferences.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::workspace::REPO_CONFIG_NAME;
use crate::util::config::{self, Config};

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for user-wide monorail data (~/.monorail/)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let home = config::global_config_dir().unwrap_or_else(|| PathBuf::from(".monorail"));

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
            color: true,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Use a different monorail home (tests, sandboxed CI).
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the monorail home directory (~/.monorail/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the credential cache file path.
    pub fn credentials_path(&self) -> PathBuf {
        self.home.join("credentials.json")
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Find `monorail.toml` starting from cwd and searching upward.
    pub fn find_repo_config(&self) -> Result<PathBuf> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(REPO_CONFIG_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                anyhow::bail!(
                    "could not find `{}` in `{}` or any parent directory",
                    REPO_CONFIG_NAME,
                    self.cwd.display()
                );
            }
        }
    }

    /// Load the user configuration layered for the given repository.
    pub fn user_config(&self, repo_root: &Path) -> Config {
        config::load_config(
            Some(&self.config_path()),
            &config::project_config_path(repo_root),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(ctx.home().to_string_lossy().contains("monorail"));
    }

    #[test]
    fn test_find_repo_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join(REPO_CONFIG_NAME);
        std::fs::write(&config, "").unwrap();
        let nested = tmp.path().join("packages").join("a");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested).unwrap();
        assert_eq!(ctx.find_repo_config().unwrap(), config);
    }

    #[test]
    fn test_find_repo_config_missing() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();
        // Nothing above a fresh temp dir should carry a monorail.toml
        assert!(ctx.find_repo_config().is_err());
    }

    #[test]
    fn test_user_config_layering() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("config.toml"), "[install]\nparallelism = 3\n").unwrap();

        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(repo.join(".monorail")).unwrap();
        std::fs::write(
            repo.join(".monorail").join("config.toml"),
            "[install]\nmax-attempts = 7\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_cwd(repo.clone()).unwrap().with_home(home);
        let config = ctx.user_config(&repo);
        assert_eq!(config.install.parallelism, Some(3));
        assert_eq!(config.install.max_attempts, Some(7));
    }
}
