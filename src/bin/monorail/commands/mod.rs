//! Command implementations

pub mod check;
pub mod completions;
pub mod install;
pub mod update;

use anyhow::Result;

use monorail::cache::{CredentialCache, LocalFolderCache};
use monorail::ops::install::{default_parallelism, InstallOutcome, DEFAULT_MAX_ATTEMPTS};
use monorail::util::Config;
use monorail::{GlobalContext, InstallOptions, Workspace};

/// A loaded repository plus the user settings that apply to it.
pub struct Session {
    pub ws: Workspace,
    pub config: Config,
    pub cache: Option<LocalFolderCache>,
}

impl Session {
    pub fn open(ctx: &GlobalContext) -> Result<Self> {
        let config_path = ctx.find_repo_config()?;
        let ws = Workspace::load(&config_path)?;
        let config = ctx.user_config(ws.root());

        let credentials = CredentialCache::load_or_empty(&ctx.credentials_path());
        let cache = LocalFolderCache::from_workspace(&ws, &credentials);

        Ok(Session { ws, config, cache })
    }

    /// Options shared by `install` and `update`, before command flags apply.
    pub fn install_options(&self, variant: Option<String>, purge: bool) -> InstallOptions {
        let max_attempts = self
            .config
            .install
            .max_attempts
            .or(self.ws.config().install.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        InstallOptions {
            variant,
            purge,
            max_attempts,
            debug_package_manager: self.config.install.debug,
            parallelism: self
                .config
                .install
                .parallelism
                .unwrap_or_else(default_parallelism),
            ..InstallOptions::default()
        }
    }
}

/// Print what an install run did.
pub fn print_outcome(outcome: &InstallOutcome) {
    for warning in &outcome.warnings {
        tracing::debug!("{}", warning);
    }
    for advisory in &outcome.advisories {
        eprintln!("warning: {}", advisory);
    }

    if outcome.skipped {
        eprintln!("    Finished dependencies are already up to date");
        return;
    }

    eprintln!(
        "    Finished installing after {} attempt(s), {} lock subset(s) updated",
        outcome.attempts, outcome.post_install.subsets_written
    );
    if outcome.post_install.lockfile_updated {
        eprintln!("    Updated the committed lockfile; commit it along with your changes");
    }
}
