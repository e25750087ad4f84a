//! The install pipeline.
//!
//! ```text
//! reconcile -> synthesize -> freshness -> (skip?) -> execute -> post-install
//! ```
//!
//! The [`InstallManager`] selected by the workspace's install mode supplies
//! each stage; this module owns the ordering and the decisions between them.

pub mod errors;
pub mod executor;
pub mod manager;

use anyhow::Result;

use crate::cache::BuildCacheProvider;
use crate::core::workspace::{InstallMode, Workspace};
use crate::ops::freshness::Freshness;
use crate::ops::post_install::PostInstallReport;
use crate::ops::reconcile::{self, ReconcileOptions};
use crate::util::recycler::Recycler;

pub use errors::InstallError;
pub use executor::{ProcessRunner, SystemRunner};
pub use manager::{manager_for, InstallManager, StandaloneInstallManager, WorkspaceInstallManager};

/// Default number of package-manager attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on the post-install worker pool.
pub const MAX_PARALLELISM: usize = 16;

/// The default worker-pool size: available parallelism, capped.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_PARALLELISM)
}

/// Per-run install configuration.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Alternate lockfile/preferred-versions set
    pub variant: Option<String>,
    /// Rewrite sibling references and regenerate the lockfile from scratch
    pub full_upgrade: bool,
    /// Whether the committed lockfile (and manifests) may change
    pub allow_lockfile_mutation: bool,
    pub max_attempts: u32,
    /// Extra package-manager arguments selecting projects
    pub filter_args: Vec<String>,
    /// Start from an empty dependency-output directory
    pub purge: bool,
    /// Ask the package manager for diagnostic output
    pub debug_package_manager: bool,
    /// Worker-pool size for per-project work
    pub parallelism: usize,
}

impl Default for InstallOptions {
    fn default() -> Self {
        InstallOptions {
            variant: None,
            full_upgrade: false,
            allow_lockfile_mutation: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            filter_args: Vec::new(),
            purge: false,
            debug_package_manager: false,
            parallelism: default_parallelism(),
        }
    }
}

impl InstallOptions {
    /// Select `project` and everything it depends on.
    pub fn add_to_filter(&mut self, project: &str) {
        self.filter_args.push("--filter".to_string());
        self.filter_args.push(format!("{}...", project));
    }
}

/// The result of [`install`].
#[derive(Debug, Clone, Default)]
pub struct InstallOutcome {
    /// The cheap gate allowed skipping the package manager
    pub skipped: bool,
    /// Package-manager attempts, 0 when skipped
    pub attempts: u32,
    /// Manifests that were rewritten and must be committed
    pub advisories: Vec<String>,
    /// Why the lockfile was stale, if it was
    pub warnings: Vec<String>,
    /// Some of those reasons remain until a full upgrade runs
    pub needs_full_upgrade: bool,
    pub post_install: PostInstallReport,
}

/// Reject settings that cannot work before any file is touched.
pub fn validate(ws: &Workspace, options: &InstallOptions) -> Result<(), InstallError> {
    if ws.mode() == InstallMode::Workspace && ws.temp_override().is_some() {
        return Err(errors::environment_override_error());
    }

    if !ws.validate_variant(options.variant.as_deref()) {
        return Err(InstallError::UnknownVariant {
            variant: options.variant.clone().unwrap_or_default(),
        });
    }

    Ok(())
}

/// Install dependencies for the workspace.
pub fn install(
    ws: &mut Workspace,
    options: &InstallOptions,
    runner: &dyn ProcessRunner,
    cache: Option<&dyn BuildCacheProvider>,
) -> Result<InstallOutcome> {
    validate(ws, options)?;

    let mut manager = manager_for(ws, options.clone(), cache);
    let prepared = manager.prepare(ws)?;
    let fresh = prepared.freshness.is_fresh();

    let mut outcome = InstallOutcome {
        advisories: prepared.advisories,
        needs_full_upgrade: prepared.freshness.needs_full_upgrade() && !options.full_upgrade,
        warnings: prepared.freshness.into_warnings(),
        ..InstallOutcome::default()
    };

    let must_install = options.purge || options.full_upgrade || !fresh;
    if !must_install && manager.can_skip(ws) {
        tracing::info!("Dependencies are up to date");
        outcome.skipped = true;
        return Ok(outcome);
    }

    outcome.attempts = manager.install(ws, runner)?;
    outcome.post_install = manager.post_install(ws)?;

    let purged = Recycler::new(ws.recycler_dir()).purge();
    if purged > 0 {
        tracing::debug!("Deleted {} recycled item(s)", purged);
    }

    Ok(outcome)
}

/// Report whether an install would need to update the lockfile, without
/// writing anything.
pub fn check(ws: &Workspace, variant: Option<&str>) -> Result<Freshness> {
    let options = InstallOptions {
        variant: variant.map(str::to_string),
        ..InstallOptions::default()
    };
    validate(ws, &options)?;

    // plan as if rewrites were allowed, so they show up as warnings instead
    // of failing the check
    let plan = reconcile::plan(
        ws,
        ReconcileOptions {
            allow_lockfile_mutation: true,
            full_upgrade: true,
        },
    )?;

    let mut evaluation = manager::evaluate(ws, variant, false)?;
    manager::record_plan(&mut evaluation.freshness, &plan);
    Ok(evaluation.freshness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::flags::{LastInstallFlag, LinkFlag};
    use crate::test_support::{matching_lockfile, RepoFixture, StubRunner, TestRepo};
    use std::path::PathBuf;

    fn repo() -> TestRepo {
        let repo = RepoFixture::new()
            .project("a", "packages/a", "1.0.0", &[("b", "workspace:^1.0.0"), ("lodash", "^4.17.0")])
            .project("b", "packages/b", "1.2.0", &[("ms", "^2.1.0")])
            .extra("[package-manager]\nexecutable = \"tools/pnpm\"")
            .build();
        repo.write("tools/pnpm", "#!/bin/sh\nexit 0\n");
        repo
    }

    #[test]
    fn test_install_then_skip() {
        let repo = repo();
        let mut ws = repo.workspace();
        repo.write("common/config/monorail/pnpm-lock.yaml", &matching_lockfile(&ws));
        let runner = StubRunner::succeeding().with_lockfile(matching_lockfile(&ws));

        let outcome = install(&mut ws, &InstallOptions::default(), &runner, None).unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.post_install.subsets_written, 2);
        assert!(LastInstallFlag::for_workspace(&ws, None).is_valid());

        let outcome = install(&mut ws, &InstallOptions::default(), &runner, None).unwrap();
        assert!(outcome.skipped);
        assert_eq!(runner.calls(), 1);
    }

    #[test]
    fn test_failed_purge_clears_link_flag() {
        let repo = repo();
        let mut ws = repo.workspace();
        repo.write("common/config/monorail/pnpm-lock.yaml", &matching_lockfile(&ws));
        let runner = StubRunner::succeeding().with_lockfile(matching_lockfile(&ws));
        install(&mut ws, &InstallOptions::default(), &runner, None).unwrap();
        assert!(LinkFlag::for_workspace(&ws).is_set());

        repo.write("common/temp/node_modules/.pnpm/lock.yaml", "");
        let options = InstallOptions {
            purge: true,
            ..InstallOptions::default()
        };
        let failing = StubRunner::failing(DEFAULT_MAX_ATTEMPTS);
        assert!(install(&mut ws, &options, &failing, None).is_err());

        assert!(!repo.root().join("common/temp/node_modules/.pnpm").exists());
        assert!(!LinkFlag::for_workspace(&ws).is_set());
        assert!(!LastInstallFlag::for_workspace(&ws, None).is_valid());
    }

    #[test]
    fn test_install_stale_lockfile_fails() {
        let repo = repo();
        let mut ws = repo.workspace();
        let runner = StubRunner::succeeding();

        let err = install(&mut ws, &InstallOptions::default(), &runner, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::LockfileOutOfDate { .. })
        ));
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn test_update_writes_committed_lockfile() {
        let repo = repo();
        let mut ws = repo.workspace();
        let lockfile = matching_lockfile(&ws);
        let runner = StubRunner::succeeding().with_lockfile(lockfile.clone());

        let options = InstallOptions {
            allow_lockfile_mutation: true,
            ..InstallOptions::default()
        };
        let outcome = install(&mut ws, &options, &runner, None).unwrap();

        assert!(!outcome.warnings.is_empty());
        assert!(outcome.post_install.lockfile_updated);
        assert_eq!(repo.read("common/config/monorail/pnpm-lock.yaml"), lockfile);
        assert!(check(&ws, None).unwrap().is_fresh());
    }

    #[test]
    fn test_environment_override_rejected_in_workspace_mode() {
        let repo = repo();
        let mut ws =
            Workspace::load_with_temp_override(&repo.config_path(), Some(PathBuf::from("/tmp/x")))
                .unwrap();
        let runner = StubRunner::succeeding();

        let err = install(&mut ws, &InstallOptions::default(), &runner, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::EnvironmentOverride { .. })
        ));
    }

    #[test]
    fn test_unknown_variant() {
        let repo = repo();
        let ws = repo.workspace();
        let err = check(&ws, Some("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_check_reports_pending_rewrites() {
        let repo = RepoFixture::new()
            .project("a", "packages/a", "1.0.0", &[("b", "^1.0.0")])
            .project("b", "packages/b", "1.2.0", &[])
            .build();
        let ws = repo.workspace();
        repo.write("common/config/monorail/pnpm-lock.yaml", &matching_lockfile(&ws));

        let freshness = check(&ws, None).unwrap();
        assert_eq!(
            freshness.warnings(),
            &["1 dependency reference(s) in \"a\" must become workspace references".to_string()]
        );
        assert!(repo.read("packages/a/package.json").contains("\"^1.0.0\""));
        assert!(freshness.needs_full_upgrade());
    }

    #[test]
    fn test_filter_args() {
        let mut options = InstallOptions::default();
        options.add_to_filter("a");
        assert_eq!(options.filter_args, vec!["--filter", "a..."]);
        assert!(default_parallelism() >= 1 && default_parallelism() <= MAX_PARALLELISM);
    }
}
