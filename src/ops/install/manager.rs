//! Install managers.
//!
//! [`InstallManager`] is the seam between the install pipeline and the two
//! ways of laying dependencies out for the package manager:
//! - [`WorkspaceInstallManager`]: one package-manager workspace with an
//!   importer per project
//! - [`StandaloneInstallManager`]: one consolidated manifest whose
//!   dependencies are the union of every project's external dependencies

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cache::BuildCacheProvider;
use crate::core::common_versions::CommonVersions;
use crate::core::manifest::DependencyKind;
use crate::core::project::Project;
use crate::core::specifier::SpecifierKind;
use crate::core::workspace::{InstallMode, StoreMode, Workspace, TEMP_FOLDER_ENV};
use crate::lockfile::{Lockfile, RepoState, ROOT_IMPORTER};
use crate::ops::flags::{LastInstallFlag, LinkFlag};
use crate::ops::freshness::{self, Freshness, FreshnessInput};
use crate::ops::install::errors::InstallError;
use crate::ops::install::executor::{recovery_for, InstallExecutor, Invocation, ProcessRunner};
use crate::ops::install::InstallOptions;
use crate::ops::post_install::{self, PostInstallOptions, PostInstallReport};
use crate::ops::reconcile::{self, ReconcileOptions, ReconcilePlan};
use crate::ops::synthesize::{CommonManifest, WorkspaceManifest};
use crate::util::fs;
use crate::util::process::{find_executable, ProcessBuilder};
use crate::util::recycler::Recycler;

/// What [`InstallManager::prepare`] found.
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    pub freshness: Freshness,
    /// One line per manifest rewritten on disk
    pub advisories: Vec<String>,
}

/// One way of driving the package manager.
pub trait InstallManager {
    /// Reconcile manifests, regenerate the synthesized files, stage the
    /// lockfile, and decide whether it is fresh.
    fn prepare(&mut self, ws: &mut Workspace) -> Result<Prepared>;

    /// Whether nothing changed since the last successful install.
    fn can_skip(&self, ws: &Workspace) -> bool;

    /// Run the package manager. Returns the number of attempts.
    fn install(&self, ws: &Workspace, runner: &dyn ProcessRunner) -> Result<u32>;

    /// Reconcile the workspace with the run lockfile.
    fn post_install(&self, ws: &Workspace) -> Result<PostInstallReport>;

    /// Mode-specific package-manager arguments.
    fn push_args(&self, args: &mut Vec<String>);
}

/// Pick the manager for the workspace's install mode.
pub fn manager_for<'a>(
    ws: &Workspace,
    options: InstallOptions,
    cache: Option<&'a dyn BuildCacheProvider>,
) -> Box<dyn InstallManager + 'a> {
    match ws.mode() {
        InstallMode::Workspace => Box::new(WorkspaceInstallManager::new(options, cache)),
        InstallMode::Standalone => Box::new(StandaloneInstallManager::new(options, cache)),
    }
}

/// The inputs shared by both managers' freshness decisions.
#[derive(Debug)]
pub struct Evaluation {
    pub common_versions: CommonVersions,
    pub common_manifest: CommonManifest,
    pub freshness: Freshness,
}

/// Load the committed lockfile and preferred versions, and run the
/// structural gate. Writes nothing.
pub fn evaluate(ws: &Workspace, variant: Option<&str>, full_upgrade: bool) -> Result<Evaluation> {
    let common_versions = CommonVersions::load(&ws.common_versions_path(variant))?;
    let common_manifest = CommonManifest::build(ws, &common_versions);
    let lockfile = Lockfile::load(&ws.committed_lockfile_path(variant))?;
    let repo_state = RepoState::load(&ws.repo_state_path(variant))?;

    let freshness = freshness::check(&FreshnessInput {
        workspace: ws,
        lockfile: lockfile.as_ref(),
        repo_state: &repo_state,
        common_versions: &common_versions,
        common_manifest: &common_manifest,
        full_upgrade,
    });

    Ok(Evaluation {
        common_versions,
        common_manifest,
        freshness,
    })
}

/// Note pending rewrites in the verdict; they always make it stale.
pub fn record_plan(freshness: &mut Freshness, plan: &ReconcilePlan) {
    for project in plan.projects() {
        freshness.add_full_upgrade_warning(format!(
            "{} dependency reference(s) in \"{}\" must become workspace references",
            project.edits.len(),
            project.project
        ));
    }
}

/// State and steps common to both managers.
struct ManagerBase<'a> {
    options: InstallOptions,
    cache: Option<&'a dyn BuildCacheProvider>,
    preferred_versions_hash: String,
}

impl<'a> ManagerBase<'a> {
    fn new(options: InstallOptions, cache: Option<&'a dyn BuildCacheProvider>) -> Self {
        ManagerBase {
            options,
            cache,
            preferred_versions_hash: String::new(),
        }
    }

    fn variant(&self) -> Option<&str> {
        self.options.variant.as_deref()
    }

    /// Evaluate, write the consolidated manifest, fail if stale and not
    /// allowed to update, then stage the lockfile for the package manager.
    fn finish_prepare(
        &mut self,
        ws: &Workspace,
        plan: &ReconcilePlan,
        advisories: Vec<String>,
    ) -> Result<Prepared> {
        let mut evaluation = evaluate(ws, self.variant(), self.options.full_upgrade)?;
        record_plan(&mut evaluation.freshness, plan);
        self.preferred_versions_hash = evaluation.common_versions.fingerprint();

        evaluation
            .common_manifest
            .save_if_changed(&ws.common_manifest_path())?;

        if !evaluation.freshness.is_fresh() {
            for warning in evaluation.freshness.warnings() {
                tracing::warn!("{}", warning);
            }
            if !self.options.allow_lockfile_mutation {
                return Err(InstallError::LockfileOutOfDate {
                    warnings: evaluation.freshness.into_warnings(),
                }
                .into());
            }
        }

        self.stage_lockfile(ws)?;
        stage_hook_file(ws)?;

        Ok(Prepared {
            freshness: evaluation.freshness,
            advisories,
        })
    }

    /// Put the committed lockfile where the package manager expects it. A
    /// full upgrade starts from no lockfile at all.
    fn stage_lockfile(&self, ws: &Workspace) -> Result<()> {
        let committed = ws.committed_lockfile_path(self.variant());
        let staged = ws.temp_lockfile_path();

        if self.options.full_upgrade || !committed.exists() {
            tracing::debug!("Starting without a lockfile");
            return fs::remove_file_if_exists(&staged);
        }

        let contents = fs::read_to_string(&committed)?;
        fs::write_if_changed(&staged, &contents)?;
        Ok(())
    }

    fn can_skip(&self, ws: &Workspace) -> bool {
        freshness::is_install_current(ws, self.variant())
    }

    fn command(
        &self,
        ws: &Workspace,
        mode_args: &dyn Fn(&mut Vec<String>),
    ) -> Result<ProcessBuilder> {
        let program = locate_package_manager(ws)?;

        let mut args = vec!["install".to_string()];
        mode_args(&mut args);
        args.extend(self.options.filter_args.iter().cloned());
        if self.options.debug_package_manager {
            args.extend(["--reporter", "ndjson", "--loglevel", "debug"].map(String::from));
        }

        let mut command = ProcessBuilder::new(program)
            .args(&args)
            .cwd(ws.temp_dir())
            .env("npm_config_cache", ws.npm_cache_dir().to_string_lossy())
            .env_remove(TEMP_FOLDER_ENV);
        if ws.config().package_manager.store == StoreMode::Local {
            command = command.env("npm_config_store_dir", ws.store_dir().to_string_lossy());
        }
        Ok(command)
    }

    fn install(
        &self,
        ws: &Workspace,
        runner: &dyn ProcessRunner,
        mode_args: &dyn Fn(&mut Vec<String>),
    ) -> Result<u32> {
        let command = self.command(ws, mode_args)?;

        // an interrupted install must not look current, or linked
        LastInstallFlag::for_workspace(ws, self.variant()).clear()?;
        LinkFlag::for_workspace(ws).clear()?;

        let pm = &ws.config().package_manager;
        let invocation = Invocation {
            command,
            max_attempts: self.options.max_attempts,
            purge: self.options.purge,
            output_dir: ws.temp_output_dir(),
            local_store: (pm.store == StoreMode::Local).then(|| ws.store_dir()),
            project_output_dirs: ws.projects().iter().map(Project::output_dir).collect(),
        };

        let recycler = Recycler::new(ws.recycler_dir());
        let recovery = recovery_for(pm.recovery, &recycler, &invocation.output_dir);
        let mut executor = InstallExecutor::new(runner, recovery, &recycler);
        executor.run(&invocation)
    }

    fn post_install_options(&self) -> PostInstallOptions<'_> {
        PostInstallOptions {
            variant: self.variant(),
            allow_lockfile_mutation: self.options.allow_lockfile_mutation,
            parallelism: self.options.parallelism,
            preferred_versions_hash: &self.preferred_versions_hash,
            cache: self.cache,
        }
    }
}

/// Copy the configured hook file into the temp folder, or remove a stale
/// copy when none is configured.
fn stage_hook_file(ws: &Workspace) -> Result<()> {
    let staged = ws.staged_hook_path();
    let Some(hook) = ws.hook_file_path() else {
        return fs::remove_file_if_exists(&staged);
    };

    let contents =
        fs::read_to_string(&hook).context("failed to stage the package-manager hook file")?;
    if fs::write_if_changed(&staged, &contents)? {
        tracing::debug!("Staged {} as {}", hook.display(), staged.display());
    }
    Ok(())
}

/// Find the package-manager executable.
pub fn locate_package_manager(ws: &Workspace) -> Result<PathBuf, InstallError> {
    let pm = &ws.config().package_manager;
    if let Some(executable) = &pm.executable {
        let path = ws.root().join(executable);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(InstallError::PackageManagerNotFound {
                name: path.display().to_string(),
            })
        };
    }

    find_executable(&pm.name).ok_or_else(|| InstallError::PackageManagerNotFound {
        name: pm.name.clone(),
    })
}

/// Workspace installs: every project is an importer.
pub struct WorkspaceInstallManager<'a> {
    base: ManagerBase<'a>,
}

impl<'a> WorkspaceInstallManager<'a> {
    pub fn new(options: InstallOptions, cache: Option<&'a dyn BuildCacheProvider>) -> Self {
        WorkspaceInstallManager {
            base: ManagerBase::new(options, cache),
        }
    }
}

impl InstallManager for WorkspaceInstallManager<'_> {
    fn prepare(&mut self, ws: &mut Workspace) -> Result<Prepared> {
        let reconcile_options = ReconcileOptions {
            allow_lockfile_mutation: self.base.options.allow_lockfile_mutation,
            full_upgrade: self.base.options.full_upgrade,
        };
        let plan = reconcile::plan(ws, reconcile_options)?;
        let advisories = reconcile::apply(ws, &plan)?;

        WorkspaceManifest::from_workspace(ws)?.save_if_changed(&ws.workspace_manifest_path())?;

        self.base.finish_prepare(ws, &plan, advisories)
    }

    fn can_skip(&self, ws: &Workspace) -> bool {
        self.base.can_skip(ws)
    }

    fn install(&self, ws: &Workspace, runner: &dyn ProcessRunner) -> Result<u32> {
        self.base.install(ws, runner, &|args| self.push_args(args))
    }

    fn post_install(&self, ws: &Workspace) -> Result<PostInstallReport> {
        post_install::post_install(ws, &self.base.post_install_options(), |graph, project| {
            graph.subset_for_importer(&ws.importer_key(project))
        })
    }

    fn push_args(&self, args: &mut Vec<String>) {
        args.extend(["--recursive", "--link-workspace-packages", "false"].map(String::from));
    }
}

/// Standalone installs: one consolidated manifest, no workspace.
pub struct StandaloneInstallManager<'a> {
    base: ManagerBase<'a>,
}

impl<'a> StandaloneInstallManager<'a> {
    pub fn new(options: InstallOptions, cache: Option<&'a dyn BuildCacheProvider>) -> Self {
        StandaloneInstallManager {
            base: ManagerBase::new(options, cache),
        }
    }
}

/// The registry dependencies `project` contributes to the consolidated
/// manifest.
fn external_dependencies(ws: &Workspace, project: &Project) -> BTreeSet<String> {
    DependencyKind::INSTALLED
        .iter()
        .flat_map(|kind| project.manifest().dependencies(*kind))
        .filter(|dep| dep.specifier().kind() != SpecifierKind::LocalWorkspaceReference)
        .filter(|dep| ws.project(&dep.name).is_none() || project.is_cyclic_dependency(&dep.name))
        .map(|dep| dep.name)
        .collect()
}

impl InstallManager for StandaloneInstallManager<'_> {
    fn prepare(&mut self, ws: &mut Workspace) -> Result<Prepared> {
        // a leftover workspace manifest would turn the temp folder into a
        // workspace root
        fs::remove_file_if_exists(&ws.workspace_manifest_path())?;
        self.base.finish_prepare(ws, &ReconcilePlan::default(), Vec::new())
    }

    fn can_skip(&self, ws: &Workspace) -> bool {
        self.base.can_skip(ws)
    }

    fn install(&self, ws: &Workspace, runner: &dyn ProcessRunner) -> Result<u32> {
        self.base.install(ws, runner, &|args| self.push_args(args))
    }

    fn post_install(&self, ws: &Workspace) -> Result<PostInstallReport> {
        post_install::post_install(ws, &self.base.post_install_options(), |graph, project| {
            graph.subset_for_dependencies(ROOT_IMPORTER, &external_dependencies(ws, project))
        })
    }

    fn push_args(&self, _args: &mut Vec<String>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RepoFixture, StubRunner};

    fn options() -> InstallOptions {
        InstallOptions {
            allow_lockfile_mutation: true,
            ..InstallOptions::default()
        }
    }

    fn with_fake_pm(fixture: RepoFixture) -> crate::test_support::TestRepo {
        let repo = fixture
            .extra("[package-manager]\nexecutable = \"tools/pnpm\"")
            .build();
        repo.write("tools/pnpm", "#!/bin/sh\nexit 0\n");
        repo
    }

    #[test]
    fn test_workspace_command_line() {
        let repo = with_fake_pm(RepoFixture::new().project("a", "packages/a", "1.0.0", &[]));
        let ws = repo.workspace();
        let runner = StubRunner::succeeding();

        let mut opts = options();
        opts.filter_args = vec!["--filter".to_string(), "a...".to_string()];
        opts.debug_package_manager = true;
        let manager = manager_for(&ws, opts, None);
        manager.install(&ws, &runner).unwrap();

        let command = &runner.commands()[0];
        assert_eq!(
            command.get_args(),
            &[
                "install",
                "--recursive",
                "--link-workspace-packages",
                "false",
                "--filter",
                "a...",
                "--reporter",
                "ndjson",
                "--loglevel",
                "debug"
            ]
        );
        assert_eq!(command.get_cwd(), Some(ws.temp_dir().as_path()));
        assert_eq!(
            command.get_env().get("npm_config_store_dir").cloned(),
            Some(ws.store_dir().to_string_lossy().into_owned())
        );
        assert!(ws.project("a").unwrap().output_dir().is_dir());
    }

    #[test]
    fn test_standalone_command_line() {
        let repo = with_fake_pm(RepoFixture::new().mode("standalone"));
        let ws = repo.workspace();
        let runner = StubRunner::succeeding();

        manager_for(&ws, options(), None).install(&ws, &runner).unwrap();
        assert_eq!(runner.commands()[0].get_args(), &["install"]);
        assert_eq!(runner.commands()[0].get_program(), repo.root().join("tools/pnpm"));
    }

    #[test]
    fn test_invocation_sees_hook_and_preferred_versions() {
        let repo = RepoFixture::new()
            .project("a", "packages/a", "1.0.0", &[("react", "^17.0.0")])
            .extra(
                "[package-manager]\nexecutable = \"tools/pnpm\"\nhook-file = \"tools/hooks.cjs\"",
            )
            .build();
        repo.write("tools/pnpm", "#!/bin/sh\nexit 0\n");
        repo.write("tools/hooks.cjs", "module.exports = { hooks: {} };\n");
        repo.write(
            "common/config/monorail/common-versions.json",
            "{ \"preferredVersions\": { \"react\": \"17.0.2\" } }\n",
        );
        let mut ws = repo.workspace();
        let runner = StubRunner::succeeding();

        let mut manager = manager_for(&ws, options(), None);
        manager.prepare(&mut ws).unwrap();
        manager.install(&ws, &runner).unwrap();

        let cwd = runner.commands()[0].get_cwd().unwrap().to_path_buf();
        assert_eq!(
            std::fs::read_to_string(cwd.join(".pnpmfile.cjs")).unwrap(),
            "module.exports = { hooks: {} };\n"
        );
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cwd.join("package.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["pnpm"]["overrides"]["react@^17.0.0"], "17.0.2");
    }

    #[test]
    fn test_stale_staged_hook_removed() {
        let repo = with_fake_pm(RepoFixture::new().project("a", "packages/a", "1.0.0", &[]));
        repo.write("common/temp/.pnpmfile.cjs", "// left over\n");
        let mut ws = repo.workspace();

        let mut manager = manager_for(&ws, options(), None);
        manager.prepare(&mut ws).unwrap();
        assert!(!ws.staged_hook_path().exists());
    }

    #[test]
    fn test_missing_package_manager() {
        let repo = RepoFixture::new()
            .extra("[package-manager]\nexecutable = \"tools/missing\"")
            .build();
        let err = locate_package_manager(&repo.workspace()).unwrap_err();
        assert!(matches!(err, InstallError::PackageManagerNotFound { .. }));
    }

    #[test]
    fn test_prepare_writes_synthesized_files() {
        let repo = RepoFixture::new()
            .project("a", "packages/a", "1.0.0", &[("b", "^1.0.0")])
            .project("b", "packages/b", "1.2.0", &[])
            .build();
        let mut ws = repo.workspace();

        let mut opts = options();
        opts.full_upgrade = true;
        let mut manager = manager_for(&ws, opts, None);
        let prepared = manager.prepare(&mut ws).unwrap();

        assert!(!prepared.freshness.is_fresh());
        assert_eq!(prepared.advisories.len(), 1);
        assert!(repo.read("common/temp/pnpm-workspace.yaml").contains("../../packages/a"));
        assert!(repo.read("common/temp/package.json").contains("monorail-common"));
        assert!(!ws.temp_lockfile_path().exists());
    }

    #[test]
    fn test_prepare_fails_when_stale_and_not_authorized() {
        let repo = RepoFixture::new()
            .project("a", "packages/a", "1.0.0", &[("lodash", "^4.0.0")])
            .build();
        let mut ws = repo.workspace();

        let mut manager = manager_for(&ws, InstallOptions::default(), None);
        let err = manager.prepare(&mut ws).unwrap_err();
        let err = err.downcast_ref::<InstallError>().unwrap();
        assert!(matches!(err, InstallError::LockfileOutOfDate { .. }));
    }

    #[test]
    fn test_standalone_removes_workspace_manifest() {
        let repo = RepoFixture::new()
            .mode("standalone")
            .project("a", "packages/a", "1.0.0", &[("lodash", "^4.0.0")])
            .build();
        repo.write("common/temp/pnpm-workspace.yaml", "packages: []\n");
        let mut ws = repo.workspace();

        let mut manager = manager_for(&ws, options(), None);
        manager.prepare(&mut ws).unwrap();

        assert!(!ws.workspace_manifest_path().exists());
        assert!(repo.read("common/temp/package.json").contains("\"lodash\": \"^4.0.0\""));
    }
}
