//! Deciding whether the current resolution can be reused.
//!
//! Two gates:
//! - the structural gate ([`check`]) compares the lockfile against the
//!   workspace and reports every reason it is stale;
//! - the cheap gate ([`is_install_current`]) only compares timestamps against
//!   the last-install flag, to skip the package manager altogether.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::common_versions::CommonVersions;
use crate::core::manifest::DependencyKind;
use crate::core::workspace::{InstallMode, Workspace};
use crate::lockfile::{Lockfile, RepoState};
use crate::ops::flags::LastInstallFlag;
use crate::ops::synthesize::CommonManifest;
use crate::util::fs;

/// Everything the structural gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessInput<'a> {
    pub workspace: &'a Workspace,
    /// The lockfile to validate, `None` if there is none.
    pub lockfile: Option<&'a Lockfile>,
    pub repo_state: &'a RepoState,
    pub common_versions: &'a CommonVersions,
    pub common_manifest: &'a CommonManifest,
    pub full_upgrade: bool,
}

/// The structural verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freshness {
    warnings: Vec<String>,
    /// Some reason can only be cleared by a full upgrade
    needs_full_upgrade: bool,
}

impl Freshness {
    /// Whether the lockfile can be installed as-is.
    pub fn is_fresh(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Every reason the lockfile is stale.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Record an extra reason, e.g. pending manifest rewrites.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Record a reason that a plain update cannot clear.
    pub fn add_full_upgrade_warning(&mut self, warning: impl Into<String>) {
        self.needs_full_upgrade = true;
        self.add_warning(warning);
    }

    /// Whether only `update --full` makes the lockfile fresh again.
    pub fn needs_full_upgrade(&self) -> bool {
        self.needs_full_upgrade
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

/// Run the structural gate.
///
/// Pure: the same input always produces the same verdict. All warnings are
/// collected so that one update fixes everything.
pub fn check(input: &FreshnessInput<'_>) -> Freshness {
    let ws = input.workspace;
    let mut verdict = Freshness::default();

    let Some(lockfile) = input.lockfile else {
        verdict.add_warning("The lockfile does not exist");
        return verdict;
    };

    match ws.mode() {
        InstallMode::Workspace => {
            if !lockfile.is_workspace_compatible() && !input.full_upgrade {
                verdict.add_full_upgrade_warning(
                    "The lockfile was not produced by a workspace install and must be regenerated",
                );
            }

            for (_, folder) in lockfile.referenced_folders(&ws.temp_dir()) {
                if ws.project_by_folder(&folder).is_none() {
                    let relative = fs::to_slash(&fs::relative_path(ws.root(), &folder));
                    verdict.add_warning(format!(
                        "Lockfile references \"{}\" which was not found in {}",
                        relative,
                        crate::core::workspace::REPO_CONFIG_NAME
                    ));
                }
            }

            if !input.repo_state.is_valid() {
                verdict.add_warning(format!(
                    "{} is invalid; it may contain merge conflict markers",
                    input.repo_state.path().display()
                ));
            } else if !preferred_versions_match(input.repo_state, input.common_versions) {
                verdict.add_warning(
                    "Preferred versions in common-versions.json changed since the lockfile was updated",
                );
            }

            for project in ws.projects() {
                let key = ws.importer_key(project);
                let Some(importer) = lockfile.importer(&key) else {
                    verdict.add_warning(format!(
                        "Lockfile has no entry for project \"{}\"",
                        project.name()
                    ));
                    continue;
                };

                let declared = declared_specifiers(project);
                if importer.specifiers() != declared {
                    verdict.add_warning(format!(
                        "Dependencies of \"{}\" do not match the lockfile",
                        project.name()
                    ));
                }
            }
        }

        InstallMode::Standalone => {
            if lockfile.root_specifiers() != *input.common_manifest.dependencies() {
                verdict.add_warning("Dependencies of the common manifest do not match the lockfile");
            }
        }
    }

    verdict
}

/// A missing fingerprint matches only an empty preferred-versions set.
fn preferred_versions_match(repo_state: &RepoState, common_versions: &CommonVersions) -> bool {
    match repo_state.preferred_versions_hash() {
        Some(hash) => hash == common_versions.fingerprint(),
        None => common_versions.preferred_versions.is_empty(),
    }
}

fn declared_specifiers(project: &crate::core::project::Project) -> BTreeMap<String, String> {
    DependencyKind::INSTALLED
        .iter()
        .flat_map(|kind| project.manifest().dependencies(*kind))
        .map(|entry| (entry.name, entry.version_text))
        .collect()
}

/// Files and folders whose modification invalidates the last install.
pub fn cheap_gate_inputs(ws: &Workspace, variant: Option<&str>) -> Vec<PathBuf> {
    let mut inputs = vec![ws.committed_lockfile_path(variant)];

    let common_versions = ws.common_versions_path(variant);
    if common_versions.exists() {
        inputs.push(common_versions);
    }

    for project in ws.projects() {
        inputs.push(project.manifest_path());
        inputs.push(project.output_dir());
    }
    inputs.push(ws.temp_output_dir());

    if let Some(hook) = ws.hook_file_path() {
        inputs.push(hook);
    }

    let workspace_manifest = ws.workspace_manifest_path();
    if workspace_manifest.exists() {
        inputs.push(workspace_manifest);
    }

    inputs
}

/// The cheap gate: the install flag is valid for the current environment and
/// newer than every input.
pub fn is_install_current(ws: &Workspace, variant: Option<&str>) -> bool {
    let flag = LastInstallFlag::for_workspace(ws, variant);
    if !flag.is_valid() {
        tracing::debug!("Install flag is missing or was written for another environment");
        return false;
    }
    fs::is_file_timestamp_current(flag.path(), &cheap_gate_inputs(ws, variant))
}
