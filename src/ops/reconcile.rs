//! Workspace reference reconciliation.
//!
//! A project that depends on a sibling by registry version (`"b": "^1.0.0"`)
//! must consume the sibling from the workspace instead. Reconciliation runs
//! in two phases:
//!
//! 1. [`plan`] inspects the in-memory manifests and returns the edits needed,
//!    or the first configuration error. It never touches the filesystem.
//! 2. [`apply`] rewrites and saves only the projects that have edits.

use anyhow::Result;

use crate::core::manifest::DependencyKind;
use crate::core::specifier::SpecifierKind;
use crate::core::workspace::Workspace;
use crate::ops::install::errors::InstallError;

/// What the caller allows reconciliation to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Whether the lockfile (and therefore manifests) may change at all.
    pub allow_lockfile_mutation: bool,
    /// Whether references are actually rewritten.
    pub full_upgrade: bool,
}

/// A single specifier rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierEdit {
    pub kind: DependencyKind,
    pub name: String,
    pub from: String,
    pub to: String,
}

/// Edits for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEdits {
    pub project: String,
    pub edits: Vec<SpecifierEdit>,
}

/// The outcome of [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    projects: Vec<ProjectEdits>,
}

impl ReconcilePlan {
    /// No project needs rewriting.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Projects with at least one edit, in workspace order.
    pub fn projects(&self) -> &[ProjectEdits] {
        &self.projects
    }

    /// Total number of edits.
    pub fn edit_count(&self) -> usize {
        self.projects.iter().map(|p| p.edits.len()).sum()
    }
}

/// Decide which dependencies must become `workspace:` references.
///
/// Peer dependencies are never inspected. A sibling listed in the declaring
/// project's cyclic dependencies keeps its registry specifier.
pub fn plan(ws: &Workspace, options: ReconcileOptions) -> Result<ReconcilePlan, InstallError> {
    let mut projects = Vec::new();

    for project in ws.projects() {
        let mut edits = Vec::new();

        for kind in DependencyKind::INSTALLED {
            for entry in project.manifest().dependencies(kind) {
                let specifier = entry.specifier();

                match specifier.kind() {
                    SpecifierKind::LocalWorkspaceReference => {
                        let Some(sibling) = ws.project(specifier.target_name()) else {
                            return Err(InstallError::UnknownWorkspaceReference {
                                project: project.name().to_string(),
                                dependency: entry.name.clone(),
                                declared: entry.version_text.clone(),
                            });
                        };
                        if !specifier.allows(sibling.version()) {
                            return Err(InstallError::UnsatisfiableLocalVersion {
                                project: project.name().to_string(),
                                dependency: entry.name.clone(),
                                declared: entry.version_text.clone(),
                                local_version: sibling.version().to_string(),
                            });
                        }
                    }

                    SpecifierKind::ExactVersion | SpecifierKind::Range => {
                        let Some(sibling) = ws.project(&entry.name) else {
                            continue;
                        };
                        if project.is_cyclic_dependency(&entry.name) {
                            continue;
                        }

                        if !specifier.allows(sibling.version()) {
                            return Err(InstallError::UnsatisfiableLocalVersion {
                                project: project.name().to_string(),
                                dependency: entry.name.clone(),
                                declared: entry.version_text.clone(),
                                local_version: sibling.version().to_string(),
                            });
                        }

                        if !options.allow_lockfile_mutation {
                            return Err(InstallError::LockfileMutationNotAuthorized {
                                project: project.name().to_string(),
                                dependency: entry.name.clone(),
                                declared: entry.version_text.clone(),
                            });
                        }

                        if options.full_upgrade {
                            edits.push(SpecifierEdit {
                                kind,
                                name: entry.name.clone(),
                                from: entry.version_text.clone(),
                                to: specifier.to_workspace_reference(),
                            });
                        }
                    }

                    SpecifierKind::Tag | SpecifierKind::Other => {}
                }
            }
        }

        if !edits.is_empty() {
            projects.push(ProjectEdits {
                project: project.name().to_string(),
                edits,
            });
        }
    }

    Ok(ReconcilePlan { projects })
}

/// Rewrite and persist the planned edits.
///
/// Returns one advisory per manifest that changed on disk.
pub fn apply(ws: &mut Workspace, plan: &ReconcilePlan) -> Result<Vec<String>> {
    let mut advisories = Vec::new();
    let root = ws.root().to_path_buf();

    for project_edits in plan.projects() {
        let Some(project) = ws
            .projects_mut()
            .iter_mut()
            .find(|p| p.name() == project_edits.project)
        else {
            continue;
        };

        for edit in &project_edits.edits {
            tracing::info!(
                "Rewriting `{}` in `{}`: \"{}\" -> \"{}\"",
                edit.name,
                project_edits.project,
                edit.from,
                edit.to
            );
            project
                .manifest_mut()
                .set_dependency(edit.kind, &edit.name, &edit.to);
        }

        if project.manifest().save()? {
            let path = crate::util::fs::relative_path(&root, &project.manifest_path());
            advisories.push(format!(
                "{} was modified and must be committed",
                crate::util::fs::to_slash(&path)
            ));
        }
    }

    Ok(advisories)
}
