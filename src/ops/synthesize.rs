//! Generated inputs for the package manager.
//!
//! Two files are synthesized into the temp folder on every run:
//! - `pnpm-workspace.yaml`, listing every project folder
//! - `package.json`, the consolidated top-level manifest
//!
//! Both are only written when their content differs from what is on disk, so
//! that an unchanged workspace never bumps timestamps the freshness gate
//! compares against.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::common_versions::CommonVersions;
use crate::core::manifest::DependencyKind;
use crate::core::specifier::SpecifierKind;
use crate::core::version::NpmRange;
use crate::core::workspace::{InstallMode, Workspace};
use crate::util::fs;

/// Name recorded in the consolidated manifest.
pub const COMMON_PACKAGE_NAME: &str = "monorail-common";

/// The package manager's list of workspace folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    packages: Vec<String>,
}

impl WorkspaceManifest {
    /// An empty manifest.
    pub fn new() -> Self {
        WorkspaceManifest::default()
    }

    /// One entry per project, relative to the temp folder.
    pub fn from_workspace(ws: &Workspace) -> Result<Self> {
        let mut manifest = WorkspaceManifest::new();
        for project in ws.projects() {
            manifest.add_package(ws.importer_key(project))?;
        }
        Ok(manifest)
    }

    /// Append a folder. Each folder may appear once.
    pub fn add_package(&mut self, folder: impl Into<String>) -> Result<()> {
        let folder = folder.into();
        if self.packages.contains(&folder) {
            bail!("`{}` is already part of the workspace manifest", folder);
        }
        self.packages.push(folder);
        Ok(())
    }

    /// Folders in insertion order.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Render as YAML with folders sorted.
    pub fn to_yaml(&self) -> Result<String> {
        let mut sorted = self.clone();
        sorted.packages.sort();
        serde_yaml::to_string(&sorted).context("failed to serialize workspace manifest")
    }

    /// Write to `path` if the rendered content differs.
    pub fn save_if_changed(&self, path: &Path) -> Result<bool> {
        let changed = fs::write_if_changed(path, &self.to_yaml()?)?;
        if changed {
            tracing::debug!("Wrote {}", path.display());
        }
        Ok(changed)
    }
}

/// The top-level `package.json` handed to the package manager.
///
/// In workspace mode it carries no dependencies of its own; every project is
/// its own importer, and preferred versions reach the resolver as
/// `pnpm.overrides` selectors (`"react@^17.0.0": "17.0.2"`), one per declared
/// range the preferred version is compatible with. In standalone mode it
/// holds the union of every project's external dependencies, with preferred
/// versions taking precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonManifest {
    dependencies: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl CommonManifest {
    /// Build the manifest for the workspace's install mode.
    pub fn build(ws: &Workspace, preferred: &CommonVersions) -> Self {
        if ws.mode() == InstallMode::Workspace {
            return CommonManifest {
                dependencies: BTreeMap::new(),
                overrides: preferred_overrides(ws, preferred),
            };
        }

        let mut dependencies: BTreeMap<String, String> = BTreeMap::new();
        let mut conflicted = BTreeSet::new();

        for project in ws.projects() {
            for kind in DependencyKind::INSTALLED {
                for dep in project.manifest().dependencies(kind) {
                    if dep.specifier().kind() == SpecifierKind::LocalWorkspaceReference {
                        continue;
                    }
                    // siblings are linked, unless consumed from the registry
                    if ws.project(&dep.name).is_some() && !project.is_cyclic_dependency(&dep.name) {
                        continue;
                    }

                    match dependencies.get(&dep.name) {
                        Some(existing) if *existing != dep.version_text => {
                            conflicted.insert(dep.name.clone());
                        }
                        Some(_) => {}
                        None => {
                            dependencies.insert(dep.name.clone(), dep.version_text.clone());
                        }
                    }
                }
            }
        }

        for (name, range) in dependencies.iter_mut() {
            if let Some(preferred) = preferred.preferred(name) {
                *range = preferred.to_string();
            } else if conflicted.contains(name) {
                tracing::warn!(
                    "Projects disagree on the version of `{}`; using `{}`. Add it to common-versions.json to choose explicitly",
                    name,
                    range
                );
            }
        }

        CommonManifest {
            dependencies,
            overrides: BTreeMap::new(),
        }
    }

    /// Dependency name → range.
    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    /// `name@declared` selector → preferred range.
    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    /// Render as `package.json` text.
    pub fn to_json_string(&self) -> Result<String> {
        let dependencies: Map<String, Value> = self
            .dependencies
            .iter()
            .map(|(name, range)| (name.clone(), Value::String(range.clone())))
            .collect();

        let mut manifest = json!({
            "name": COMMON_PACKAGE_NAME,
            "version": "0.0.0",
            "private": true,
            "description": "Temporary file generated by monorail",
            "dependencies": dependencies,
        });
        if !self.overrides.is_empty() {
            manifest["pnpm"] = json!({ "overrides": self.overrides });
        }

        let mut out =
            serde_json::to_string_pretty(&manifest).context("failed to serialize common manifest")?;
        out.push('\n');
        Ok(out)
    }

    /// Write to `path` if the rendered content differs.
    pub fn save_if_changed(&self, path: &Path) -> Result<bool> {
        fs::write_if_changed(path, &self.to_json_string()?)
    }
}

/// Selectors steering every compatible declaration of a preferred package
/// to the preferred range. Declarations the preferred range cannot satisfy
/// are left alone.
fn preferred_overrides(ws: &Workspace, preferred: &CommonVersions) -> BTreeMap<String, String> {
    let mut overrides = BTreeMap::new();

    for project in ws.projects() {
        for kind in DependencyKind::INSTALLED {
            for dep in project.manifest().dependencies(kind) {
                let Some(wanted) = preferred.preferred(&dep.name) else {
                    continue;
                };
                if wanted == dep.version_text {
                    continue;
                }
                // exact pins and sibling links are never steered
                let specifier = dep.specifier();
                if specifier.kind() != SpecifierKind::Range
                    || (ws.project(&dep.name).is_some() && !project.is_cyclic_dependency(&dep.name))
                {
                    continue;
                }
                let Some(declared) = specifier.range() else {
                    continue;
                };

                match NpmRange::parse(wanted) {
                    Some(wanted_range) if wanted_range.intersects(declared) => {
                        overrides.insert(
                            format!("{}@{}", dep.name, dep.version_text),
                            wanted.to_string(),
                        );
                    }
                    _ => tracing::debug!(
                        "Preferred version `{}` of `{}` does not fit `{}` in `{}`",
                        wanted,
                        dep.name,
                        dep.version_text,
                        project.name()
                    ),
                }
            }
        }
    }

    overrides
}
