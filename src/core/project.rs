//! Workspace member projects.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::core::manifest::{PackageJson, PACKAGE_JSON};

/// Name of the per-project dependency-output directory.
pub const NODE_MODULES: &str = "node_modules";

/// One workspace member.
#[derive(Debug, Clone)]
pub struct Project {
    /// Stable package name
    name: String,

    /// Absolute project folder
    folder: PathBuf,

    /// Folder relative to the repository root
    relative_folder: PathBuf,

    /// The project's `package.json`
    manifest: PackageJson,

    /// Sibling names this project depends on through the registry instead of
    /// the workspace (allowed dependency cycles)
    cyclic_dependencies: BTreeSet<String>,
}

impl Project {
    /// Create a project from its loaded manifest.
    pub fn new(
        manifest: PackageJson,
        folder: PathBuf,
        relative_folder: PathBuf,
        cyclic_dependencies: impl IntoIterator<Item = String>,
    ) -> Self {
        Project {
            name: manifest.name().to_string(),
            folder,
            relative_folder,
            manifest,
            cyclic_dependencies: cyclic_dependencies.into_iter().collect(),
        }
    }

    /// The package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package version.
    pub fn version(&self) -> &Version {
        self.manifest.version()
    }

    /// Absolute project folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Project folder relative to the repository root.
    pub fn relative_folder(&self) -> &Path {
        &self.relative_folder
    }

    /// The project manifest.
    pub fn manifest(&self) -> &PackageJson {
        &self.manifest
    }

    /// Mutable access to the project manifest.
    pub fn manifest_mut(&mut self) -> &mut PackageJson {
        &mut self.manifest
    }

    /// Path of the project's `package.json`.
    pub fn manifest_path(&self) -> PathBuf {
        self.folder.join(PACKAGE_JSON)
    }

    /// Whether `name` is allow-listed as a cyclic dependency.
    pub fn is_cyclic_dependency(&self, name: &str) -> bool {
        self.cyclic_dependencies.contains(name)
    }

    /// The project's dependency-output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.folder.join(NODE_MODULES)
    }

    /// Where the project's lock subset is persisted.
    pub fn lock_subset_path(&self) -> PathBuf {
        self.folder
            .join(".monorail")
            .join("temp")
            .join("shrinkwrap-deps.json")
    }
}
