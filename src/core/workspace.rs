//! Workspace - central configuration hub.
//!
//! A Workspace is the repository root, its `monorail.toml` configuration, and
//! the graph of member projects, providing centralized access to every path
//! the install pipeline reads or writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};

use crate::core::manifest::{PackageJson, PACKAGE_JSON};
use crate::core::project::{Project, NODE_MODULES};
use crate::util::fs;

/// Repository configuration file name.
pub const REPO_CONFIG_NAME: &str = "monorail.toml";

/// Environment variable relocating the shared temp folder.
pub const TEMP_FOLDER_ENV: &str = "MONORAIL_TEMP_FOLDER";

/// Lockfile name used by the package manager.
pub const LOCKFILE_NAME: &str = "pnpm-lock.yaml";

/// Workspace manifest name used by the package manager.
pub const WORKSPACE_MANIFEST_NAME: &str = "pnpm-workspace.yaml";

/// How dependencies are laid out for the package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// One package-manager workspace containing every project.
    #[default]
    Workspace,
    /// A single consolidated manifest holding every external dependency.
    Standalone,
}

/// Where the package manager keeps downloaded package contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// A store inside the shared temp folder, owned by this repository.
    #[default]
    Local,
    /// The package manager's machine-wide store.
    Global,
}

/// What to do between failed install attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// Recycle the shared dependency-output directory, keep the store.
    #[default]
    RecycleOutput,
    /// Retry without touching anything.
    None,
}

/// `[package-manager]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageManagerConfig {
    /// Executable name looked up on PATH
    #[serde(default = "default_package_manager")]
    pub name: String,

    /// Version recorded in the install flag
    #[serde(default)]
    pub version: Option<String>,

    /// Explicit path to the executable
    #[serde(default)]
    pub executable: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreMode,

    #[serde(default)]
    pub recovery: RecoveryStrategy,

    /// Hook file, relative to the repository root
    #[serde(default)]
    pub hook_file: Option<PathBuf>,
}

fn default_package_manager() -> String {
    "pnpm".to_string()
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        PackageManagerConfig {
            name: default_package_manager(),
            version: None,
            executable: None,
            store: StoreMode::default(),
            recovery: RecoveryStrategy::default(),
            hook_file: None,
        }
    }
}

/// `[install]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallSection {
    pub mode: InstallMode,
    pub max_attempts: Option<u32>,
}

/// `[workspace]` section: glob discovery of projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MembersConfig {
    /// Glob patterns for project folders, relative to the repository root.
    pub members: Vec<String>,
}

/// `[[projects]]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub name: String,
    pub folder: PathBuf,
    #[serde(default)]
    pub cyclic_dependencies: Vec<String>,
}

/// `[build-cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildCacheConfig {
    /// Cache folder, relative to the repository root
    pub folder: Option<PathBuf>,

    /// Credential-cache key that grants write access
    pub credential_id: Option<String>,
}

/// The parsed `monorail.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RepoConfig {
    /// Named alternate lockfile/preferred-versions sets
    pub variants: Vec<String>,

    pub package_manager: PackageManagerConfig,

    pub install: InstallSection,

    pub workspace: MembersConfig,

    pub projects: Vec<ProjectConfig>,

    pub build_cache: BuildCacheConfig,
}

impl RepoConfig {
    /// Load the repository configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// The repository and its member projects.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    config: RepoConfig,
    projects: Vec<Project>,
    temp_override: Option<PathBuf>,
}

impl Workspace {
    /// Load a workspace from its `monorail.toml`, honouring the temp-folder
    /// environment override.
    pub fn load(config_path: &Path) -> Result<Self> {
        let temp_override = std::env::var_os(TEMP_FOLDER_ENV).map(PathBuf::from);
        Self::load_with_temp_override(config_path, temp_override)
    }

    /// Load a workspace with an explicit temp-folder override.
    pub fn load_with_temp_override(
        config_path: &Path,
        temp_override: Option<PathBuf>,
    ) -> Result<Self> {
        let config = RepoConfig::load(config_path)?;
        let root = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let projects = load_projects(&root, &config)?;
        tracing::debug!("Loaded {} projects from {}", projects.len(), config_path.display());

        Ok(Workspace {
            root,
            config,
            projects,
            temp_override,
        })
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository configuration.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// The install mode.
    pub fn mode(&self) -> InstallMode {
        self.config.install.mode
    }

    /// Member projects, sorted by name.
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Mutable access to member projects.
    pub fn projects_mut(&mut self) -> &mut [Project] {
        &mut self.projects
    }

    /// Find a project by package name.
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name() == name)
    }

    /// Find a project whose folder is `folder` (absolute).
    pub fn project_by_folder(&self, folder: &Path) -> Option<&Project> {
        let folder = fs::normalize_lexically(folder);
        self.projects.iter().find(|p| p.folder() == folder)
    }

    /// The temp-folder override from the environment, if any.
    pub fn temp_override(&self) -> Option<&Path> {
        self.temp_override.as_deref()
    }

    /// Check that `variant` is declared in `monorail.toml`.
    pub fn validate_variant(&self, variant: Option<&str>) -> bool {
        variant.is_none_or(|v| self.config.variants.iter().any(|known| known == v))
    }

    /// `common/config/monorail`
    pub fn common_config_dir(&self) -> PathBuf {
        self.root.join("common").join("config").join("monorail")
    }

    /// Folder holding variant-specific files.
    pub fn variant_config_dir(&self, variant: Option<&str>) -> PathBuf {
        match variant {
            Some(v) => self.common_config_dir().join("variants").join(v),
            None => self.common_config_dir(),
        }
    }

    /// The checked-in lockfile.
    pub fn committed_lockfile_path(&self, variant: Option<&str>) -> PathBuf {
        self.variant_config_dir(variant).join(LOCKFILE_NAME)
    }

    /// The preferred-versions file.
    pub fn common_versions_path(&self, variant: Option<&str>) -> PathBuf {
        self.variant_config_dir(variant).join("common-versions.json")
    }

    /// The repo-state record.
    pub fn repo_state_path(&self, variant: Option<&str>) -> PathBuf {
        self.variant_config_dir(variant).join("repo-state.json")
    }

    /// The package-manager hook file, if configured or present.
    pub fn hook_file_path(&self) -> Option<PathBuf> {
        match &self.config.package_manager.hook_file {
            Some(path) => Some(self.root.join(path)),
            None => {
                let default = self.common_config_dir().join("pnpmfile.cjs");
                default.exists().then_some(default)
            }
        }
    }

    /// The shared temp folder.
    ///
    /// The environment override only applies in standalone mode; in workspace
    /// mode it is rejected before any install work starts.
    pub fn temp_dir(&self) -> PathBuf {
        match (&self.temp_override, self.mode()) {
            (Some(dir), InstallMode::Standalone) => dir.clone(),
            _ => self.root.join("common").join("temp"),
        }
    }

    /// The workspace manifest consumed by the package manager.
    pub fn workspace_manifest_path(&self) -> PathBuf {
        self.temp_dir().join(WORKSPACE_MANIFEST_NAME)
    }

    /// The consolidated top-level manifest.
    pub fn common_manifest_path(&self) -> PathBuf {
        self.temp_dir().join(PACKAGE_JSON)
    }

    /// Where the hook file is staged; the package manager loads it from the
    /// workspace root.
    pub fn staged_hook_path(&self) -> PathBuf {
        self.temp_dir().join(".pnpmfile.cjs")
    }

    /// The lockfile produced by the current run.
    pub fn temp_lockfile_path(&self) -> PathBuf {
        self.temp_dir().join(LOCKFILE_NAME)
    }

    /// The shared dependency-output directory.
    pub fn temp_output_dir(&self) -> PathBuf {
        self.temp_dir().join(NODE_MODULES)
    }

    /// The local package-content store.
    pub fn store_dir(&self) -> PathBuf {
        self.temp_dir().join("pnpm-store")
    }

    /// The package manager's download cache.
    pub fn npm_cache_dir(&self) -> PathBuf {
        self.temp_dir().join("npm-cache")
    }

    /// Where recycled directories wait for deletion.
    pub fn recycler_dir(&self) -> PathBuf {
        self.temp_dir().join("recycler")
    }

    /// How the package manager names `project` in the workspace manifest and
    /// the lockfile: its folder relative to the temp folder, forward slashes.
    pub fn importer_key(&self, project: &Project) -> String {
        fs::to_slash(&fs::relative_path(&self.temp_dir(), project.folder()))
    }

    /// The last-install flag.
    pub fn install_flag_path(&self) -> PathBuf {
        self.temp_dir().join("last-install.flag")
    }

    /// The "linked" flag.
    pub fn link_flag_path(&self) -> PathBuf {
        self.temp_dir().join("last-link.flag")
    }
}

fn load_projects(root: &Path, config: &RepoConfig) -> Result<Vec<Project>> {
    let mut by_folder: BTreeMap<PathBuf, Project> = BTreeMap::new();

    for entry in &config.projects {
        let folder = fs::normalize_lexically(&root.join(&entry.folder));
        let manifest = PackageJson::load(&folder.join(PACKAGE_JSON))?;

        if manifest.name() != entry.name {
            bail!(
                "project `{}` in {} has package name `{}` in {}",
                entry.name,
                REPO_CONFIG_NAME,
                manifest.name(),
                folder.join(PACKAGE_JSON).display()
            );
        }

        if by_folder.contains_key(&folder) {
            bail!(
                "folder `{}` is listed more than once in {}",
                entry.folder.display(),
                REPO_CONFIG_NAME
            );
        }

        let relative = fs::relative_path(root, &folder);
        let project = Project::new(
            manifest,
            folder.clone(),
            relative,
            entry.cyclic_dependencies.iter().cloned(),
        );
        by_folder.insert(folder, project);
    }

    for pattern in &config.workspace.members {
        let full_pattern = root.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for entry in glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                    continue;
                }
            };

            let folder = fs::normalize_lexically(&path);
            if !folder.join(PACKAGE_JSON).is_file() || by_folder.contains_key(&folder) {
                continue;
            }

            let manifest = PackageJson::load(&folder.join(PACKAGE_JSON))?;
            let relative = fs::relative_path(root, &folder);
            by_folder.insert(
                folder.clone(),
                Project::new(manifest, folder, relative, Vec::new()),
            );
        }
    }

    let mut names = BTreeSet::new();
    for project in by_folder.values() {
        if !names.insert(project.name().to_string()) {
            bail!(
                "package name `{}` is used by more than one project",
                project.name()
            );
        }
    }

    let mut projects: Vec<Project> = by_folder.into_values().collect();
    projects.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(projects)
}
