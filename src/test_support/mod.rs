//! Test utilities for monorail unit tests.
//!
//! Builds throwaway repositories on disk and provides a stub process runner
//! standing in for the package manager.
//!
//! # Example
//!
//! ```rust,ignore
//! use monorail::test_support::RepoFixture;
//!
//! #[test]
//! fn test_example() {
//!     let repo = RepoFixture::new()
//!         .project("b", "packages/b", "1.2.0", &[])
//!         .project("a", "packages/a", "1.0.0", &[("b", "^1.0.0")])
//!         .build();
//!
//!     let ws = repo.workspace();
//!     assert_eq!(ws.projects().len(), 2);
//! }
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use crate::core::common_versions::CommonVersions;
use crate::core::manifest::DependencyKind;
use crate::core::specifier::SpecifierKind;
use crate::core::workspace::{InstallMode, Workspace, REPO_CONFIG_NAME};
use crate::ops::install::executor::ProcessRunner;
use crate::ops::synthesize::CommonManifest;
use crate::util::process::ProcessBuilder;

/// Write a `package.json` with normal dependencies.
pub fn write_package(folder: &Path, name: &str, version: &str, deps: &[(&str, &str)]) {
    write_package_with(folder, name, version, &[(DependencyKind::Normal, deps)]);
}

/// Write a `package.json` with dependencies in several tables.
pub fn write_package_with(
    folder: &Path,
    name: &str,
    version: &str,
    tables: &[(DependencyKind, &[(&str, &str)])],
) {
    let mut manifest = Map::new();
    manifest.insert("name".to_string(), json!(name));
    manifest.insert("version".to_string(), json!(version));
    for (kind, deps) in tables {
        if deps.is_empty() {
            continue;
        }
        let table: Map<String, Value> = deps
            .iter()
            .map(|(dep, text)| (dep.to_string(), json!(text)))
            .collect();
        manifest.insert(kind.field().to_string(), Value::Object(table));
    }

    std::fs::create_dir_all(folder).unwrap();
    let mut contents = serde_json::to_string_pretty(&Value::Object(manifest)).unwrap();
    contents.push('\n');
    std::fs::write(folder.join("package.json"), contents).unwrap();
}

#[derive(Debug, Clone)]
struct FixtureProject {
    name: String,
    folder: String,
    version: String,
    deps: Vec<(String, String)>,
    cyclic: Vec<String>,
}

/// Builder for a repository on disk.
#[derive(Debug, Clone, Default)]
pub struct RepoFixture {
    projects: Vec<FixtureProject>,
    members: Vec<String>,
    mode: Option<String>,
    variants: Vec<String>,
    extra: String,
}

impl RepoFixture {
    /// Start an empty repository.
    pub fn new() -> Self {
        RepoFixture::default()
    }

    /// Add an explicitly listed project with normal dependencies.
    pub fn project(mut self, name: &str, folder: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        self.projects.push(FixtureProject {
            name: name.to_string(),
            folder: folder.to_string(),
            version: version.to_string(),
            deps: deps
                .iter()
                .map(|(d, t)| (d.to_string(), t.to_string()))
                .collect(),
            cyclic: Vec::new(),
        });
        self
    }

    /// Allow `project` to consume `dependency` from the registry.
    pub fn cyclic(mut self, project: &str, dependency: &str) -> Self {
        if let Some(p) = self.projects.iter_mut().find(|p| p.name == project) {
            p.cyclic.push(dependency.to_string());
        }
        self
    }

    /// Add a glob member pattern.
    pub fn members(mut self, pattern: &str) -> Self {
        self.members.push(pattern.to_string());
        self
    }

    /// Set the install mode (`workspace` or `standalone`).
    pub fn mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    /// Declare a variant.
    pub fn variant(mut self, variant: &str) -> Self {
        self.variants.push(variant.to_string());
        self
    }

    /// Append raw TOML tables to `monorail.toml`.
    pub fn extra(mut self, toml: &str) -> Self {
        self.extra.push_str(toml);
        self.extra.push('\n');
        self
    }

    /// Write everything to a fresh temporary directory.
    pub fn build(self) -> TestRepo {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let mut config = String::new();
        if !self.variants.is_empty() {
            let quoted: Vec<String> = self.variants.iter().map(|v| format!("{:?}", v)).collect();
            writeln!(config, "variants = [{}]", quoted.join(", ")).unwrap();
        }
        if let Some(mode) = &self.mode {
            writeln!(config, "\n[install]\nmode = {:?}", mode).unwrap();
        }
        if !self.members.is_empty() {
            let quoted: Vec<String> = self.members.iter().map(|m| format!("{:?}", m)).collect();
            writeln!(config, "\n[workspace]\nmembers = [{}]", quoted.join(", ")).unwrap();
        }
        for project in &self.projects {
            writeln!(
                config,
                "\n[[projects]]\nname = {:?}\nfolder = {:?}",
                project.name, project.folder
            )
            .unwrap();
            if !project.cyclic.is_empty() {
                let quoted: Vec<String> =
                    project.cyclic.iter().map(|c| format!("{:?}", c)).collect();
                writeln!(config, "cyclic-dependencies = [{}]", quoted.join(", ")).unwrap();
            }

            let deps: Vec<(&str, &str)> = project
                .deps
                .iter()
                .map(|(d, t)| (d.as_str(), t.as_str()))
                .collect();
            write_package(&root.join(&project.folder), &project.name, &project.version, &deps);
        }
        if !self.extra.is_empty() {
            config.push('\n');
            config.push_str(&self.extra);
        }

        std::fs::write(root.join(REPO_CONFIG_NAME), config).unwrap();
        TestRepo { dir }
    }
}

/// A repository created by [`RepoFixture`].
#[derive(Debug)]
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Repository root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `monorail.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.root().join(REPO_CONFIG_NAME)
    }

    /// Load the workspace, ignoring any temp-folder override in the
    /// environment.
    pub fn workspace(&self) -> Workspace {
        Workspace::load_with_temp_override(&self.config_path(), None).unwrap()
    }

    /// Write a file relative to the root, creating parent folders.
    pub fn write(&self, path: &str, contents: &str) -> PathBuf {
        let full = self.root().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, contents).unwrap();
        full
    }

    /// Read a file relative to the root.
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.root().join(path)).unwrap()
    }
}

/// A v6 lockfile that records exactly what the workspace declares.
///
/// Every external dependency resolves to `1.0.0` with integrity
/// `sha512-<name>`; sibling references resolve to `link:` entries.
pub fn matching_lockfile(ws: &Workspace) -> String {
    let mut out = String::from("lockfileVersion: '6.0'\n\nimporters:\n");
    let mut externals = std::collections::BTreeSet::new();

    match ws.mode() {
        InstallMode::Workspace => {
            out.push_str("\n  .: {}\n");
            for project in ws.projects() {
                write!(out, "\n  {}:\n", ws.importer_key(project)).unwrap();
                for kind in DependencyKind::INSTALLED {
                    let deps = project.manifest().dependencies(kind);
                    if deps.is_empty() {
                        continue;
                    }
                    let field = match kind {
                        DependencyKind::Normal => "dependencies",
                        DependencyKind::Dev => "devDependencies",
                        _ => "optionalDependencies",
                    };
                    writeln!(out, "    {}:", field).unwrap();
                    for dep in deps {
                        let specifier = dep.specifier();
                        let sibling = ws.project(specifier.target_name());
                        let version = match (specifier.kind(), sibling) {
                            (SpecifierKind::LocalWorkspaceReference, Some(sibling)) => {
                                let rel = crate::util::fs::relative_path(
                                    project.folder(),
                                    sibling.folder(),
                                );
                                format!("link:{}", crate::util::fs::to_slash(&rel))
                            }
                            _ => {
                                externals.insert(dep.name.clone());
                                "1.0.0".to_string()
                            }
                        };
                        writeln!(
                            out,
                            "      {}:\n        specifier: '{}'\n        version: {}",
                            dep.name, dep.version_text, version
                        )
                        .unwrap();
                    }
                }
            }
        }
        InstallMode::Standalone => {
            let manifest = CommonManifest::build(ws, &CommonVersions::default());
            out.push_str("\n  .:\n");
            if !manifest.dependencies().is_empty() {
                out.push_str("    dependencies:\n");
            }
            for (name, text) in manifest.dependencies() {
                externals.insert(name.clone());
                writeln!(
                    out,
                    "      {}:\n        specifier: '{}'\n        version: 1.0.0",
                    name, text
                )
                .unwrap();
            }
        }
    }

    if !externals.is_empty() {
        out.push_str("\npackages:\n");
        for name in externals {
            writeln!(
                out,
                "\n  /{}@1.0.0:\n    resolution: {{integrity: sha512-{}}}",
                name, name
            )
            .unwrap();
        }
    }
    out
}

/// Stand-in for the package manager.
///
/// Fails a fixed number of times, then succeeds. On success it writes
/// `lockfile` (if set) into the command's working directory, the way the
/// package manager writes its lockfile into the temp folder.
#[derive(Debug, Default)]
pub struct StubRunner {
    failures: u32,
    lockfile: Option<String>,
    calls: AtomicU32,
    commands: Mutex<Vec<ProcessBuilder>>,
}

impl StubRunner {
    /// A runner that always succeeds.
    pub fn succeeding() -> Self {
        StubRunner::default()
    }

    /// A runner that fails `failures` times before succeeding.
    pub fn failing(failures: u32) -> Self {
        StubRunner {
            failures,
            ..StubRunner::default()
        }
    }

    /// Write `contents` as the run lockfile on success.
    pub fn with_lockfile(mut self, contents: impl Into<String>) -> Self {
        self.lockfile = Some(contents.into());
        self
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every command the runner received.
    pub fn commands(&self) -> Vec<ProcessBuilder> {
        self.commands.lock().unwrap().clone()
    }
}

impl ProcessRunner for StubRunner {
    fn run(&self, command: &ProcessBuilder) -> Result<i32> {
        self.commands.lock().unwrap().push(command.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Ok(1);
        }

        if let (Some(contents), Some(cwd)) = (&self.lockfile, command.get_cwd()) {
            std::fs::create_dir_all(cwd)?;
            std::fs::write(cwd.join(crate::core::workspace::LOCKFILE_NAME), contents)?;
        }
        Ok(0)
    }
}
