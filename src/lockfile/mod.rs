//! `pnpm-lock.yaml` reading.
//!
//! The lockfile is produced by the package manager; monorail only reads it.
//! Three layouts are understood:
//! - v5: importer `specifiers` map, `/name/version` package keys
//! - v6: `{ specifier, version }` importer entries, `/name@version` keys
//! - v9: like v6, with dependency edges under `snapshots` and bare
//!   `name@version` keys

pub mod repo_state;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};

use crate::core::manifest::DependencyKind;
use crate::util::fs;

pub use repo_state::RepoState;

/// Importer key of the temp folder's own `package.json`.
pub const ROOT_IMPORTER: &str = ".";

/// One importer dependency. v5 stores only the resolved version.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImporterDependency {
    Resolved(String),
    Detailed { specifier: String, version: String },
}

impl ImporterDependency {
    /// The resolved version (or `link:` target).
    pub fn version(&self) -> &str {
        match self {
            ImporterDependency::Resolved(version) => version,
            ImporterDependency::Detailed { version, .. } => version,
        }
    }

    fn specifier(&self) -> Option<&str> {
        match self {
            ImporterDependency::Resolved(_) => None,
            ImporterDependency::Detailed { specifier, .. } => Some(specifier),
        }
    }
}

/// What the lockfile recorded for one project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Importer {
    /// v5 only
    pub specifiers: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, ImporterDependency>,
    pub dev_dependencies: BTreeMap<String, ImporterDependency>,
    pub optional_dependencies: BTreeMap<String, ImporterDependency>,
}

impl Importer {
    fn table(&self, kind: DependencyKind) -> Option<&BTreeMap<String, ImporterDependency>> {
        match kind {
            DependencyKind::Normal => Some(&self.dependencies),
            DependencyKind::Dev => Some(&self.dev_dependencies),
            DependencyKind::Optional => Some(&self.optional_dependencies),
            DependencyKind::Peer => None,
        }
    }

    /// The specifier recorded for every installed dependency.
    pub fn specifiers(&self) -> BTreeMap<String, String> {
        let mut out = self.specifiers.clone();
        for kind in [DependencyKind::Normal, DependencyKind::Dev, DependencyKind::Optional] {
            if let Some(table) = self.table(kind) {
                for (name, dep) in table {
                    if let Some(specifier) = dep.specifier() {
                        out.insert(name.clone(), specifier.to_string());
                    }
                }
            }
        }
        out
    }

    /// Every installed dependency with its resolved version.
    pub fn resolved(&self) -> impl Iterator<Item = (&String, &ImporterDependency)> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .chain(self.optional_dependencies.iter())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resolution {
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub tarball: Option<String>,
}

/// A `packages` or `snapshots` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageSnapshot {
    pub resolution: Option<Resolution>,
    pub dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
}

/// A parsed lockfile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Lockfile {
    pub lockfile_version: Option<serde_yaml::Value>,

    /// Top-level specifiers of a non-workspace v5 lockfile
    pub specifiers: BTreeMap<String, String>,

    /// Top-level dependencies of a non-workspace lockfile
    pub dependencies: BTreeMap<String, ImporterDependency>,

    pub importers: BTreeMap<String, Importer>,

    pub packages: BTreeMap<String, PackageSnapshot>,

    pub snapshots: BTreeMap<String, PackageSnapshot>,
}

/// The per-project slice of a lockfile, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSubset {
    /// Package key → integrity (empty when the lockfile records none)
    pub packages: BTreeMap<String, String>,
}

impl Lockfile {
    /// Load a lockfile, returning `None` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse lockfile {}", path.display()))
            .map(Some)
    }

    /// Parse lockfile text.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Lockfile::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Whether the lockfile was produced by a workspace install.
    pub fn is_workspace_compatible(&self) -> bool {
        !self.importers.is_empty()
    }

    /// Importer keys other than the temp folder's own manifest.
    pub fn project_importer_keys(&self) -> impl Iterator<Item = &str> {
        self.importers
            .keys()
            .map(String::as_str)
            .filter(|key| *key != ROOT_IMPORTER)
    }

    /// Folders referenced by the lockfile, resolved against `temp_dir`.
    pub fn referenced_folders(&self, temp_dir: &Path) -> Vec<(String, PathBuf)> {
        self.project_importer_keys()
            .map(|key| (key.to_string(), fs::normalize_lexically(&temp_dir.join(key))))
            .collect()
    }

    /// Look up an importer by key.
    pub fn importer(&self, key: &str) -> Option<&Importer> {
        self.importers.get(key)
    }

    /// The root specifiers, for standalone installs.
    pub fn root_specifiers(&self) -> BTreeMap<String, String> {
        if let Some(importer) = self.importers.get(ROOT_IMPORTER) {
            return importer.specifiers();
        }
        let mut out = self.specifiers.clone();
        for (name, dep) in &self.dependencies {
            if let Some(specifier) = dep.specifier() {
                out.insert(name.clone(), specifier.to_string());
            }
        }
        out
    }

    /// Find the package key for `name` resolved at `version`.
    ///
    /// Workspace links (`link:`) have no package entry.
    pub fn package_key(&self, name: &str, version: &str) -> Option<String> {
        if version.starts_with("link:") {
            return None;
        }

        let candidates = if version.starts_with('/') {
            vec![version.to_string()]
        } else {
            vec![
                format!("/{}@{}", name, version),
                format!("{}@{}", name, version),
                format!("/{}/{}", name, version),
            ]
        };

        candidates
            .into_iter()
            .find(|key| self.snapshots.contains_key(key) || self.packages.contains_key(key))
    }

    fn snapshot(&self, key: &str) -> Option<&PackageSnapshot> {
        self.snapshots.get(key).or_else(|| self.packages.get(key))
    }

    fn integrity(&self, key: &str) -> String {
        // v9 keeps resolutions under `packages` keyed without the peer suffix
        let base = key.split('(').next().unwrap_or(key);
        self.packages
            .get(key)
            .or_else(|| self.packages.get(base))
            .and_then(|p| p.resolution.as_ref())
            .and_then(|r| r.integrity.clone().or_else(|| r.tarball.clone()))
            .unwrap_or_default()
    }

    /// Build the package dependency graph used for subset derivation.
    pub fn graph(&self) -> LockGraph<'_> {
        LockGraph::new(self)
    }
}

/// Package-level dependency graph of a lockfile.
pub struct LockGraph<'a> {
    lockfile: &'a Lockfile,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl<'a> LockGraph<'a> {
    fn new(lockfile: &'a Lockfile) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        let keys = lockfile.snapshots.keys().chain(lockfile.packages.keys());
        for key in keys {
            nodes
                .entry(key.clone())
                .or_insert_with(|| graph.add_node(key.clone()));
        }

        let mut edges = Vec::new();
        for (key, &from) in &nodes {
            let Some(snapshot) = lockfile.snapshot(key) else {
                continue;
            };
            let deps = snapshot
                .dependencies
                .iter()
                .chain(snapshot.optional_dependencies.iter());
            for (name, version) in deps {
                if let Some(to) = lockfile
                    .package_key(name, version)
                    .and_then(|k| nodes.get(&k).copied())
                {
                    edges.push((from, to));
                }
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        LockGraph {
            lockfile,
            graph,
            nodes,
        }
    }

    /// Every package reachable from an importer, with its integrity.
    ///
    /// Returns `None` if the lockfile has no such importer.
    pub fn subset_for_importer(&self, key: &str) -> Option<LockSubset> {
        self.subset(key, None)
    }

    /// Like [`subset_for_importer`](Self::subset_for_importer), starting only
    /// from the importer's dependencies named in `names`.
    ///
    /// Standalone installs record every project under the root importer;
    /// this recovers one project's share of it.
    pub fn subset_for_dependencies(
        &self,
        key: &str,
        names: &BTreeSet<String>,
    ) -> Option<LockSubset> {
        self.subset(key, Some(names))
    }

    fn subset(&self, key: &str, names: Option<&BTreeSet<String>>) -> Option<LockSubset> {
        let importer = self.lockfile.importer(key)?;

        let mut dfs = Dfs::empty(&self.graph);
        let mut packages = BTreeMap::new();

        for (name, dep) in importer.resolved() {
            if names.is_some_and(|names| !names.contains(name)) {
                continue;
            }
            let Some(start) = self
                .lockfile
                .package_key(name, dep.version())
                .and_then(|k| self.nodes.get(&k).copied())
            else {
                continue;
            };

            dfs.move_to(start);
            while let Some(node) = dfs.next(&self.graph) {
                let package_key = &self.graph[node];
                packages.insert(package_key.clone(), self.lockfile.integrity(package_key));
            }
        }

        Some(LockSubset { packages })
    }
}
