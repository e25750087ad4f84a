//! `package.json` project manifests.
//!
//! The manifest is kept as a raw JSON object so that rewriting a dependency
//! preserves every other field and the author's key order.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::specifier::DependencySpecifier;
use crate::util::fs;

/// File name of a project manifest.
pub const PACKAGE_JSON: &str = "package.json";

/// Which dependency table an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    Normal,
    Dev,
    Peer,
    Optional,
}

impl DependencyKind {
    /// Kinds the package manager installs into the project.
    pub const INSTALLED: [DependencyKind; 3] = [
        DependencyKind::Normal,
        DependencyKind::Dev,
        DependencyKind::Optional,
    ];

    /// The `package.json` key for this table.
    pub fn field(&self) -> &'static str {
        match self {
            DependencyKind::Normal => "dependencies",
            DependencyKind::Dev => "devDependencies",
            DependencyKind::Peer => "peerDependencies",
            DependencyKind::Optional => "optionalDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// A single dependency entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub name: String,
    pub version_text: String,
    pub kind: DependencyKind,
}

impl DependencyEntry {
    /// Classify this entry.
    pub fn specifier(&self) -> DependencySpecifier {
        DependencySpecifier::parse(&self.name, &self.version_text)
    }
}

/// Errors from reading a manifest's required fields.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("`{path}` is not a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("`{path}` is missing the `{field}` field")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("`{path}` has an invalid version `{version}`")]
    InvalidVersion { path: PathBuf, version: String },
}

/// A parsed `package.json`.
#[derive(Debug, Clone)]
pub struct PackageJson {
    path: PathBuf,
    name: String,
    version: Version,
    raw: Map<String, Value>,
}

impl PackageJson {
    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(path, &contents)
    }

    /// Parse manifest text. `path` is used for messages and saving.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let Value::Object(raw) = value else {
            return Err(ManifestError::NotAnObject {
                path: path.to_path_buf(),
            }
            .into());
        };

        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                field: "name",
            })?
            .to_string();

        let version_text = raw
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                field: "version",
            })?;
        let version = Version::parse(version_text).map_err(|_| ManifestError::InvalidVersion {
            path: path.to_path_buf(),
            version: version_text.to_string(),
        })?;

        Ok(PackageJson {
            path: path.to_path_buf(),
            name,
            version,
            raw,
        })
    }

    /// Path this manifest was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Entries of one dependency table, in file order.
    pub fn dependencies(&self, kind: DependencyKind) -> Vec<DependencyEntry> {
        let Some(Value::Object(table)) = self.raw.get(kind.field()) else {
            return Vec::new();
        };

        table
            .iter()
            .filter_map(|(name, value)| {
                value.as_str().map(|text| DependencyEntry {
                    name: name.clone(),
                    version_text: text.to_string(),
                    kind,
                })
            })
            .collect()
    }

    /// Look up the version text of a dependency.
    pub fn dependency(&self, kind: DependencyKind, name: &str) -> Option<&str> {
        self.raw
            .get(kind.field())
            .and_then(|table| table.get(name))
            .and_then(Value::as_str)
    }

    /// Add or replace a dependency. Existing entries keep their position.
    pub fn set_dependency(&mut self, kind: DependencyKind, name: &str, version_text: &str) {
        let table = self
            .raw
            .entry(kind.field())
            .or_insert_with(|| Value::Object(Map::new()));

        if !table.is_object() {
            *table = Value::Object(Map::new());
        }
        if let Value::Object(table) = table {
            table.insert(name.to_string(), Value::String(version_text.to_string()));
        }
    }

    /// Serialize in the conventional two-space style with a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.raw)
            .with_context(|| format!("failed to serialize {}", self.path.display()))?;
        out.push('\n');
        Ok(out)
    }

    /// Write the manifest back if its content changed. Returns `true` if written.
    pub fn save(&self) -> Result<bool> {
        fs::write_if_changed(&self.path, &self.to_json_string()?)
    }
}
