//! Core data structures for monorail.
//!
//! This module contains the foundational types used throughout monorail:
//! - Version ranges and dependency specifiers
//! - Project manifests and projects
//! - The workspace and its repository configuration

pub mod common_versions;
pub mod manifest;
pub mod project;
pub mod specifier;
pub mod version;
pub mod workspace;

pub use common_versions::CommonVersions;
pub use manifest::{DependencyEntry, DependencyKind, PackageJson};
pub use project::Project;
pub use specifier::{DependencySpecifier, SpecifierKind};
pub use version::NpmRange;
pub use workspace::{InstallMode, RepoConfig, Workspace};
