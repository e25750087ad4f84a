//! Monorail - install orchestration for multi-project JavaScript monorepos
//!
//! This crate provides the core library functionality for Monorail:
//! deciding whether the checked-in lockfile is still valid, keeping sibling
//! references consistent, driving the package manager, and reconciling the
//! result into per-project lock subsets.

pub mod cache;
pub mod core;
pub mod lockfile;
pub mod ops;
pub mod util;

/// Test utilities for Monorail unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It builds repositories on disk and stubs the package
/// manager.
#[cfg(test)]
pub mod test_support;

pub use core::{project::Project, workspace::Workspace};

pub use lockfile::Lockfile;
pub use ops::install::{InstallError, InstallOptions};
pub use util::context::GlobalContext;
