//! High-level operations.
//!
//! This module contains the implementation of Monorail commands.

pub mod flags;
pub mod freshness;
pub mod install;
pub mod post_install;
pub mod reconcile;
pub mod synthesize;

pub use freshness::Freshness;
pub use install::{check, install, InstallOptions, InstallOutcome};
pub use reconcile::{ReconcileOptions, ReconcilePlan};
pub use synthesize::{CommonManifest, WorkspaceManifest};
