//! Work after a successful package-manager run.
//!
//! Per-project lock subsets are derived from the run lockfile on a bounded
//! worker pool. The batch is all-or-nothing: if any project's subset cannot
//! be derived, nothing is written.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::cache::{self, BuildCacheProvider};
use crate::core::project::Project;
use crate::core::workspace::Workspace;
use crate::lockfile::{LockGraph, LockSubset, Lockfile, RepoState};
use crate::ops::flags::{LastInstallFlag, LinkFlag};
use crate::util::fs;

/// What post-install did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostInstallReport {
    /// Projects whose subset file changed
    pub subsets_written: usize,
    /// Whether the committed lockfile was updated
    pub lockfile_updated: bool,
}

/// Inputs for [`post_install`].
pub struct PostInstallOptions<'a> {
    pub variant: Option<&'a str>,
    pub allow_lockfile_mutation: bool,
    pub parallelism: usize,
    /// Fingerprint to record in the repo state, when the lockfile is updated
    pub preferred_versions_hash: &'a str,
    pub cache: Option<&'a dyn BuildCacheProvider>,
}

/// Serialize every project's subset, or fail without writing anything.
pub fn derive_subsets<F>(
    ws: &Workspace,
    lockfile: &Lockfile,
    parallelism: usize,
    subset_for: F,
) -> Result<Vec<(PathBuf, String)>>
where
    F: Fn(&LockGraph<'_>, &Project) -> Option<LockSubset> + Sync,
{
    let graph = lockfile.graph();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()
        .context("failed to start worker pool")?;

    let results: Vec<Result<(PathBuf, String)>> = pool.install(|| {
        ws.projects()
            .par_iter()
            .map(|project| {
                let Some(subset) = subset_for(&graph, project) else {
                    bail!("the lockfile has no entry for project `{}`", project.name());
                };
                let mut contents = serde_json::to_string_pretty(&subset).with_context(|| {
                    format!("failed to serialize lock subset of `{}`", project.name())
                })?;
                contents.push('\n');
                Ok((project.lock_subset_path(), contents))
            })
            .collect()
    });

    results.into_iter().collect()
}

/// Persist subsets, each only if changed. Returns how many were written.
pub fn write_subsets(subsets: &[(PathBuf, String)], parallelism: usize) -> Result<usize> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()
        .context("failed to start worker pool")?;

    let results: Vec<Result<bool>> = pool.install(|| {
        subsets
            .par_iter()
            .map(|(path, contents)| fs::write_if_changed(path, contents))
            .collect()
    });

    let mut written = 0;
    for result in results {
        if result? {
            written += 1;
        }
    }
    Ok(written)
}

/// Reconcile the workspace with the run lockfile.
///
/// Order matters: the install flag is written last, so that an interrupted
/// post-install leaves the cheap gate failing.
pub fn post_install<F>(
    ws: &Workspace,
    options: &PostInstallOptions<'_>,
    subset_for: F,
) -> Result<PostInstallReport>
where
    F: Fn(&LockGraph<'_>, &Project) -> Option<LockSubset> + Sync,
{
    let run_lockfile_path = ws.temp_lockfile_path();
    let Some(lockfile) = Lockfile::load(&run_lockfile_path)? else {
        bail!(
            "the package manager did not produce {}",
            run_lockfile_path.display()
        );
    };

    let subsets = derive_subsets(ws, &lockfile, options.parallelism, subset_for)?;
    let subsets_written = write_subsets(&subsets, options.parallelism)?;
    tracing::debug!(
        "Updated {} of {} lock subsets",
        subsets_written,
        subsets.len()
    );

    let mut lockfile_updated = false;
    if options.allow_lockfile_mutation {
        let committed = ws.committed_lockfile_path(options.variant);
        let contents = fs::read_to_string(&run_lockfile_path)?;
        lockfile_updated = fs::write_if_changed(&committed, &contents)?;
        if lockfile_updated {
            tracing::info!("Updated {}", committed.display());
        }

        let mut repo_state = RepoState::load(&ws.repo_state_path(options.variant))?;
        repo_state.set_preferred_versions_hash(options.preferred_versions_hash);
        repo_state.save()?;
    }

    if let Some(provider) = options.cache {
        cache::publish_lockfile(provider, &run_lockfile_path)?;
    }

    LinkFlag::for_workspace(ws).create()?;
    LastInstallFlag::for_workspace(ws, options.variant).create()?;

    Ok(PostInstallReport {
        subsets_written,
        lockfile_updated,
    })
}
