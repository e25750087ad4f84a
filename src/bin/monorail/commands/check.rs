//! `monorail check` command
//!
//! Exits non-zero when an install would have to change the lockfile.

use anyhow::{anyhow, Result};

use crate::cli::CheckArgs;
use monorail::ops;
use monorail::util::diagnostic::{self, suggestions, Diagnostic, ReportedError};
use monorail::{GlobalContext, Workspace};

pub fn execute(args: CheckArgs, ctx: &GlobalContext) -> Result<()> {
    let config_path = ctx.find_repo_config()?;
    let ws = Workspace::load(&config_path)?;

    let freshness = ops::check(&ws, args.variant.as_deref())?;
    if freshness.is_fresh() {
        eprintln!("    Finished lockfile is up to date");
        return Ok(());
    }

    let mut diag = Diagnostic::error("the lockfile is out of date")
        .with_location(ws.committed_lockfile_path(args.variant.as_deref()));
    for warning in freshness.warnings() {
        diag = diag.with_context(warning.clone());
    }
    diag = diag.with_suggestion(if freshness.needs_full_upgrade() {
        suggestions::FULL_UPDATE
    } else {
        suggestions::STALE_LOCK
    });
    diagnostic::emit(&diag, ctx.color());

    Err(ReportedError::reported(anyhow!("the lockfile is out of date")).into())
}
