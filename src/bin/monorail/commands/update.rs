//! `monorail update` command

use anyhow::Result;

use crate::cli::UpdateArgs;
use crate::commands::{print_outcome, Session};
use monorail::cache::BuildCacheProvider;
use monorail::ops;
use monorail::ops::install::SystemRunner;
use monorail::GlobalContext;

pub fn execute(args: UpdateArgs, ctx: &GlobalContext) -> Result<()> {
    let mut session = Session::open(ctx)?;

    let mut options = session.install_options(args.variant, args.purge);
    options.allow_lockfile_mutation = true;
    options.full_upgrade = args.full;

    if args.full {
        eprintln!("    Updating all dependencies from scratch");
    } else {
        eprintln!("    Updating lockfile");
    }

    let cache = session.cache.as_ref().map(|c| c as &dyn BuildCacheProvider);
    let outcome = ops::install(&mut session.ws, &options, &SystemRunner, cache)?;

    for warning in &outcome.warnings {
        eprintln!("    note: {}", warning);
    }
    print_outcome(&outcome);
    if outcome.needs_full_upgrade {
        eprintln!("warning: the lockfile stays stale until `monorail update --full` runs");
    }

    Ok(())
}
