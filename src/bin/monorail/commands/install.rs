//! `monorail install` command

use anyhow::{bail, Result};

use crate::cli::InstallArgs;
use crate::commands::{print_outcome, Session};
use monorail::cache::BuildCacheProvider;
use monorail::ops;
use monorail::ops::install::SystemRunner;
use monorail::GlobalContext;

pub fn execute(args: InstallArgs, ctx: &GlobalContext) -> Result<()> {
    let mut session = Session::open(ctx)?;

    let mut options = session.install_options(args.variant, args.purge);
    if let Some(max_attempts) = args.max_attempts {
        if max_attempts == 0 {
            bail!("--max-attempts must be at least 1");
        }
        options.max_attempts = max_attempts;
    }
    for project in &args.to {
        if session.ws.project(project).is_none() {
            bail!("no project named `{}` in this repository", project);
        }
        options.add_to_filter(project);
    }

    eprintln!(
        "  Installing dependencies for {} project(s)",
        session.ws.projects().len()
    );

    let cache = session.cache.as_ref().map(|c| c as &dyn BuildCacheProvider);
    let outcome = ops::install(&mut session.ws, &options, &SystemRunner, cache)?;
    print_outcome(&outcome);

    Ok(())
}
