//! `monorail completions` command

use anyhow::Result;
use clap::CommandFactory;

use crate::cli::{Cli, CompletionsArgs};

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let stdout = std::io::stdout();
    clap_complete::generate(args.shell, &mut cmd, env!("CARGO_BIN_NAME"), &mut stdout.lock());
    Ok(())
}
