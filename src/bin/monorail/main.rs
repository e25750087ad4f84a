//! Monorail CLI - install orchestration for JavaScript monorepos

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use monorail::util::diagnostic::{self, ReportedError};
use monorail::util::GlobalContext;
use monorail::InstallError;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;

    if let Err(e) = run(cli) {
        report(&e, color);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("monorail=debug")
    } else {
        EnvFilter::new("monorail=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(!cli.no_color);

    match cli.command {
        Commands::Install(args) => commands::install::execute(args, &ctx),
        Commands::Update(args) => commands::update::execute(args, &ctx),
        Commands::Check(args) => commands::check::execute(args, &ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

fn report(err: &anyhow::Error, color: bool) {
    if let Some(reported) = err.downcast_ref::<ReportedError>() {
        if reported.already_reported() {
            return;
        }
        return report(reported.inner(), color);
    }

    match err.downcast_ref::<InstallError>() {
        Some(install_error) => diagnostic::emit(&install_error.to_diagnostic(), color),
        None => eprintln!("error: {:#}", err),
    }
}
