//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Monorail - keeps a monorepo's dependencies installed and its lockfile honest
#[derive(Parser)]
#[command(name = "monorail")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install dependencies from the committed lockfile
    Install(InstallArgs),

    /// Install dependencies, updating the lockfile as needed
    Update(UpdateArgs),

    /// Report whether the lockfile is up to date, without installing
    Check(CheckArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct InstallArgs {
    /// Start from an empty dependency folder
    #[arg(long)]
    pub purge: bool,

    /// Use an alternate lockfile set
    #[arg(long, env = "MONORAIL_VARIANT")]
    pub variant: Option<String>,

    /// How many times to run the package manager before giving up
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Only install the named project and its dependencies
    #[arg(long = "to", value_name = "PROJECT")]
    pub to: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Rewrite sibling references and regenerate the lockfile from scratch
    #[arg(long)]
    pub full: bool,

    /// Start from an empty dependency folder
    #[arg(long)]
    pub purge: bool,

    /// Use an alternate lockfile set
    #[arg(long, env = "MONORAIL_VARIANT")]
    pub variant: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Use an alternate lockfile set
    #[arg(long, env = "MONORAIL_VARIANT")]
    pub variant: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
