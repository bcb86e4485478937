use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hoard",
    about = "Hoard: shared-memory object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the default configuration as TOML
    Config,
    /// Validate a configuration file
    Check(CheckArgs),
    /// Start a store and run commands from stdin against one session
    Shell(ShellArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ShellArgs {
    /// Configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the arena capacity in bytes
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Override the endpoint name
    #[arg(long)]
    pub endpoint: Option<PathBuf>,
}
