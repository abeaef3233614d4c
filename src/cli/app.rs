//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::move_cmd::{self, MoveArgs};
use super::output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "gh-pmu")]
#[command(author, version, about = "Bulk field updates for GitHub Projects")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the nearest .gh-pmu.yml)
    #[arg(long, global = true, env = "GH_PMU_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Change status, priority or release of issues on the project board
    Move(MoveArgs),
}

/// Sends tracing output to stderr; RUST_LOG wins over --verbose
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = Output::new(cli.format, cli.verbose);

    match cli.command {
        Commands::Move(args) => move_cmd::run(args, cli.config.as_deref(), &output),
    }
}
