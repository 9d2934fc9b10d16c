//! tend - declarative configuration for local and remote hosts.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tend::cli::{Cli, Commands};
use tend::commands;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Apply(args) => commands::apply::run(args),
        Commands::State(command) => commands::state::run(command),
        Commands::CheckDrift(args) => commands::drift::run(args),
        Commands::Platform(args) => commands::platform::run(args),
    }
}
