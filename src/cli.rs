//! CLI argument definitions for tend.
//!
//! Separated from `main.rs` so library code and integration tests can
//! reference these types.

use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "tend")]
#[command(about = "Tend - declarative configuration for local and remote hosts")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show what would change without applying
    Plan(commands::plan::PlanArgs),

    /// Apply configuration changes
    Apply(commands::apply::ApplyArgs),

    /// Inspect persisted resource state and history
    #[command(subcommand)]
    State(commands::state::StateCommand),

    /// Check managed resources for drift against their last-applied state
    #[command(name = "check-drift")]
    CheckDrift(commands::drift::DriftArgs),

    /// Show the probed platform
    Platform(commands::platform::PlatformArgs),
}
