//! CLI command implementations.

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::output::Output;
use crate::resource::{Action, Plan, display_value};
use crate::transport::{LocalTransport, SshConfig, SshTransport, Transport};

pub mod apply;
pub mod drift;
pub mod plan;
pub mod platform;
pub mod state;

/// Remote-target flags shared by plan and apply.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Remote host to manage over SSH (default: local)
    #[arg(long)]
    pub host: Option<String>,

    /// SSH username (default: current user)
    #[arg(long)]
    pub user: Option<String>,

    /// Path to an SSH private key
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// SSH password (prefer --key)
    #[arg(long)]
    pub password: Option<String>,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    pub port: u16,

    /// SSH connect timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Run remote commands under a non-interactive escalation helper
    #[arg(long)]
    pub escalate: bool,
}

impl RemoteArgs {
    /// Build the transport these flags describe.
    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        let Some(host) = &self.host else {
            return Ok(Arc::new(LocalTransport::new()));
        };

        let mut config = SshConfig::new(host.clone());
        config.port = self.port;
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        config.key_path = self.key.clone();
        config.password = self.password.clone();
        config.timeout = Duration::from_secs(self.timeout);
        config.escalate = self.escalate;

        let spinner = Output::spinner(format!("Connecting to {}@{host}:{}...", config.user, config.port));
        match SshTransport::connect(config) {
            Ok(transport) => {
                spinner.finish_success(format!("Connected to {host}"));
                Ok(Arc::new(transport))
            }
            Err(error) => {
                spinner.finish_error(format!("Connection to {host} failed"));
                Err(error)
            }
        }
    }
}

/// Colored one-character symbol for an action.
pub fn action_symbol(action: Action) -> String {
    match action {
        Action::Create => "+".green().to_string(),
        Action::Update => "~".yellow().to_string(),
        Action::Delete => "-".red().to_string(),
        Action::None => " ".to_string(),
    }
}

/// Print one resource's plan: symbol, id, reason, per-change lines.
pub fn display_plan(resource_id: &str, plan: &Plan) {
    println!("  {} {resource_id}", action_symbol(plan.action));
    if !plan.reason.is_empty() {
        println!("      reason: {}", plan.reason.dimmed());
    }
    for change in &plan.changes {
        println!(
            "      {}: {} → {}",
            change.field,
            display_value(&change.from).dimmed(),
            display_value(&change.to)
        );
    }
    println!();
}
