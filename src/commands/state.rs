//! State command - read-only views over the persisted state store.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;

use crate::output::Output;
use crate::state::Store;

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// List all managed resources
    List,
    /// Show detailed state and recent history for one resource
    Show(ShowArgs),
    /// Show change history for one resource
    History(HistoryArgs),
    /// List resources whose last recorded status is drift
    Drift,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Resource id, e.g. file:/etc/motd
    pub resource_id: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Resource id, e.g. file:/etc/motd
    pub resource_id: String,

    /// Number of entries to show
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

pub fn run(command: StateCommand) -> Result<()> {
    let store = Store::open_default()?;
    match command {
        StateCommand::List => list(&store),
        StateCommand::Show(args) => show(&store, &args.resource_id),
        StateCommand::History(args) => history(&store, &args.resource_id, args.limit),
        StateCommand::Drift => drift(&store),
    }
}

fn list(store: &Store) -> Result<()> {
    let resources = store.list_resources()?;
    if resources.is_empty() {
        println!("No managed resources found.");
        println!("Run 'tend apply' to start tracking state.");
        return Ok(());
    }

    println!("{:<40} {:<12} LAST APPLIED", "RESOURCE", "STATUS");
    Output::separator();
    for resource in resources {
        println!(
            "{:<40} {:<12} {}",
            resource.id,
            resource.status.to_string(),
            resource.applied_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn show(store: &Store, resource_id: &str) -> Result<()> {
    let Some(resource) = store.get_resource(resource_id)? else {
        bail!("resource not found: {resource_id}");
    };

    Output::kv("Resource", &resource.id);
    Output::kv("Type", &resource.resource_type);
    Output::kv("Status", resource.status.to_string());
    Output::kv(
        "Last Applied",
        format!(
            "{} by {}",
            resource.applied_at.format("%Y-%m-%d %H:%M:%S"),
            resource.applied_by
        ),
    );
    Output::kv("Config File", &resource.config_file);
    Output::kv("Hostname", &resource.hostname);

    println!("\nActual State:");
    for (key, value) in &resource.actual_state {
        println!("  {key}: {value}");
    }

    let history = store.get_history(resource_id, 5)?;
    if !history.is_empty() {
        println!("\nRecent History:");
        for entry in history {
            let symbol = if entry.success {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            println!(
                "  {} {symbol} {} by {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.action,
                entry.user
            );
        }
    }
    Ok(())
}

fn history(store: &Store, resource_id: &str, limit: usize) -> Result<()> {
    let entries = store.get_history(resource_id, limit)?;
    if entries.is_empty() {
        println!("No history found for {resource_id}");
        return Ok(());
    }

    println!("History for {resource_id}:\n");
    for entry in entries {
        let symbol = if entry.success {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        println!(
            "{} {symbol} {} by {}@{}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.user,
            entry.hostname
        );

        if let Some(changes) = entry.changes.as_object() {
            if !changes.is_empty() {
                println!("  Changes:");
                for (field, change) in changes {
                    println!(
                        "    {field}: {} → {}",
                        change.get("from").unwrap_or(&serde_json::Value::Null),
                        change.get("to").unwrap_or(&serde_json::Value::Null)
                    );
                }
            }
        }
        Output::blank();
    }
    Ok(())
}

fn drift(store: &Store) -> Result<()> {
    let drifted = store.list_drifted()?;
    if drifted.is_empty() {
        Output::success("No drifted resources found.");
        return Ok(());
    }

    Output::warning(format!("Found {} resource(s) with drift:", drifted.len()));
    for resource in drifted {
        println!("  {}", resource.id);
        println!(
            "    Last applied: {}",
            resource.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("    Config: {}", resource.config_file);
    }
    Ok(())
}
