//! Plan command - show what would change without applying.

use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

use super::{RemoteArgs, display_plan};
use crate::executor::Executor;
use crate::manifest;
use crate::output::Output;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Configuration manifest to plan
    pub manifest: PathBuf,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub fn run(args: PlanArgs) -> Result<()> {
    let transport = args.remote.transport()?;
    let mut executor = Executor::new(transport);
    executor.set_config_file(args.manifest.display().to_string());

    println!("Planning {}...\n", args.manifest.display());
    manifest::load(&args.manifest, &mut executor)?;

    let result = executor.plan();

    if result.has_errors() {
        Output::error("Errors during planning:");
        for error in &result.errors {
            Output::error(format!("  ! {error}"));
        }
        Output::blank();
    }

    if !result.has_changes() {
        if result.has_errors() {
            bail!("{} resource(s) failed to plan", result.errors.len());
        }
        Output::success("No changes needed.");
        executor.close()?;
        return Ok(());
    }

    println!("Tend will perform the following actions:\n");
    for (resource_id, plan) in result.iter() {
        if plan.has_changes() {
            display_plan(resource_id, plan);
        }
    }
    println!("Plan: {} to change", result.change_count());
    println!(
        "\nRun 'tend apply {}' to apply these changes.",
        args.manifest.display()
    );

    executor.close()?;
    if result.has_errors() {
        bail!("{} resource(s) failed to plan", result.errors.len());
    }
    Ok(())
}
