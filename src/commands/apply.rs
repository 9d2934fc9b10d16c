//! Apply command - plan, confirm, and carry out configuration changes.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{RemoteArgs, action_symbol, display_plan};
use crate::executor::Executor;
use crate::manifest;
use crate::output::Output;

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Configuration manifest to apply
    pub manifest: PathBuf,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub fn run(args: ApplyArgs) -> Result<()> {
    let transport = args.remote.transport()?;
    let mut executor = Executor::new(transport);
    executor.set_config_file(args.manifest.display().to_string());
    executor.enable_state_tracking();

    println!("Planning {}...\n", args.manifest.display());
    manifest::load(&args.manifest, &mut executor)?;

    let plan_result = executor.plan();

    if plan_result.has_errors() {
        Output::error("Errors during planning:");
        for error in &plan_result.errors {
            Output::error(format!("  ! {error}"));
        }
        bail!("{} resource(s) failed to plan", plan_result.errors.len());
    }

    if !plan_result.has_changes() {
        Output::success("No changes needed.");
        executor.close()?;
        return Ok(());
    }

    for (resource_id, plan) in plan_result.iter() {
        if plan.has_changes() {
            display_plan(resource_id, plan);
        }
    }
    println!("Applying {} change(s)...\n", plan_result.change_count());

    if !args.yes && !confirm("Proceed with apply?")? {
        println!("Aborted.");
        executor.close()?;
        return Ok(());
    }

    // Ctrl-C finishes the in-flight resource, then stops the pass.
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to install interrupt handler")?;
    executor.set_interrupt(interrupted);

    let result = executor.apply(&plan_result);

    Output::blank();
    for resource_id in &result.changed {
        if let Some(plan) = plan_result.get(resource_id) {
            println!(
                "  {} {resource_id} ... {}",
                action_symbol(plan.action),
                "✓ Done"
            );
        }
    }

    if !result.success() {
        Output::error("Errors during apply:");
        for error in &result.errors {
            Output::error(format!("  ! {error}"));
        }
        executor.close()?;
        bail!("apply finished with {} error(s)", result.errors.len());
    }

    executor.close()?;
    Output::success(format!(
        "Apply complete! ({:.2}s)",
        result.duration.as_secs_f64()
    ));
    Ok(())
}

/// Prompt on stdout, read one line, default no.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
