//! Check-drift command - sweep the state store for live divergence.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use crate::drift::DriftDetector;
use crate::output::Output;
use crate::state::Store;
use crate::transport::LocalTransport;

#[derive(Debug, Args)]
pub struct DriftArgs {
    /// Re-apply hints for drifted resources
    #[arg(long)]
    pub fix: bool,
}

pub fn run(args: DriftArgs) -> Result<()> {
    let store = Store::open_default()?;
    let detector = DriftDetector::new(store, Arc::new(LocalTransport::new()));

    let spinner = Output::spinner("Checking for drift...");
    let results = detector.check_all()?;
    spinner.finish_clear();

    let drifted: Vec<_> = results.iter().filter(|r| r.drifted).collect();

    if drifted.is_empty() {
        Output::success("No drift detected.");
        return Ok(());
    }

    Output::warning(format!("Drift detected in {} resource(s):", drifted.len()));
    for result in &drifted {
        println!("\n  {}", result.resource_id);
        for (field, difference) in &result.differences {
            println!(
                "    {field}: {} -> {}",
                difference.expected, difference.actual
            );
        }
    }

    if args.fix {
        // Drift is corrected by re-applying the owning configuration; the
        // store does not record enough to rebuild full desired state here.
        Output::blank();
        Output::hint("Re-run 'tend apply <manifest>' to converge drifted resources.");
    } else {
        Output::blank();
        Output::hint("Run with --fix for remediation hints.");
    }
    Ok(())
}
