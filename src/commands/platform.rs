//! Platform command - print the probed platform.

use anyhow::Result;
use clap::Args;

use super::RemoteArgs;
use crate::output::Output;
use crate::platform::Platform;

#[derive(Debug, Args)]
pub struct PlatformArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub fn run(args: PlatformArgs) -> Result<()> {
    let transport = args.remote.transport()?;
    let platform = Platform::detect(&*transport);

    println!("Platform Information:");
    Output::kv("System", &platform.system);
    Output::kv("Distro", &platform.distro);
    Output::kv("Version", &platform.version);
    Output::kv("Arch", &platform.arch);
    transport.close()?;
    Ok(())
}
