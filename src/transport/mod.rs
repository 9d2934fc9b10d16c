//! Transport layer.
//!
//! Every command a resource runs and every file it touches funnels through the
//! [`Transport`] trait, which is the only place that knows whether the target
//! host is the local machine or a remote reached over SSH. This keeps the
//! engine itself location-transparent and testable against [`MemoryTransport`].

use anyhow::Result;
use std::path::Path;

use crate::error::TendError;

pub mod local;
pub mod memory;
pub mod ssh;

pub use local::LocalTransport;
pub use memory::MemoryTransport;
pub use ssh::{SshConfig, SshTransport};

/// Capability set for touching a target host, local or remote.
pub trait Transport {
    /// Run a command line through the shell. Returns merged stdout/stderr and
    /// the exit code.
    fn run_shell(&self, command: &str) -> Result<(String, i32)>;

    /// Run a command without shell interpretation. Preferred when arguments
    /// are structured.
    fn run_command(&self, args: &[&str]) -> Result<(String, i32)>;

    /// Read a file's bytes. Fails with [`TendError::FileNotFound`] if absent.
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite a file, creating parent directories as needed.
    fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Check whether a path exists.
    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Copy a local file to a (possibly remote) destination path.
    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Release connection resources. No-op for the local transport.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Run an argv through the transport and fail if it exits non-zero.
pub fn run_checked(transport: &dyn Transport, args: &[&str], context: &str) -> Result<String> {
    let (output, code) = transport.run_command(args)?;
    if code != 0 {
        return Err(TendError::CommandFailed {
            context: context.to_string(),
            code,
            output,
        }
        .into());
    }
    Ok(output)
}

/// Run a shell line through the transport and fail if it exits non-zero.
pub fn run_shell_checked(transport: &dyn Transport, command: &str, context: &str) -> Result<String> {
    let (output, code) = transport.run_shell(command)?;
    if code != 0 {
        return Err(TendError::CommandFailed {
            context: context.to_string(),
            code,
            output,
        }
        .into());
    }
    Ok(output)
}

/// Null-object transport bound to every resource until it is registered.
///
/// Calling any method fails loudly with a message pointing at the registration
/// contract instead of a nil dereference deep in resource code.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl NullTransport {
    fn unbound(method: &'static str) -> anyhow::Error {
        TendError::TransportUnbound { method }.into()
    }
}

impl Transport for NullTransport {
    fn run_shell(&self, _command: &str) -> Result<(String, i32)> {
        Err(Self::unbound("run_shell()"))
    }

    fn run_command(&self, _args: &[&str]) -> Result<(String, i32)> {
        Err(Self::unbound("run_command()"))
    }

    fn read_file(&self, _path: &str) -> Result<Vec<u8>> {
        Err(Self::unbound("read_file()"))
    }

    fn write_file(&self, _path: &str, _content: &[u8]) -> Result<()> {
        Err(Self::unbound("write_file()"))
    }

    fn file_exists(&self, _path: &str) -> Result<bool> {
        Err(Self::unbound("file_exists()"))
    }

    fn copy_file(&self, _local_path: &Path, _remote_path: &str) -> Result<()> {
        Err(Self::unbound("copy_file()"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_transport_points_at_registration_contract() {
        let err = NullTransport.run_shell("true").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("run_shell()"));
        assert!(msg.contains("registered with an executor"));
    }

    #[test]
    fn run_checked_surfaces_exit_code_and_output() {
        let transport = MemoryTransport::new();
        transport.respond("false", "boom", 1);
        let err = run_checked(&transport, &["false"], "probe failed").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("boom"));
    }
}
