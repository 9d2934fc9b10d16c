//! Local transport - subprocess and direct filesystem operations.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::Transport;
use crate::error::TendError;

/// Transport that runs commands and touches files on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    fn merged_output(output: std::process::Output) -> (String, i32) {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        (text, output.status.code().unwrap_or(-1))
    }
}

impl Transport for LocalTransport {
    fn run_shell(&self, command: &str) -> Result<(String, i32)> {
        debug!(command, "running shell command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .with_context(|| format!("failed to spawn shell for `{command}`"))?;
        Ok(Self::merged_output(output))
    }

    fn run_command(&self, args: &[&str]) -> Result<(String, i32)> {
        let (program, rest) = args
            .split_first()
            .context("run_command requires at least a program name")?;
        debug!(program, ?rest, "running command");
        let output = Command::new(program)
            .args(rest)
            .output()
            .with_context(|| format!("failed to run '{program}'"))?;
        Ok(Self::merged_output(output))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(TendError::FileNotFound {
                    path: path.to_string(),
                }
                .into())
            }
            Err(err) => Err(err).with_context(|| format!("failed to read {path}")),
        }
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        std::fs::write(path, content).with_context(|| format!("failed to write {path}"))
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).exists())
    }

    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let content = std::fs::read(local_path)
            .with_context(|| format!("failed to read {}", local_path.display()))?;
        self.write_file(remote_path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_shell_merges_output_and_reports_exit_code() {
        let transport = LocalTransport::new();
        let (output, code) = transport.run_shell("echo out; echo err >&2").unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
        assert_eq!(code, 0);

        let (_, code) = transport.run_shell("exit 3").unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn run_command_skips_shell_interpretation() {
        let transport = LocalTransport::new();
        let (output, code) = transport.run_command(&["echo", "$HOME"]).unwrap();
        assert_eq!(output.trim(), "$HOME");
        assert_eq!(code, 0);
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let transport = LocalTransport::new();
        transport
            .write_file(path.to_str().unwrap(), b"hello")
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let transport = LocalTransport::new();
        let err = transport.read_file("/nonexistent/tend-test").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
