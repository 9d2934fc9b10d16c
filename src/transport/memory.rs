//! In-memory transport for fast, deterministic unit tests.
//!
//! Records every command and returns canned responses, so resource logic can
//! be exercised without spawning subprocesses or touching the filesystem.
//! Matching is by substring: the first canned response whose needle appears in
//! the command line wins; unmatched commands succeed with empty output.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use super::Transport;
use crate::error::TendError;

struct CannedResponse {
    needle: String,
    output: String,
    code: i32,
}

/// Transport backed by an in-memory file map and scripted command responses.
#[derive(Default)]
pub struct MemoryTransport {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    responses: RefCell<Vec<CannedResponse>>,
    log: RefCell<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any command containing `needle`.
    pub fn respond(&self, needle: impl Into<String>, output: impl Into<String>, code: i32) {
        self.responses.borrow_mut().push(CannedResponse {
            needle: needle.into(),
            output: output.into(),
            code,
        });
    }

    /// Seed a file into the in-memory filesystem.
    pub fn insert_file(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    /// Read back a file written through the transport, as UTF-8.
    pub fn file_content(&self, path: &str) -> Option<String> {
        self.files
            .borrow()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every command line that went through the transport, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// True if any recorded command contains `needle`.
    pub fn ran(&self, needle: &str) -> bool {
        self.log.borrow().iter().any(|cmd| cmd.contains(needle))
    }

    fn dispatch(&self, command: &str) -> (String, i32) {
        self.log.borrow_mut().push(command.to_string());
        for canned in self.responses.borrow().iter() {
            if command.contains(&canned.needle) {
                return (canned.output.clone(), canned.code);
            }
        }
        (String::new(), 0)
    }
}

impl Transport for MemoryTransport {
    fn run_shell(&self, command: &str) -> Result<(String, i32)> {
        Ok(self.dispatch(command))
    }

    fn run_command(&self, args: &[&str]) -> Result<(String, i32)> {
        Ok(self.dispatch(&args.join(" ")))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files.borrow().get(path).cloned().ok_or_else(|| {
            TendError::FileNotFound {
                path: path.to_string(),
            }
            .into()
        })
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.borrow().contains_key(path))
    }

    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let content = std::fs::read(local_path)?;
        self.write_file(remote_path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_responses_match_by_substring() {
        let transport = MemoryTransport::new();
        transport.respond("systemctl is-active", "", 3);
        let (_, code) = transport
            .run_command(&["systemctl", "is-active", "nginx"])
            .unwrap();
        assert_eq!(code, 3);
        let (_, code) = transport.run_shell("echo hi").unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn files_round_trip() {
        let transport = MemoryTransport::new();
        transport.write_file("/etc/motd", b"hi").unwrap();
        assert!(transport.file_exists("/etc/motd").unwrap());
        assert_eq!(transport.read_file("/etc/motd").unwrap(), b"hi");
        assert!(transport.read_file("/missing").is_err());
    }

    #[test]
    fn command_log_preserves_order() {
        let transport = MemoryTransport::new();
        transport.run_shell("first").unwrap();
        transport.run_command(&["second", "arg"]).unwrap();
        assert_eq!(transport.commands(), vec!["first", "second arg"]);
        assert!(transport.ran("second"));
    }
}
