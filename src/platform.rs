//! Platform probe.
//!
//! Learns the target's system, distribution, version, and architecture
//! through the transport. Fields default to `unknown`/empty rather than
//! failing the run: an unprobeable host still gets a plan, and resources
//! that genuinely need the answer fail individually.

use crate::transport::Transport;

/// Probed platform information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Kernel name: `Linux`, `Darwin`, ...
    pub system: String,
    /// Distribution id: `ubuntu`, `fedora`, `arch`, `macos`, ...
    pub distro: String,
    pub version: String,
    pub arch: String,
}

impl Platform {
    /// Probe the target behind `transport`.
    pub fn detect(transport: &dyn Transport) -> Platform {
        let system = probe(transport, "uname -s");
        let arch = probe(transport, "uname -m");

        let mut distro = "unknown".to_string();
        let mut version = String::new();

        if system == "Linux" {
            if let Ok(content) = transport.read_file("/etc/os-release") {
                let content = String::from_utf8_lossy(&content);
                for line in content.lines() {
                    if let Some(value) = line.strip_prefix("ID=") {
                        distro = value.trim().trim_matches('"').to_string();
                    } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
                        version = value.trim().trim_matches('"').to_string();
                    }
                }
            }
        } else if system == "Darwin" {
            distro = "macos".to_string();
            version = probe(transport, "sw_vers -productVersion");
            if version == "unknown" {
                version = String::new();
            }
        }

        Platform {
            system,
            distro,
            version,
            arch,
        }
    }

    pub fn is_linux(&self) -> bool {
        self.system == "Linux"
    }

    pub fn is_macos(&self) -> bool {
        self.system == "Darwin"
    }
}

fn probe(transport: &dyn Transport, command: &str) -> String {
    match transport.run_shell(command) {
        Ok((output, 0)) if !output.trim().is_empty() => output.trim().to_string(),
        _ => "unknown".to_string(),
    }
}
