//! Custom error types for tend.
//!
//! Construction-time failures (validation, security screening) abort the
//! manifest load. Everything that happens during plan/apply is collected per
//! resource instead of raised, so one broken resource never takes down a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TendError {
    /// Bad constructor input. Raised at registration, fatal to the load.
    #[error("invalid {resource}: {message}")]
    Validation { resource: String, message: String },

    /// Exec security screening failed in strict mode.
    #[error("security violation in '{resource}': {}", .findings.join("; "))]
    SecurityViolation {
        resource: String,
        findings: Vec<String>,
    },

    /// The probed platform has no supported package manager.
    #[error("unsupported platform for {resource}: no package manager known for '{distro}'")]
    UnsupportedPlatform { resource: String, distro: String },

    /// A resource method ran before the resource was registered with an
    /// executor, so no transport is bound.
    #[error(
        "cannot call {method}: transport not bound. \
         Resources must be registered with an executor before use."
    )]
    TransportUnbound { method: &'static str },

    /// A command the engine required to succeed exited non-zero.
    #[error("{context} (exit code {code})\n{output}")]
    CommandFailed {
        context: String,
        code: i32,
        output: String,
    },

    #[error("file not found: {path}")]
    FileNotFound { path: String },
}
