//! tend - declarative configuration for local and remote hosts.
//!
//! A configuration manifest declares desired system state as resources
//! (files, packages, services, repositories, commands). The engine inspects
//! current state, computes a minimal plan, and applies it idempotently -
//! against the local machine or a remote host over SSH - with service
//! reload/restart triggers, persisted state, and drift detection on top.
//!
//! The core pipeline is Check → Plan → Apply:
//! - **Check** reads current state through the [`transport::Transport`]
//!   abstraction (never the filesystem directly).
//! - **Plan** diffs it against the declaration ([`resource::plan_resource`]).
//! - **Apply** carries out the diff, in declaration order, collecting
//!   failures instead of aborting.

pub mod cli;
pub mod commands;
pub mod drift;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod output;
pub mod platform;
pub mod resource;
pub mod resources;
pub mod security;
pub mod state;
pub mod template;
pub mod transport;

pub use cli::{Cli, Commands};
pub use error::TendError;
pub use executor::{ApplyResult, Executor, PlanResult};
pub use platform::Platform;
pub use resource::{Action, Change, Plan, Resource, StateMap};
