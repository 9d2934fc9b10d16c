//! Built-in resource types.

pub mod exec;
pub mod file;
pub mod pkg;
pub mod repository;
pub mod service;

pub use exec::{Exec, ExecOptions};
pub use file::{File, FileEnsure};
pub use pkg::{Package, PackageManager, PkgEnsure};
pub use repository::{RepoAction, RepoEnsure, Repository, RepositoryOptions};
pub use service::Service;
