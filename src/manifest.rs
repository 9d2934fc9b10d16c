//! Configuration manifests.
//!
//! A manifest is the declarative input of a run: a JSON document whose only
//! effect is to construct resources, which the loader registers with the
//! executor in declaration order. Validating constructors (exec security
//! screening, repository action checks) run here, so a bad declaration
//! aborts the load before anything is planned.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::executor::Executor;
use crate::resource::Resource;
use crate::resources::exec::{Exec, ExecOptions};
use crate::resources::file::{File, FileEnsure};
use crate::resources::pkg::{Package, PkgEnsure};
use crate::resources::repository::{RepoAction, RepoEnsure, Repository, RepositoryOptions};
use crate::resources::service::Service;
use crate::security::SecurityLevel;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    resources: Vec<ResourceDecl>,
}

/// A package name or a list of names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameOrList {
    One(String),
    Many(Vec<String>),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ResourceDecl {
    File {
        path: String,
        content: Option<String>,
        source: Option<PathBuf>,
        template: Option<PathBuf>,
        #[serde(default)]
        vars: BTreeMap<String, String>,
        #[serde(default)]
        ensure: FileEnsure,
        /// Octal string, e.g. "0644".
        mode: Option<String>,
        owner: Option<String>,
        group: Option<String>,
    },
    Pkg {
        name: NameOrList,
        version: Option<String>,
        #[serde(default)]
        ensure: PkgEnsure,
    },
    Svc {
        name: String,
        running: Option<bool>,
        enabled: Option<bool>,
        #[serde(default)]
        reload_on: Vec<String>,
        #[serde(default)]
        restart_on: Vec<String>,
    },
    Exec {
        name: String,
        command: String,
        creates: Option<String>,
        unless: Option<String>,
        only_if: Option<String>,
        cwd: Option<String>,
        #[serde(default)]
        environment: BTreeMap<String, String>,
        #[serde(default)]
        dry_run: bool,
        #[serde(default = "default_true")]
        safe_mode: bool,
        #[serde(default)]
        security_level: SecurityLevel,
        #[serde(default)]
        allow_pipes: bool,
        #[serde(default)]
        allow_redirects: bool,
    },
    Repository {
        name: String,
        #[serde(default)]
        action: RepoAction,
        repo: Option<String>,
        key_url: Option<String>,
        key_id: Option<String>,
        key_server: Option<String>,
        ppa: Option<String>,
        tap: Option<String>,
        filename: Option<String>,
        #[serde(default)]
        ensure: RepoEnsure,
    },
}

/// Load a manifest and register its resources with the executor.
/// Returns the number of resources registered.
pub fn load(path: &Path, executor: &mut Executor) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;

    let count = manifest.resources.len();
    for declaration in manifest.resources {
        let resource = build(declaration)?;
        executor.add(resource);
    }
    Ok(count)
}

fn build(declaration: ResourceDecl) -> Result<Box<dyn Resource>> {
    Ok(match declaration {
        ResourceDecl::File {
            path,
            content,
            source,
            template,
            vars,
            ensure,
            mode,
            owner,
            group,
        } => {
            let mut file = File::new(path).ensure(ensure);
            if let Some(content) = content {
                file = file.content(content);
            }
            if let Some(source) = source {
                file = file.source(source);
            }
            if let Some(template) = template {
                file = file.template(template, vars);
            }
            if let Some(mode) = mode {
                file = file.mode(parse_mode(&mode)?);
            }
            if let Some(owner) = owner {
                file = file.owner(owner);
            }
            if let Some(group) = group {
                file = file.group(group);
            }
            Box::new(file)
        }
        ResourceDecl::Pkg {
            name,
            version,
            ensure,
        } => {
            let mut pkg = match name {
                NameOrList::One(name) => Package::new(name),
                NameOrList::Many(names) => {
                    let Some(first) = names.first().cloned() else {
                        bail!("pkg declaration needs at least one package name");
                    };
                    Package::group(first, names)
                }
            };
            if let Some(version) = version {
                pkg = pkg.version(version);
            }
            Box::new(pkg.ensure(ensure))
        }
        ResourceDecl::Svc {
            name,
            running,
            enabled,
            reload_on,
            restart_on,
        } => {
            let mut svc = Service::new(name);
            if let Some(running) = running {
                svc = svc.running(running);
            }
            if let Some(enabled) = enabled {
                svc = svc.enabled(enabled);
            }
            Box::new(svc.reload_on(reload_on).restart_on(restart_on))
        }
        ResourceDecl::Exec {
            name,
            command,
            creates,
            unless,
            only_if,
            cwd,
            environment,
            dry_run,
            safe_mode,
            security_level,
            allow_pipes,
            allow_redirects,
        } => Box::new(Exec::new(
            name,
            command,
            ExecOptions {
                creates,
                unless,
                only_if,
                cwd,
                environment,
                dry_run,
                safe_mode,
                security_level,
                allow_pipes,
                allow_redirects,
            },
        )?),
        ResourceDecl::Repository {
            name,
            action,
            repo,
            key_url,
            key_id,
            key_server,
            ppa,
            tap,
            filename,
            ensure,
        } => Box::new(Repository::new(
            name,
            action,
            RepositoryOptions {
                repo,
                key_url,
                key_id,
                key_server,
                ppa,
                tap,
                filename,
                ensure,
            },
        )?),
    })
}

/// Parse an octal mode string like "0644" or "0o755".
fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).with_context(|| format!("invalid octal mode '{mode}'"))
}
