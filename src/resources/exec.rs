//! Exec resource - run arbitrary commands with idempotence guards.
//!
//! Guards make execution idempotent: `creates` skips when a path exists,
//! `unless` skips when a probe succeeds, `only_if` runs only when a probe
//! succeeds. Every command line is screened at construction time (see
//! [`crate::security`]); in strict mode a finding aborts the load before the
//! resource can register.

use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::TendError;
use crate::output::Output;
use crate::platform::Platform;
use crate::resource::{Plan, Resource, StateMap};
use crate::security::{self, SecurityLevel};
use crate::transport::{NullTransport, Transport};

/// Options for an [`Exec`] resource. Most call sites only set a guard or two.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Skip when this path exists.
    pub creates: Option<String>,
    /// Skip when this probe command succeeds.
    pub unless: Option<String>,
    /// Run only when this probe command succeeds.
    pub only_if: Option<String>,
    pub cwd: Option<String>,
    pub environment: BTreeMap<String, String>,
    /// Print the final command instead of running it.
    pub dry_run: bool,
    /// Forces strict screening. Disabling it is loudly warned about.
    pub safe_mode: bool,
    pub security_level: SecurityLevel,
    pub allow_pipes: bool,
    pub allow_redirects: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            creates: None,
            unless: None,
            only_if: None,
            cwd: None,
            environment: BTreeMap::new(),
            dry_run: false,
            safe_mode: true,
            security_level: SecurityLevel::Strict,
            allow_pipes: false,
            allow_redirects: false,
        }
    }
}

/// Exec resource.
///
/// ```ignore
/// Exec::new("setup-db", "mysql --batch /tmp/schema.sql", ExecOptions {
///     creates: Some("/var/lib/mysql/mydb".into()),
///     ..Default::default()
/// })?
/// ```
pub struct Exec {
    name: String,
    command: String,
    options: ExecOptions,
    transport: Arc<dyn Transport>,
}

impl Exec {
    /// Validate and construct. Security screening runs here, before the
    /// resource can be registered anywhere.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        options: ExecOptions,
    ) -> Result<Self> {
        let name = name.into();
        let command = command.into();

        let level = if options.safe_mode {
            SecurityLevel::Strict
        } else {
            warn!(
                resource = %name,
                "exec safe mode is disabled; command screening is downgraded"
            );
            options.security_level
        };

        let findings = Self::screen(&command, &options);
        if !findings.is_empty() {
            match level {
                SecurityLevel::Strict => {
                    return Err(TendError::SecurityViolation {
                        resource: name,
                        findings,
                    }
                    .into());
                }
                SecurityLevel::Warn => {
                    for finding in &findings {
                        warn!(resource = %name, finding = %finding, "exec security finding");
                    }
                }
                SecurityLevel::None => {}
            }
        }

        Ok(Self {
            name,
            command,
            options,
            transport: Arc::new(NullTransport),
        })
    }

    fn screen(command: &str, options: &ExecOptions) -> Vec<String> {
        let mut findings =
            security::screen_command(command, options.allow_pipes, options.allow_redirects);
        for guard in [&options.unless, &options.only_if].into_iter().flatten() {
            findings.extend(security::screen_command(
                guard,
                options.allow_pipes,
                options.allow_redirects,
            ));
        }
        if let Some(path) = &options.creates {
            findings.extend(security::screen_path("creates", path));
        }
        if let Some(path) = &options.cwd {
            findings.extend(security::screen_path("cwd", path));
        }
        findings.extend(security::screen_environment(&options.environment));
        findings
    }

    fn command_hash(&self) -> String {
        let digest = Sha256::digest(self.command.as_bytes());
        hex::encode(digest)[..8].to_string()
    }

    /// The line handed to the transport: env assignments, then a `cd` for the
    /// working directory, then the command itself.
    fn final_command(&self) -> Result<String> {
        let mut line = String::new();
        for (key, value) in &self.options.environment {
            let quoted = shlex::try_quote(value)
                .with_context(|| format!("cannot quote value of {key}"))?;
            line.push_str(&format!("{key}={quoted} "));
        }
        if let Some(cwd) = &self.options.cwd {
            let quoted = shlex::try_quote(cwd).context("cannot quote working directory")?;
            line.push_str(&format!("cd {quoted} && "));
        }
        line.push_str(&self.command);
        Ok(line)
    }

    fn should_run(&self) -> Result<bool> {
        if let Some(creates) = &self.options.creates {
            if self.transport.file_exists(creates)? {
                return Ok(false);
            }
        }
        // Dry runs skip the runtime probes so preview has no side effects.
        if self.options.dry_run {
            return Ok(true);
        }
        if let Some(unless) = &self.options.unless {
            let (_, code) = self.transport.run_shell(unless)?;
            if code == 0 {
                return Ok(false);
            }
        }
        if let Some(only_if) = &self.options.only_if {
            let (_, code) = self.transport.run_shell(only_if)?;
            if code != 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for Exec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exec")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Resource for Exec {
    fn resource_type(&self) -> &'static str {
        "exec"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, _platform: &Platform) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));
        state.insert("should_run".to_string(), json!(self.should_run()?));
        state.insert("command_hash".to_string(), json!(self.command_hash()));
        Ok(state)
    }

    fn desired_state(&self) -> Result<StateMap> {
        // Desired is "nothing left to run": a guard-passing command shows up
        // as should_run true→false, which the planner renders as an update.
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));
        state.insert("should_run".to_string(), json!(false));
        state.insert("command_hash".to_string(), json!(self.command_hash()));
        Ok(state)
    }

    fn apply(&self, _plan: &Plan, _platform: &Platform) -> Result<()> {
        if !self.options.safe_mode {
            warn!(resource = %self.name, "executing with safe mode disabled");
        }
        let command = self.final_command()?;

        if self.options.dry_run {
            Output::dry_run(format!("would run: {command}"));
            return Ok(());
        }

        let (output, code) = self.transport.run_shell(&command)?;
        if code != 0 {
            return Err(TendError::CommandFailed {
                context: format!("exec '{}' failed", self.name),
                code,
                output,
            }
            .into());
        }
        Ok(())
    }

    fn bind_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = transport;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Action, plan_resource};
    use crate::transport::MemoryTransport;

    fn linux() -> Platform {
        Platform {
            system: "Linux".to_string(),
            distro: "ubuntu".to_string(),
            version: "24.04".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    fn with_transport(exec: Exec, transport: &Arc<MemoryTransport>) -> Exec {
        let mut exec = exec;
        exec.bind_transport(transport.clone());
        exec
    }

    #[test]
    fn dangerous_command_in_strict_mode_fails_construction() {
        let err = Exec::new("x", "echo a; rm -rf /", ExecOptions::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("security violation"));
        assert!(msg.contains("'x'"));
    }

    #[test]
    fn safe_mode_overrides_a_lax_level() {
        let options = ExecOptions {
            security_level: SecurityLevel::None,
            safe_mode: true,
            ..Default::default()
        };
        assert!(Exec::new("x", "rm -rf /", options).is_err());
    }

    #[test]
    fn warn_level_registers_despite_findings() {
        let options = ExecOptions {
            safe_mode: false,
            security_level: SecurityLevel::Warn,
            ..Default::default()
        };
        assert!(Exec::new("x", "echo a; echo b", options).is_ok());
    }

    #[test]
    fn guards_are_screened_too() {
        let options = ExecOptions {
            unless: Some("test -f /x; reboot".to_string()),
            ..Default::default()
        };
        assert!(Exec::new("x", "echo ok", options).is_err());
    }

    #[test]
    fn pipes_allowed_when_opted_in() {
        let options = ExecOptions {
            allow_pipes: true,
            ..Default::default()
        };
        assert!(Exec::new("count", "ps aux | wc -l", options).is_ok());
    }

    #[test]
    fn creates_guard_skips_when_path_exists() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/var/lib/mysql/mydb", "");
        let options = ExecOptions {
            creates: Some("/var/lib/mysql/mydb".to_string()),
            ..Default::default()
        };
        let exec = with_transport(Exec::new("setup-db", "true", options).unwrap(), &transport);

        let planned = plan_resource(&exec, &linux()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn guard_passing_command_plans_update() {
        let transport = Arc::new(MemoryTransport::new());
        let exec = with_transport(
            Exec::new("deploy", "/usr/local/bin/deploy", ExecOptions::default()).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        assert_eq!(planned.plan.action, Action::Update);
        assert!(
            planned
                .plan
                .changes
                .iter()
                .any(|c| c.field == "should_run")
        );
    }

    #[test]
    fn unless_guard_skips_when_probe_succeeds() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("which composer", "/usr/bin/composer", 0);
        let options = ExecOptions {
            unless: Some("which composer".to_string()),
            ..Default::default()
        };
        let exec = with_transport(
            Exec::new("install-composer", "php installer.php", options).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn only_if_guard_requires_probe_success() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("test -d /opt/app", "", 1);
        let options = ExecOptions {
            only_if: Some("test -d /opt/app".to_string()),
            ..Default::default()
        };
        let exec = with_transport(
            Exec::new("migrate", "/opt/app/migrate", options).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        assert_eq!(planned.plan.action, Action::None);
    }

    #[test]
    fn environment_and_cwd_are_quoted_into_the_line() {
        let transport = Arc::new(MemoryTransport::new());
        let mut environment = BTreeMap::new();
        environment.insert("RAILS_ENV".to_string(), "production mode".to_string());
        let options = ExecOptions {
            cwd: Some("/var/app releases".to_string()),
            environment,
            ..Default::default()
        };
        let exec = with_transport(
            Exec::new("migrate", "bundle-exec-migrate", options).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        exec.apply(&planned.plan, &linux()).unwrap();
        assert!(transport.ran(
            "RAILS_ENV='production mode' cd '/var/app releases' && bundle-exec-migrate"
        ));
    }

    #[test]
    fn dry_run_skips_execution_and_runtime_guards() {
        let transport = Arc::new(MemoryTransport::new());
        let options = ExecOptions {
            dry_run: true,
            unless: Some("probe-with-side-effects".to_string()),
            ..Default::default()
        };
        let exec = with_transport(
            Exec::new("deploy", "run-deploy", options).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        assert_eq!(planned.plan.action, Action::Update);
        exec.apply(&planned.plan, &linux()).unwrap();

        // Neither the probe nor the command itself ran.
        assert!(transport.commands().is_empty());
    }

    #[test]
    fn failed_command_surfaces_output() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond("run-deploy", "connection refused", 7);
        let exec = with_transport(
            Exec::new("deploy", "run-deploy", ExecOptions::default()).unwrap(),
            &transport,
        );

        let planned = plan_resource(&exec, &linux()).unwrap();
        let err = exec.apply(&planned.plan, &linux()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 7"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn command_hash_is_stable_and_short() {
        let a = Exec::new("a", "echo hello", ExecOptions::default()).unwrap();
        let b = Exec::new("b", "echo hello", ExecOptions::default()).unwrap();
        assert_eq!(a.command_hash(), b.command_hash());
        assert_eq!(a.command_hash().len(), 8);
    }
}
