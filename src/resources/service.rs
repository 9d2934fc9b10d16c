//! Service resource - manage system services.
//!
//! systemd on Linux, launchctl on macOS. Other systems are treated as
//! "unknown but present". Reload/restart trigger lists are normalized to
//! resource ids at construction; the executor fires them after the resource
//! pass, restart taking precedence over reload.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

use crate::platform::Platform;
use crate::resource::{Plan, Resource, StateMap, TriggerKind, Triggers};
use crate::transport::{NullTransport, Transport, run_checked};

/// Service resource.
///
/// ```ignore
/// Service::new("nginx").running(true).enabled(true)
/// Service::new("nginx").running(true).reload_on(["file:/etc/nginx/nginx.conf"])
/// ```
pub struct Service {
    name: String,
    running: Option<bool>,
    enabled: Option<bool>,
    triggers: Triggers,
    transport: Arc<dyn Transport>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: None,
            enabled: None,
            triggers: Triggers::default(),
            transport: Arc::new(NullTransport),
        }
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Reload when any of these resource ids change.
    pub fn reload_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.triggers.reload_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Restart when any of these resource ids change. Takes precedence over
    /// `reload_on` when both match.
    pub fn restart_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.triggers.restart_on = ids.into_iter().map(Into::into).collect();
        self
    }

    fn is_running(&self, platform: &Platform) -> bool {
        if platform.is_linux() {
            matches!(
                self.transport
                    .run_command(&["systemctl", "is-active", &self.name]),
                Ok((_, 0))
            )
        } else if platform.is_macos() {
            let label = format!("com.{}", self.name);
            matches!(
                self.transport.run_command(&["launchctl", "list", &label]),
                Ok((_, 0))
            )
        } else {
            false
        }
    }

    fn is_enabled(&self, platform: &Platform) -> bool {
        if platform.is_linux() {
            matches!(
                self.transport
                    .run_command(&["systemctl", "is-enabled", &self.name]),
                Ok((_, 0))
            )
        } else {
            // launchctl has no direct is-enabled query.
            platform.is_macos()
        }
    }

    fn start(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "start", &self.name],
                &format!("failed to start {}", self.id()),
            )?;
        } else if platform.is_macos() {
            run_checked(
                &*self.transport,
                &["launchctl", "start", &self.name],
                &format!("failed to start {}", self.id()),
            )?;
        }
        Ok(())
    }

    fn stop(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "stop", &self.name],
                &format!("failed to stop {}", self.id()),
            )?;
        } else if platform.is_macos() {
            run_checked(
                &*self.transport,
                &["launchctl", "stop", &self.name],
                &format!("failed to stop {}", self.id()),
            )?;
        }
        Ok(())
    }

    fn enable(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "enable", &self.name],
                &format!("failed to enable {}", self.id()),
            )?;
        }
        // macOS services are enabled by their presence in LaunchAgents.
        Ok(())
    }

    fn disable(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "disable", &self.name],
                &format!("failed to disable {}", self.id()),
            )?;
        }
        Ok(())
    }

    /// Reload configuration without dropping connections.
    pub fn reload(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "reload", &self.name],
                &format!("failed to reload {}", self.id()),
            )?;
        }
        Ok(())
    }

    /// Full restart.
    pub fn restart(&self, platform: &Platform) -> Result<()> {
        if platform.is_linux() {
            run_checked(
                &*self.transport,
                &["systemctl", "restart", &self.name],
                &format!("failed to restart {}", self.id()),
            )?;
        } else if platform.is_macos() {
            // Stop may fail if not running; the start result is what counts.
            let _ = self.transport.run_command(&["launchctl", "stop", &self.name]);
            run_checked(
                &*self.transport,
                &["launchctl", "start", &self.name],
                &format!("failed to restart {}", self.id()),
            )?;
        }
        Ok(())
    }
}

impl Resource for Service {
    fn resource_type(&self) -> &'static str {
        "svc"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, platform: &Platform) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));
        state.insert("running".to_string(), json!(self.is_running(platform)));
        state.insert("enabled".to_string(), json!(self.is_enabled(platform)));
        Ok(state)
    }

    fn desired_state(&self) -> Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("exists".to_string(), json!(true));
        if let Some(running) = self.running {
            state.insert("running".to_string(), json!(running));
        }
        if let Some(enabled) = self.enabled {
            state.insert("enabled".to_string(), json!(enabled));
        }
        Ok(state)
    }

    fn apply(&self, plan: &Plan, platform: &Platform) -> Result<()> {
        for change in &plan.changes {
            match (change.field.as_str(), change.to.as_bool()) {
                ("running", Some(true)) => self.start(platform)?,
                ("running", Some(false)) => self.stop(platform)?,
                ("enabled", Some(true)) => self.enable(platform)?,
                ("enabled", Some(false)) => self.disable(platform)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn bind_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = transport;
    }

    fn triggers(&self) -> Option<&Triggers> {
        Some(&self.triggers)
    }

    fn fire_trigger(&self, kind: TriggerKind, platform: &Platform) -> Result<()> {
        match kind {
            TriggerKind::Reload => self.reload(platform),
            TriggerKind::Restart => self.restart(platform),
        }
    }
}
