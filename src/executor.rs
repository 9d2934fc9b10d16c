//! Executor - owns the ordered resource list and drives plan/apply.
//!
//! Resources run strictly in registration order, single-threaded. One
//! resource's failure is collected and the pass continues; nothing is
//! transactional. After the resource pass an apply walks service triggers
//! (restart beats reload, at most one trigger per service), then optionally
//! persists state and history.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::output::Output;
use crate::platform::Platform;
use crate::resource::{Plan, PlannedState, Resource, StateMap, TriggerKind, plan_resource};
use crate::state::{HistoryEntry, ResourceState, Status, Store};
use crate::transport::Transport;

/// One resource's failure, tagged with what was being attempted.
#[derive(Debug)]
pub struct ResourceError {
    pub resource_id: String,
    pub operation: &'static str,
    pub error: anyhow::Error,
}

impl ResourceError {
    fn new(resource_id: impl Into<String>, operation: &'static str, error: anyhow::Error) -> Self {
        Self {
            resource_id: resource_id.into(),
            operation,
            error,
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed: {:#}",
            self.resource_id, self.operation, self.error
        )
    }
}

/// Result of the planning phase. Plans are stored in registration order.
#[derive(Debug, Default)]
pub struct PlanResult {
    entries: Vec<(String, Plan)>,
    pub errors: Vec<ResourceError>,
}

impl PlanResult {
    pub fn get(&self, resource_id: &str) -> Option<&Plan> {
        self.entries
            .iter()
            .find(|(id, _)| id == resource_id)
            .map(|(_, plan)| plan)
    }

    /// Plans in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Plan)> {
        self.entries.iter().map(|(id, plan)| (id.as_str(), plan))
    }

    /// Count of resources with changes.
    pub fn change_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, plan)| plan.has_changes())
            .count()
    }

    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of the apply phase.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Ids of resources that changed, in registration order.
    pub changed: Vec<String>,
    pub errors: Vec<ResourceError>,
    pub duration: Duration,
}

impl ApplyResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Snapshot {
    desired: StateMap,
    actual: StateMap,
}

/// Resource executor implementing the plan/apply workflow.
///
/// ```ignore
/// let mut executor = Executor::new(Arc::new(LocalTransport::new()));
/// executor.add(Box::new(File::new("/etc/motd").content("hi\n")));
/// let plan = executor.plan();
/// let result = executor.apply(&plan);
/// ```
pub struct Executor {
    transport: Arc<dyn Transport>,
    platform: Platform,
    resources: Vec<Box<dyn Resource>>,
    config_file: Option<String>,
    state_tracking: bool,
    state_path: Option<PathBuf>,
    snapshots: BTreeMap<String, Snapshot>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Executor {
    /// Create an executor, probing the platform through the transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let platform = Platform::detect(&*transport);
        Self::with_platform(transport, platform)
    }

    /// Create an executor with a known platform (skips the probe).
    pub fn with_platform(transport: Arc<dyn Transport>, platform: Platform) -> Self {
        Self {
            transport,
            platform,
            resources: Vec::new(),
            config_file: None,
            state_tracking: false,
            state_path: None,
            snapshots: BTreeMap::new(),
            interrupt: None,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn set_config_file(&mut self, config_file: impl Into<String>) {
        self.config_file = Some(config_file.into());
    }

    /// Persist resource state and history after apply.
    pub fn enable_state_tracking(&mut self) {
        self.state_tracking = true;
    }

    /// Override the state-store location (used by tests and tools).
    pub fn set_state_path(&mut self, path: impl Into<PathBuf>) {
        self.state_path = Some(path.into());
    }

    /// Abort between resources when this flag is raised.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    /// Register a resource: bind the executor's transport, then upsert by id.
    ///
    /// An existing id is replaced in place, keeping its position in
    /// declaration order, so multi-phase configurations can refine a
    /// resource (last writer wins).
    pub fn add(&mut self, mut resource: Box<dyn Resource>) -> String {
        resource.bind_transport(self.transport.clone());
        let id = resource.id();
        match self.resources.iter().position(|r| r.id() == id) {
            Some(position) => self.resources[position] = resource,
            None => self.resources.push(resource),
        }
        id
    }

    pub fn get(&self, resource_id: &str) -> Option<&dyn Resource> {
        self.resources
            .iter()
            .find(|r| r.id() == resource_id)
            .map(|r| r.as_ref())
    }

    /// Registered ids in declaration order.
    pub fn ids(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Generate plans for every resource in declaration order. A resource's
    /// failure becomes a planning error and does not abort the pass.
    pub fn plan(&mut self) -> PlanResult {
        let mut result = PlanResult::default();
        for resource in &self.resources {
            let id = resource.id();
            match plan_resource(resource.as_ref(), &self.platform) {
                Ok(PlannedState {
                    plan,
                    actual,
                    desired,
                }) => {
                    self.snapshots.insert(id.clone(), Snapshot { desired, actual });
                    result.entries.push((id, plan));
                }
                Err(error) => result.errors.push(ResourceError::new(id, "plan", error)),
            }
        }
        result
    }

    /// Apply every changed resource in declaration order, then fire service
    /// triggers, then persist state when tracking is enabled.
    pub fn apply(&mut self, plan_result: &PlanResult) -> ApplyResult {
        let mut result = ApplyResult::default();
        let mut failed: BTreeSet<String> = BTreeSet::new();
        let started = Instant::now();

        for resource in &self.resources {
            if let Some(flag) = &self.interrupt {
                if flag.load(Ordering::SeqCst) {
                    info!("interrupted; stopping before the next resource");
                    break;
                }
            }

            let id = resource.id();
            let Some(plan) = plan_result.get(&id) else {
                continue;
            };
            if !plan.has_changes() {
                continue;
            }

            match resource.apply(plan, &self.platform) {
                Ok(()) => {
                    result.changed.push(id.clone());
                    // Refresh the snapshot so persistence records the state
                    // the apply produced.
                    match resource.check(&self.platform) {
                        Ok(actual) => {
                            if let Some(snapshot) = self.snapshots.get_mut(&id) {
                                snapshot.actual = actual;
                            }
                        }
                        Err(error) => {
                            warn!(resource = %id, error = %error, "post-apply check failed");
                        }
                    }
                }
                Err(error) => {
                    failed.insert(id.clone());
                    result.errors.push(ResourceError::new(id, "apply", error));
                }
            }
        }

        result.duration = started.elapsed();

        if !result.changed.is_empty() {
            self.fire_triggers(&result.changed, &mut result.errors);
        }

        if self.state_tracking {
            if let Err(error) = self.persist(plan_result, &result.changed, &failed) {
                // Persistence failures never roll back the apply.
                warn!(error = %error, "failed to persist state");
            }
        }

        result
    }

    /// Walk services whose trigger lists intersect the changed set. Restart
    /// takes precedence over reload; each service is triggered at most once.
    fn fire_triggers(&self, changed: &[String], errors: &mut Vec<ResourceError>) {
        for resource in &self.resources {
            let Some(triggers) = resource.triggers() else {
                continue;
            };
            let id = resource.id();

            if triggers.should_restart(changed) {
                Output::step(format!("↻ {id} restarted"));
                if let Err(error) = resource.fire_trigger(TriggerKind::Restart, &self.platform) {
                    errors.push(ResourceError::new(id, "restart", error));
                }
            } else if triggers.should_reload(changed) {
                Output::step(format!("⟳ {id} reloaded"));
                if let Err(error) = resource.fire_trigger(TriggerKind::Reload, &self.platform) {
                    errors.push(ResourceError::new(id, "reload", error));
                }
            }
        }
    }

    fn open_store(&self) -> Result<Store> {
        match &self.state_path {
            Some(path) => Store::open(path),
            None => Store::open_default(),
        }
    }

    fn persist(
        &self,
        plan_result: &PlanResult,
        changed: &[String],
        failed: &BTreeSet<String>,
    ) -> Result<()> {
        let store = self.open_store()?;
        let user = whoami::username();
        let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
        let timestamp = Utc::now();

        for resource in &self.resources {
            let id = resource.id();
            let Some(plan) = plan_result.get(&id) else {
                continue;
            };
            let Some(snapshot) = self.snapshots.get(&id) else {
                continue;
            };

            let status = if failed.contains(&id) {
                Status::Failed
            } else if changed.contains(&id) {
                Status::Success
            } else {
                Status::Unchanged
            };

            store.save_resource(&ResourceState {
                id: id.clone(),
                resource_type: resource.resource_type().to_string(),
                desired_state: snapshot.desired.clone(),
                actual_state: snapshot.actual.clone(),
                applied_at: timestamp,
                applied_by: user.clone(),
                hostname: hostname.clone(),
                config_file: self
                    .config_file
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                status,
            })?;

            if changed.contains(&id) {
                let changes: serde_json::Map<String, serde_json::Value> = plan
                    .changes
                    .iter()
                    .map(|change| {
                        (
                            change.field.clone(),
                            json!({ "from": change.from, "to": change.to }),
                        )
                    })
                    .collect();

                store.add_history(&HistoryEntry {
                    timestamp,
                    resource_id: id.clone(),
                    action: plan.action.as_str().to_string(),
                    user: user.clone(),
                    hostname: hostname.clone(),
                    success: true,
                    changes: serde_json::Value::Object(changes),
                    error: None,
                })?;
            }
        }
        Ok(())
    }

    /// Close the transport. Resources keep their clones, but the run is over.
    pub fn close(&self) -> Result<()> {
        self.transport.close()
    }
}
