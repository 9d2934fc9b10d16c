//! Resource model: the Check → Plan → Apply contract shared by every
//! resource type.
//!
//! A resource declares a desired state for one element of a host (a file, a
//! package, a service, ...). The engine inspects current state (`check`),
//! diffs it against the declaration (`plan_resource`), and carries out the
//! difference (`apply`). State on both sides is a map of well-known keys to
//! JSON values so comparison is structural and serialization is canonical.

use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::platform::Platform;
use crate::transport::Transport;

/// Attribute map describing desired or observed state.
///
/// `check` and `desired_state` for one resource type agree on the key set;
/// `exists` is always present.
pub type StateMap = BTreeMap<String, Value>;

/// What the engine decided to do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single attribute difference.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

impl Change {
    pub fn new(field: impl Into<String>, from: Value, to: Value) -> Self {
        Self {
            field: field.into(),
            from,
            to,
        }
    }
}

/// Render a state value for humans: `nil` for absent, JSON otherwise.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} → {}",
            self.field,
            display_value(&self.from),
            display_value(&self.to)
        )
    }
}

/// Execution plan for one resource: an action plus the ordered changes that
/// justify it. `action == None` iff `changes` is empty.
#[derive(Debug, Clone)]
pub struct Plan {
    pub action: Action,
    pub changes: Vec<Change>,
    pub reason: String,
}

impl Plan {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            action: Action::None,
            changes: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.action != Action::None && !self.changes.is_empty()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action == Action::None {
            return write!(f, "No changes");
        }
        writeln!(f, "Action: {}", self.action)?;
        if !self.reason.is_empty() {
            writeln!(f, "Reason: {}", self.reason)?;
        }
        for change in &self.changes {
            writeln!(f, "  {change}")?;
        }
        Ok(())
    }
}

/// Which trigger a service receives after dependent resources change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Reload,
    Restart,
}

/// Trigger subscriptions declared by service-shaped resources.
///
/// Lists hold resource ids; objects are reduced to ids at construction time.
#[derive(Debug, Clone, Default)]
pub struct Triggers {
    pub reload_on: Vec<String>,
    pub restart_on: Vec<String>,
}

impl Triggers {
    pub fn should_reload(&self, changed_ids: &[String]) -> bool {
        self.reload_on.iter().any(|id| changed_ids.contains(id))
    }

    pub fn should_restart(&self, changed_ids: &[String]) -> bool {
        self.restart_on.iter().any(|id| changed_ids.contains(id))
    }
}

/// The capability set every resource implements.
///
/// Code sharing happens through composition: the planning algorithm lives in
/// [`plan_resource`], not on the trait.
pub trait Resource {
    /// Short type tag: `file`, `pkg`, `svc`, `exec`, `repository`.
    fn resource_type(&self) -> &'static str;

    /// Primary identifier within the type (a path, a service name, ...).
    fn name(&self) -> &str;

    /// Globally unique id within one run: `type:name`.
    fn id(&self) -> String {
        format!("{}:{}", self.resource_type(), self.name())
    }

    /// Observe current state. Must not mutate the target.
    fn check(&self, platform: &Platform) -> Result<StateMap>;

    /// Desired state, deterministic from constructor inputs.
    fn desired_state(&self) -> Result<StateMap>;

    /// Carry out every mutation the plan implies.
    fn apply(&self, plan: &Plan, platform: &Platform) -> Result<()>;

    /// Called once by the executor at registration time.
    fn bind_transport(&mut self, transport: Arc<dyn Transport>);

    /// Reload/restart subscriptions, for service-shaped resources.
    fn triggers(&self) -> Option<&Triggers> {
        None
    }

    /// Fire a trigger. Only invoked when [`Resource::triggers`] returned
    /// subscriptions.
    fn fire_trigger(&self, kind: TriggerKind, platform: &Platform) -> Result<()> {
        let _ = (kind, platform);
        Ok(())
    }
}

/// A plan together with the state snapshots it was computed from.
#[derive(Debug, Clone)]
pub struct PlannedState {
    pub plan: Plan,
    pub actual: StateMap,
    pub desired: StateMap,
}

/// The shared planner: check, read the declaration, diff.
pub fn plan_resource(resource: &dyn Resource, platform: &Platform) -> Result<PlannedState> {
    let actual = resource.check(platform)?;
    let desired = resource.desired_state()?;
    let plan = diff_states(&actual, &desired);
    Ok(PlannedState {
        plan,
        actual,
        desired,
    })
}

/// Diff an observed state against a desired state.
pub fn diff_states(actual: &StateMap, desired: &StateMap) -> Plan {
    let exists = actual
        .get("exists")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let should_exist = desired
        .get("exists")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    match (exists, should_exist) {
        (false, true) => {
            let changes = desired
                .iter()
                .filter(|(key, _)| key.as_str() != "exists")
                .map(|(key, value)| Change::new(key.clone(), Value::Null, value.clone()))
                .collect();
            Plan {
                action: Action::Create,
                changes,
                reason: "resource does not exist".to_string(),
            }
        }
        (true, false) => {
            let changes = actual
                .iter()
                .filter(|(key, _)| key.as_str() != "exists")
                .map(|(key, value)| Change::new(key.clone(), value.clone(), Value::Null))
                .collect();
            Plan {
                action: Action::Delete,
                changes,
                reason: "resource should not exist".to_string(),
            }
        }
        (false, false) => Plan::none("resource correctly absent"),
        (true, true) => {
            let changes = detect_changes(actual, desired);
            if changes.is_empty() {
                Plan::none("no changes needed")
            } else {
                Plan {
                    action: Action::Update,
                    changes,
                    reason: "properties differ from desired state".to_string(),
                }
            }
        }
    }
}

/// Attribute-wise diff for a resource that exists and should exist.
///
/// Only keys in the desired state are considered; absent and null compare
/// equal on both sides.
fn detect_changes(actual: &StateMap, desired: &StateMap) -> Vec<Change> {
    let mut changes = Vec::new();
    for (key, desired_value) in desired {
        if key == "exists" {
            continue;
        }
        let actual_value = actual.get(key).cloned().unwrap_or(Value::Null);
        if actual_value.is_null() && desired_value.is_null() {
            continue;
        }
        if actual_value != *desired_value {
            changes.push(Change::new(key.clone(), actual_value, desired_value.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(pairs: &[(&str, Value)]) -> StateMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn missing_resource_plans_create_with_all_desired_attributes() {
        let actual = state(&[("exists", json!(false))]);
        let desired = state(&[
            ("exists", json!(true)),
            ("content", json!("hi\n")),
            ("mode", json!("0o644")),
        ]);

        let plan = diff_states(&actual, &desired);
        assert_eq!(plan.action, Action::Create);
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.from.is_null()));
        assert!(
            plan.changes
                .iter()
                .any(|c| c.field == "content" && c.to == json!("hi\n"))
        );
    }

    #[test]
    fn unwanted_resource_plans_delete_with_all_actual_attributes() {
        let actual = state(&[("exists", json!(true)), ("content", json!("old"))]);
        let desired = state(&[("exists", json!(false))]);

        let plan = diff_states(&actual, &desired);
        assert_eq!(plan.action, Action::Delete);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].field, "content");
        assert!(plan.changes[0].to.is_null());
    }

    #[test]
    fn correctly_absent_resource_plans_none() {
        let actual = state(&[("exists", json!(false))]);
        let desired = state(&[("exists", json!(false))]);

        let plan = diff_states(&actual, &desired);
        assert_eq!(plan.action, Action::None);
        assert!(plan.changes.is_empty());
        assert!(!plan.has_changes());
    }

    #[test]
    fn matching_states_plan_none() {
        let actual = state(&[("exists", json!(true)), ("content", json!("same"))]);
        let desired = state(&[("exists", json!(true)), ("content", json!("same"))]);

        assert_eq!(diff_states(&actual, &desired).action, Action::None);
    }

    #[test]
    fn differing_attribute_plans_update() {
        let actual = state(&[("exists", json!(true)), ("content", json!("one"))]);
        let desired = state(&[("exists", json!(true)), ("content", json!("two"))]);

        let plan = diff_states(&actual, &desired);
        assert_eq!(plan.action, Action::Update);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].from, json!("one"));
        assert_eq!(plan.changes[0].to, json!("two"));
    }

    #[test]
    fn null_on_both_sides_is_equal() {
        let actual = state(&[("exists", json!(true)), ("owner", Value::Null)]);
        let desired = state(&[("exists", json!(true)), ("owner", Value::Null)]);

        assert_eq!(diff_states(&actual, &desired).action, Action::None);
    }

    #[test]
    fn attribute_missing_from_actual_counts_as_null() {
        let actual = state(&[("exists", json!(true))]);
        let desired = state(&[("exists", json!(true)), ("version", json!("1.2"))]);

        let plan = diff_states(&actual, &desired);
        assert_eq!(plan.action, Action::Update);
        assert_eq!(plan.changes[0].from, Value::Null);
    }

    #[test]
    fn plan_none_iff_no_changes() {
        let plan = Plan::none("nothing to do");
        assert!(!plan.has_changes());

        let plan = Plan {
            action: Action::Update,
            changes: vec![Change::new("x", Value::Null, json!(1))],
            reason: String::new(),
        };
        assert!(plan.has_changes());
    }

    #[test]
    fn change_display_quotes_strings_and_shows_nil() {
        let change = Change::new("content", Value::Null, json!("hi\n"));
        assert_eq!(change.to_string(), "content: nil → \"hi\\n\"");
    }

    #[test]
    fn trigger_intersection() {
        let triggers = Triggers {
            reload_on: vec!["file:/etc/app.conf".to_string()],
            restart_on: vec!["pkg:app".to_string()],
        };
        let changed = vec!["file:/etc/app.conf".to_string()];
        assert!(triggers.should_reload(&changed));
        assert!(!triggers.should_restart(&changed));
    }
}
