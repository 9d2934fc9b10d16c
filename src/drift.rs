//! Drift detection.
//!
//! Compares the actual state recorded at the last apply against a fresh
//! check of the live system. Any divergence flips the stored record's
//! status to `drift` and is reported field-by-field; fixing is left to a
//! re-apply of the configuration.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::platform::Platform;
use crate::resource::{Resource, StateMap};
use crate::resources::{File, Package, Service};
use crate::state::{ResourceState, Status, Store};
use crate::transport::Transport;

/// One field that diverged.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub expected: Value,
    pub actual: Value,
}

/// Result of checking one stored resource.
#[derive(Debug, Clone)]
pub struct DriftResult {
    pub resource_id: String,
    pub drifted: bool,
    pub differences: BTreeMap<String, Difference>,
    pub checked_at: DateTime<Utc>,
}

/// Detects configuration drift for resources recorded in the state store.
pub struct DriftDetector {
    store: Store,
    transport: Arc<dyn Transport>,
    platform: Platform,
}

impl DriftDetector {
    pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
        let platform = Platform::detect(&*transport);
        Self {
            store,
            transport,
            platform,
        }
    }

    /// Check one stored resource. Returns `None` when the id is unknown or
    /// the type cannot be re-checked from its name alone.
    pub fn check_resource(&self, resource_id: &str) -> Result<Option<DriftResult>> {
        let Some(mut stored) = self.store.get_resource(resource_id)? else {
            return Ok(None);
        };
        let Some(resource) = self.minimal_resource(&stored) else {
            return Ok(None);
        };

        let current = resource.check(&self.platform)?;
        let differences = compare_states(&stored.actual_state, &current);
        let drifted = !differences.is_empty();

        if drifted {
            debug!(resource = %resource_id, ?differences, "drift detected");
            stored.status = Status::Drift;
            self.store.save_resource(&stored)?;
        }

        Ok(Some(DriftResult {
            resource_id: resource_id.to_string(),
            drifted,
            differences,
            checked_at: Utc::now(),
        }))
    }

    /// Check every stored resource.
    pub fn check_all(&self) -> Result<Vec<DriftResult>> {
        let mut results = Vec::new();
        for state in self.store.list_resources()? {
            if let Some(result) = self.check_resource(&state.id)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Rebuild a minimal resource from its stored identity - just enough for
    /// a check. Exec and repository resources carry no recheckable identity
    /// in their name, so they are skipped.
    fn minimal_resource(&self, state: &ResourceState) -> Option<Box<dyn Resource>> {
        let name = state
            .id
            .strip_prefix(&format!("{}:", state.resource_type))?
            .to_string();

        let mut resource: Box<dyn Resource> = match state.resource_type.as_str() {
            "file" => Box::new(File::new(name)),
            "pkg" => Box::new(Package::new(name)),
            "svc" => Box::new(Service::new(name)),
            _ => return None,
        };
        resource.bind_transport(self.transport.clone());
        Some(resource)
    }
}

/// Field-by-field comparison of the stored snapshot against a fresh check.
/// `exists` is skipped; null matches absent.
fn compare_states(stored: &StateMap, current: &StateMap) -> BTreeMap<String, Difference> {
    let mut differences = BTreeMap::new();
    for (key, stored_value) in stored {
        if key == "exists" {
            continue;
        }
        let current_value = current.get(key).cloned().unwrap_or(Value::Null);
        if stored_value.is_null() && current_value.is_null() {
            continue;
        }
        if *stored_value != current_value {
            differences.insert(
                key.clone(),
                Difference {
                    expected: stored_value.clone(),
                    actual: current_value,
                },
            );
        }
    }
    differences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn stored_file_state(content: &str) -> ResourceState {
        let mut actual = StateMap::new();
        actual.insert("exists".to_string(), json!(true));
        actual.insert("type".to_string(), json!("file"));
        actual.insert("content".to_string(), json!(content));
        actual.insert("mode".to_string(), json!("0o644"));
        actual.insert("owner".to_string(), json!("root"));
        actual.insert("group".to_string(), json!("root"));
        actual.insert("size".to_string(), json!(content.len()));

        ResourceState {
            id: "file:/tmp/seed-f.txt".to_string(),
            resource_type: "file".to_string(),
            desired_state: actual.clone(),
            actual_state: actual,
            applied_at: Utc::now(),
            applied_by: "admin".to_string(),
            hostname: "web-1".to_string(),
            config_file: "site.json".to_string(),
            status: Status::Success,
        }
    }

    fn detector_with(
        state: ResourceState,
        transport: Arc<MemoryTransport>,
    ) -> (tempfile::TempDir, DriftDetector) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("state.db")).unwrap();
        store.save_resource(&state).unwrap();
        transport.respond("uname", "Linux\n", 0);
        (dir, DriftDetector::new(store, transport))
    }

    #[test]
    fn externally_edited_file_is_reported_as_drift() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/tmp/seed-f.txt", "two");
        transport.respond("stat -c", "regular file|644|3|root|root\n", 0);

        let (_dir, detector) = detector_with(stored_file_state("one"), transport);
        let result = detector.check_resource("file:/tmp/seed-f.txt").unwrap().unwrap();

        assert!(result.drifted);
        assert_eq!(result.differences.len(), 1);
        let diff = &result.differences["content"];
        assert_eq!(diff.expected, json!("one"));
        assert_eq!(diff.actual, json!("two"));
    }

    #[test]
    fn drift_flips_stored_status() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/tmp/seed-f.txt", "two");
        transport.respond("stat -c", "regular file|644|3|root|root\n", 0);

        let (_dir, detector) = detector_with(stored_file_state("one"), transport);
        detector.check_resource("file:/tmp/seed-f.txt").unwrap();

        let drifted = detector.store.list_drifted().unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].id, "file:/tmp/seed-f.txt");
    }

    #[test]
    fn unchanged_file_reports_no_drift() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_file("/tmp/seed-f.txt", "one");
        transport.respond("stat -c", "regular file|644|3|root|root\n", 0);

        let (_dir, detector) = detector_with(stored_file_state("one"), transport);
        let result = detector.check_resource("file:/tmp/seed-f.txt").unwrap().unwrap();

        assert!(!result.drifted);
        assert!(result.differences.is_empty());
    }

    #[test]
    fn unknown_resource_returns_none() {
        let transport = Arc::new(MemoryTransport::new());
        let (_dir, detector) = detector_with(stored_file_state("one"), transport);
        assert!(detector.check_resource("file:/other").unwrap().is_none());
    }

    #[test]
    fn exec_resources_are_skipped() {
        let transport = Arc::new(MemoryTransport::new());
        let mut state = stored_file_state("one");
        state.id = "exec:deploy".to_string();
        state.resource_type = "exec".to_string();

        let (_dir, detector) = detector_with(state, transport);
        assert!(detector.check_resource("exec:deploy").unwrap().is_none());
    }

    #[test]
    fn compare_reports_exactly_the_differing_fields() {
        let mut stored = StateMap::new();
        stored.insert("exists".to_string(), json!(true));
        stored.insert("mode".to_string(), json!("0o644"));
        stored.insert("owner".to_string(), json!("root"));

        let mut current = StateMap::new();
        current.insert("exists".to_string(), json!(false));
        current.insert("mode".to_string(), json!("0o600"));
        current.insert("owner".to_string(), json!("root"));

        let differences = compare_states(&stored, &current);
        assert_eq!(differences.len(), 1);
        assert!(differences.contains_key("mode"));
    }
}
