//! SQLite-backed state store.
//!
//! Two tables: `resources` is upsert-by-id and holds the last known state of
//! each managed resource; `history` is append-only. State blobs are
//! serialized as canonical JSON (key-ordered maps), so the drift detector
//! can compare them structurally.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

use crate::resource::StateMap;

/// Outcome recorded for a resource after an apply or drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
    Drift,
    Unchanged,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Drift => "drift",
            Status::Unchanged => "unchanged",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "success" => Status::Success,
            "failed" => Status::Failed,
            "drift" => Status::Drift,
            _ => Status::Unchanged,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted state of one managed resource.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    pub desired_state: StateMap,
    pub actual_state: StateMap,
    pub applied_at: DateTime<Utc>,
    pub applied_by: String,
    pub hostname: String,
    pub config_file: String,
    pub status: Status,
}

/// One recorded change.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub resource_id: String,
    pub action: String,
    pub user: String,
    pub hostname: String,
    pub success: bool,
    /// `{field: {from, to}}` map.
    pub changes: serde_json::Value,
    pub error: Option<String>,
}

/// SQLite-backed state store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating directory and schema as needed) at an explicit path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open state store at {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open at the default location under the user's home directory.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path())
    }

    /// `~/.tend/state.db`. Respects `$HOME` for test isolation.
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".tend").join("state.db")
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS resources (
                    id TEXT PRIMARY KEY,
                    type TEXT NOT NULL,
                    desired_state TEXT NOT NULL,
                    actual_state TEXT NOT NULL,
                    applied_at TEXT NOT NULL,
                    applied_by TEXT NOT NULL,
                    hostname TEXT NOT NULL,
                    config_file TEXT NOT NULL,
                    status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    user TEXT NOT NULL,
                    hostname TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    changes TEXT NOT NULL,
                    error TEXT,
                    FOREIGN KEY (resource_id) REFERENCES resources(id)
                );

                CREATE INDEX IF NOT EXISTS idx_history_resource
                    ON history(resource_id);
                CREATE INDEX IF NOT EXISTS idx_history_timestamp
                    ON history(timestamp DESC);",
            )
            .context("failed to initialize state schema")
    }

    /// Insert or replace a resource's state.
    pub fn save_resource(&self, state: &ResourceState) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO resources
                 (id, type, desired_state, actual_state, applied_at, applied_by,
                  hostname, config_file, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    state.id,
                    state.resource_type,
                    serde_json::to_string(&state.desired_state)?,
                    serde_json::to_string(&state.actual_state)?,
                    state.applied_at.to_rfc3339(),
                    state.applied_by,
                    state.hostname,
                    state.config_file,
                    state.status.as_str(),
                ],
            )
            .context("failed to save resource state")?;
        Ok(())
    }

    pub fn get_resource(&self, resource_id: &str) -> Result<Option<ResourceState>> {
        self.conn
            .query_row(
                "SELECT id, type, desired_state, actual_state, applied_at, applied_by,
                        hostname, config_file, status
                 FROM resources WHERE id = ?1",
                params![resource_id],
                row_to_state,
            )
            .optional()
            .context("failed to fetch resource state")
    }

    /// All managed resources, most recently applied first.
    pub fn list_resources(&self) -> Result<Vec<ResourceState>> {
        let mut statement = self.conn.prepare(
            "SELECT id, type, desired_state, actual_state, applied_at, applied_by,
                    hostname, config_file, status
             FROM resources ORDER BY applied_at DESC",
        )?;
        let rows = statement.query_map([], row_to_state)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list resources")
    }

    /// Resources whose last recorded status is drift.
    pub fn list_drifted(&self) -> Result<Vec<ResourceState>> {
        let mut statement = self.conn.prepare(
            "SELECT id, type, desired_state, actual_state, applied_at, applied_by,
                    hostname, config_file, status
             FROM resources WHERE status = 'drift' ORDER BY applied_at DESC",
        )?;
        let rows = statement.query_map([], row_to_state)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list drifted resources")
    }

    /// Append a history entry. History is never updated or deleted.
    pub fn add_history(&self, entry: &HistoryEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO history
                 (timestamp, resource_id, action, user, hostname, success, changes, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.timestamp.to_rfc3339(),
                    entry.resource_id,
                    entry.action,
                    entry.user,
                    entry.hostname,
                    entry.success as i64,
                    serde_json::to_string(&entry.changes)?,
                    entry.error,
                ],
            )
            .context("failed to append history")?;
        Ok(())
    }

    /// Most recent history for a resource, newest first.
    pub fn get_history(&self, resource_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut statement = self.conn.prepare(
            "SELECT timestamp, resource_id, action, user, hostname, success, changes, error
             FROM history WHERE resource_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = statement.query_map(params![resource_id, limit as i64], |row| {
            let timestamp: String = row.get(0)?;
            let changes: String = row.get(6)?;
            Ok(HistoryEntry {
                timestamp: parse_timestamp(&timestamp),
                resource_id: row.get(1)?,
                action: row.get(2)?,
                user: row.get(3)?,
                hostname: row.get(4)?,
                success: row.get::<_, i64>(5)? != 0,
                changes: serde_json::from_str(&changes).unwrap_or(serde_json::Value::Null),
                error: row.get(7)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to fetch history")
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, error)| error)
            .context("failed to close state store")
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<ResourceState> {
    let desired: String = row.get(2)?;
    let actual: String = row.get(3)?;
    let applied_at: String = row.get(4)?;
    let status: String = row.get(8)?;
    Ok(ResourceState {
        id: row.get(0)?,
        resource_type: row.get(1)?,
        desired_state: serde_json::from_str(&desired).unwrap_or_default(),
        actual_state: serde_json::from_str(&actual).unwrap_or_default(),
        applied_at: parse_timestamp(&applied_at),
        applied_by: row.get(5)?,
        hostname: row.get(6)?,
        config_file: row.get(7)?,
        status: Status::parse(&status),
    })
}
