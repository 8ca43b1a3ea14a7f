//! Version snapshots: the full post-image of a task after each mutation,
//! numbered 1..N per task, and field-level diffs between two versions.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use foreman_core::time::now_iso;
use foreman_core::types::{Task, TaskVersion, VersionDiffEntry};
use foreman_core::EngineError;

use crate::rows::version_from_row;

/// Version-log repository.
pub struct VersionRepo;

impl VersionRepo {
    /// Snapshot `task` as the next version. Must run on the same
    /// transaction as the mutation it records.
    pub fn append(conn: &Connection, task: &Task) -> Result<i64, EngineError> {
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM task_versions WHERE task_id = ?1",
            params![task.id],
            |row| row.get(0),
        )?;
        let payload = serde_json::to_string(&task.snapshot())
            .map_err(|e| EngineError::Fatal(format!("snapshot serialization failed: {e}")))?;
        conn.execute(
            "INSERT INTO task_versions (task_id, version_number, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![task.id, next, payload, now_iso()],
        )?;
        Ok(next)
    }

    /// All versions of a task, newest first.
    pub fn list(conn: &Connection, task_id: i64) -> Result<Vec<TaskVersion>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM task_versions WHERE task_id = ?1 ORDER BY version_number DESC",
        )?;
        let rows = stmt.query_map(params![task_id], version_from_row)?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    /// Fetch a specific version.
    pub fn get(
        conn: &Connection,
        task_id: i64,
        version_number: i64,
    ) -> Result<Option<TaskVersion>, EngineError> {
        let version = conn
            .query_row(
                "SELECT * FROM task_versions WHERE task_id = ?1 AND version_number = ?2",
                params![task_id, version_number],
                version_from_row,
            )
            .optional()?;
        Ok(version)
    }

    /// The most recent version, if any.
    pub fn latest(conn: &Connection, task_id: i64) -> Result<Option<TaskVersion>, EngineError> {
        let version = conn
            .query_row(
                "SELECT * FROM task_versions WHERE task_id = ?1
                 ORDER BY version_number DESC LIMIT 1",
                params![task_id],
                version_from_row,
            )
            .optional()?;
        Ok(version)
    }

    /// Number of versions recorded for a task.
    pub fn count(conn: &Connection, task_id: i64) -> Result<i64, EngineError> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM task_versions WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Field-level diff between two versions. Requires `v2 > v1`; both must
    /// exist.
    pub fn diff(
        conn: &Connection,
        task_id: i64,
        v1: i64,
        v2: i64,
    ) -> Result<Vec<VersionDiffEntry>, EngineError> {
        if v2 <= v1 {
            return Err(EngineError::Validation(format!(
                "version_number_2 ({v2}) must be greater than version_number_1 ({v1})"
            )));
        }
        let older = Self::get(conn, task_id, v1)?.ok_or(EngineError::NotFound {
            entity: "TaskVersion",
            id: format!("{task_id}/v{v1}"),
        })?;
        let newer = Self::get(conn, task_id, v2)?.ok_or(EngineError::NotFound {
            entity: "TaskVersion",
            id: format!("{task_id}/v{v2}"),
        })?;

        Ok(diff_payloads(&older.payload, &newer.payload))
    }
}

/// Compare two snapshots over the versioned field list.
pub fn diff_payloads(older: &Value, newer: &Value) -> Vec<VersionDiffEntry> {
    let mut entries = Vec::new();
    for field in Task::VERSIONED_FIELDS {
        let old_value = older.get(*field).cloned().unwrap_or(Value::Null);
        let new_value = newer.get(*field).cloned().unwrap_or(Value::Null);
        if old_value != new_value {
            entries.push(VersionDiffEntry {
                field: (*field).to_string(),
                v1_value: old_value,
                v2_value: new_value,
            });
        }
    }
    entries
}
