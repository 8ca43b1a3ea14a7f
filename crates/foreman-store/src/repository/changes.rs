//! Append-only audit trail.

use rusqlite::{params, Connection};

use foreman_core::time::now_iso;
use foreman_core::types::{ChangeEntry, ChangeType};
use foreman_core::EngineError;

use crate::rows::change_from_row;

/// One pending audit row: `(field_name, old_value, new_value)`.
pub type FieldChange = (String, Option<String>, Option<String>);

/// Change-history repository.
pub struct ChangeRepo;

impl ChangeRepo {
    /// Append one entry per changed field, in field order, all stamped with
    /// the same timestamp. Must run on the same transaction as the mutation
    /// it records.
    pub fn append_all(
        conn: &Connection,
        task_id: i64,
        agent_id: &str,
        change_type: ChangeType,
        changes: &[FieldChange],
    ) -> Result<(), EngineError> {
        let now = now_iso();
        let mut stmt = conn.prepare(
            "INSERT INTO change_history (task_id, agent_id, change_type, field_name,
             old_value, new_value, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (field, old, new) in changes {
            stmt.execute(params![
                task_id,
                agent_id,
                change_type.as_sql(),
                field,
                old,
                new,
                now
            ])?;
        }
        Ok(())
    }

    /// Entries for a task, oldest first (total order by id).
    pub fn for_task(
        conn: &Connection,
        task_id: i64,
        limit: u32,
    ) -> Result<Vec<ChangeEntry>, EngineError> {
        let mut stmt = conn
            .prepare("SELECT * FROM change_history WHERE task_id = ?1 ORDER BY id ASC LIMIT ?2")?;
        let rows = stmt.query_map(params![task_id, limit], change_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Most recent entries for a task, newest first.
    pub fn recent_for_task(
        conn: &Connection,
        task_id: i64,
        limit: u32,
    ) -> Result<Vec<ChangeEntry>, EngineError> {
        let mut stmt = conn
            .prepare("SELECT * FROM change_history WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2")?;
        let rows = stmt.query_map(params![task_id, limit], change_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Filtered scan by task, agent, and time range, ordered
    /// `(created_at, id)` ascending.
    pub fn query(
        conn: &Connection,
        task_id: Option<i64>,
        agent_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ChangeEntry>, EngineError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(tid) = task_id {
            conditions.push("task_id = ?".to_string());
            values.push(Box::new(tid));
        }
        if let Some(agent) = agent_id {
            conditions.push("agent_id = ?".to_string());
            values.push(Box::new(agent.to_string()));
        }
        if let Some(start) = start {
            conditions.push("created_at >= ?".to_string());
            values.push(Box::new(start.to_string()));
        }
        if let Some(end) = end {
            conditions.push("created_at <= ?".to_string());
            values.push(Box::new(end.to_string()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM change_history {where_clause} ORDER BY created_at ASC, id ASC LIMIT ?"
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), change_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Total entries recorded for a task.
    pub fn count_for_task(conn: &Connection, task_id: i64) -> Result<i64, EngineError> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM change_history WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
