//! Agent-authored narrative updates. Immutable once written.

use rusqlite::{params, Connection};

use foreman_core::time::now_iso;
use foreman_core::types::{TaskUpdate, UpdateType};
use foreman_core::EngineError;

use crate::rows::update_from_row;

/// Task-update repository.
pub struct UpdateRepo;

impl UpdateRepo {
    /// Append an update.
    pub fn insert(
        conn: &Connection,
        task_id: i64,
        agent_id: &str,
        update_type: UpdateType,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<TaskUpdate, EngineError> {
        let now = now_iso();
        let metadata_json = metadata.map(serde_json::Value::to_string);
        conn.execute(
            "INSERT INTO task_updates (task_id, agent_id, update_type, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task_id,
                agent_id,
                update_type.as_sql(),
                content,
                metadata_json,
                now
            ],
        )?;
        Ok(TaskUpdate {
            id: conn.last_insert_rowid(),
            task_id,
            agent_id: agent_id.to_string(),
            update_type,
            content: content.to_string(),
            metadata: metadata.cloned(),
            created_at: now,
        })
    }

    /// Updates for a task in chronological order.
    pub fn for_task(
        conn: &Connection,
        task_id: i64,
        limit: u32,
    ) -> Result<Vec<TaskUpdate>, EngineError> {
        let mut stmt =
            conn.prepare("SELECT * FROM task_updates WHERE task_id = ?1 ORDER BY id ASC LIMIT ?2")?;
        let rows = stmt.query_map(params![task_id, limit], update_from_row)?;
        let mut updates = Vec::new();
        for row in rows {
            updates.push(row?);
        }
        Ok(updates)
    }

    /// Most recent finding-type updates, newest first. Used by reserve to
    /// detect a prior auto-unlock.
    pub fn recent_findings(
        conn: &Connection,
        task_id: i64,
        limit: u32,
    ) -> Result<Vec<TaskUpdate>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM task_updates
             WHERE task_id = ?1 AND update_type = 'finding'
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![task_id, limit], update_from_row)?;
        let mut updates = Vec::new();
        for row in rows {
            updates.push(row?);
        }
        Ok(updates)
    }

    /// Filtered scan for the activity feed, ordered `(created_at, id)`
    /// ascending.
    pub fn query(
        conn: &Connection,
        task_id: Option<i64>,
        agent_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TaskUpdate>, EngineError> {
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
            "SELECT * FROM task_updates {where_clause} ORDER BY created_at ASC, id ASC LIMIT ?"
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), update_from_row)?;
        let mut updates = Vec::new();
        for row in rows {
            updates.push(row?);
        }
        Ok(updates)
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_db;
    use serde_json::json;

    #[test]
    fn insert_and_list_chronological() {
        let conn = setup_db();
        UpdateRepo::insert(&conn, 1, "a1", UpdateType::Progress, "started", None).unwrap();
        UpdateRepo::insert(&conn, 1, "a1", UpdateType::Note, "halfway", None).unwrap();

        let updates = UpdateRepo::for_task(&conn, 1, 100).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].content, "started");
        assert_eq!(updates[1].content, "halfway");
    }

    #[test]
    fn metadata_roundtrips() {
        let conn = setup_db();
        let meta = json!({"auto_unlock": true, "previous_agent": "a1"});
        let update = UpdateRepo::insert(
            &conn,
            1,
            "sweeper",
            UpdateType::Finding,
            "auto-unlock",
            Some(&meta),
        )
        .unwrap();
        assert_eq!(update.metadata.as_ref().unwrap()["auto_unlock"], true);

        let fetched = UpdateRepo::for_task(&conn, 1, 10).unwrap();
        assert_eq!(
            fetched[0].metadata.as_ref().unwrap()["previous_agent"],
            "a1"
        );
    }

    #[test]
    fn recent_findings_filters_type() {
        let conn = setup_db();
        UpdateRepo::insert(&conn, 1, "a1", UpdateType::Progress, "work", None).unwrap();
        UpdateRepo::insert(&conn, 1, "sweeper", UpdateType::Finding, "first", None).unwrap();
        UpdateRepo::insert(&conn, 1, "sweeper", UpdateType::Finding, "second", None).unwrap();

        let findings = UpdateRepo::recent_findings(&conn, 1, 10).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].content, "second");
    }

    #[test]
    fn query_by_agent() {
        let conn = setup_db();
        UpdateRepo::insert(&conn, 1, "a1", UpdateType::Note, "mine", None).unwrap();
        UpdateRepo::insert(&conn, 2, "a2", UpdateType::Note, "theirs", None).unwrap();

        let mine = UpdateRepo::query(&conn, None, Some("a1"), None, None, 100).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].content, "mine");
    }
}
