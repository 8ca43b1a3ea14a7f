//! Tags and task-tag assignments.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::Tag;
use foreman_core::EngineError;

use crate::rows::tag_from_row;

use super::map_constraint;

/// Tag repository.
pub struct TagRepo;

impl TagRepo {
    /// Create a tag. Duplicate names surface as `Conflict`.
    pub fn create(conn: &Connection, name: &str) -> Result<Tag, EngineError> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO tags (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )
        .map_err(|e| map_constraint(e, format!("tag '{name}' already exists")))?;
        Ok(Tag {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Tag>, EngineError> {
        let tag = conn
            .query_row(
                "SELECT * FROM tags WHERE id = ?1",
                params![id],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Tag>, EngineError> {
        let tag = conn
            .query_row(
                "SELECT * FROM tags WHERE name = ?1",
                params![name],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    pub fn list(conn: &Connection) -> Result<Vec<Tag>, EngineError> {
        let mut stmt = conn.prepare("SELECT * FROM tags ORDER BY name")?;
        let rows = stmt.query_map([], tag_from_row)?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    /// Assign a tag to a task. Returns false if the link already existed.
    pub fn assign(conn: &Connection, task_id: i64, tag_id: i64) -> Result<bool, EngineError> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
            params![task_id, tag_id],
        )?;
        Ok(changed > 0)
    }

    /// Remove a tag from a task. Removing an absent link is a no-op
    /// (returns false).
    pub fn remove(conn: &Connection, task_id: i64, tag_id: i64) -> Result<bool, EngineError> {
        let changed = conn.execute(
            "DELETE FROM task_tags WHERE task_id = ?1 AND tag_id = ?2",
            params![task_id, tag_id],
        )?;
        Ok(changed > 0)
    }

    /// Tags assigned to a task, by name.
    pub fn for_task(conn: &Connection, task_id: i64) -> Result<Vec<Tag>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT t.* FROM tags t JOIN task_tags tt ON tt.tag_id = t.id
             WHERE tt.task_id = ?1 ORDER BY t.name",
        )?;
        let rows = stmt.query_map(params![task_id], tag_from_row)?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }
}
