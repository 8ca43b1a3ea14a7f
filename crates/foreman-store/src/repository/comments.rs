//! Threaded comments. Deleting a comment removes its reply subtree via the
//! `parent_comment_id` cascade.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::Comment;
use foreman_core::EngineError;

use crate::rows::comment_from_row;

/// Comment repository.
pub struct CommentRepo;

impl CommentRepo {
    pub fn insert(
        conn: &Connection,
        task_id: i64,
        agent_id: &str,
        content: &str,
        parent_comment_id: Option<i64>,
        mentions: &[String],
    ) -> Result<Comment, EngineError> {
        let now = now_iso();
        let mentions_json = serde_json::to_string(mentions)
            .map_err(|e| EngineError::Fatal(format!("mentions serialization failed: {e}")))?;
        conn.execute(
            "INSERT INTO comments (task_id, agent_id, content, parent_comment_id, mentions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![task_id, agent_id, content, parent_comment_id, mentions_json, now],
        )?;
        Ok(Comment {
            id: conn.last_insert_rowid(),
            task_id,
            agent_id: agent_id.to_string(),
            content: content.to_string(),
            parent_comment_id,
            mentions: mentions.to_vec(),
            created_at: now,
            updated_at: None,
        })
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Comment>, EngineError> {
        let comment = conn
            .query_row(
                "SELECT * FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )
            .optional()?;
        Ok(comment)
    }

    pub fn update_content(
        conn: &Connection,
        id: i64,
        content: &str,
    ) -> Result<Comment, EngineError> {
        let changed = conn.execute(
            "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![content, now_iso(), id],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound {
                entity: "Comment",
                id: id.to_string(),
            });
        }
        Self::get(conn, id)?.ok_or(EngineError::NotFound {
            entity: "Comment",
            id: id.to_string(),
        })
    }

    /// Delete a comment; replies cascade. Returns true if a row was removed.
    pub fn delete(conn: &Connection, id: i64) -> Result<bool, EngineError> {
        let changed = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// All comments on a task, oldest first.
    pub fn for_task(conn: &Connection, task_id: i64) -> Result<Vec<Comment>, EngineError> {
        let mut stmt = conn.prepare("SELECT * FROM comments WHERE task_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![task_id], comment_from_row)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// A comment and its full reply subtree, oldest first.
    pub fn thread(conn: &Connection, root_id: i64) -> Result<Vec<Comment>, EngineError> {
        let mut stmt = conn.prepare(
            "WITH RECURSIVE thread(id) AS (
                 SELECT id FROM comments WHERE id = ?1
                 UNION ALL
                 SELECT c.id FROM comments c JOIN thread t ON c.parent_comment_id = t.id
             )
             SELECT c.* FROM comments c JOIN thread t ON c.id = t.id ORDER BY c.id ASC",
        )?;
        let rows = stmt.query_map(params![root_id], comment_from_row)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }
}
