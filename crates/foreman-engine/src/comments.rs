//! Threaded comments: owner-only mutate/delete, cascading deletion of the
//! reply subtree.

use serde_json::json;

use foreman_core::types::Comment;
use foreman_core::{ChangeEvent, EngineError, EventKind};
use foreman_store::repository::{CommentRepo, TaskRepo};

use crate::lifecycle::LifecycleEngine;
use crate::queries::QueryEngine;

impl LifecycleEngine {
    /// Add a comment, optionally as a reply.
    pub fn create_comment(
        &self,
        task_id: i64,
        agent_id: &str,
        content: &str,
        parent_comment_id: Option<i64>,
        mentions: &[String],
    ) -> Result<Comment, EngineError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "comment content cannot be empty".into(),
            ));
        }
        let (comment, event) = self.store().with_write(|txn| {
            if TaskRepo::get(txn, task_id)?.is_none() {
                return Err(EngineError::task_not_found(task_id));
            }
            if let Some(parent_id) = parent_comment_id {
                let parent = CommentRepo::get(txn, parent_id)?.ok_or(EngineError::NotFound {
                    entity: "Comment",
                    id: parent_id.to_string(),
                })?;
                if parent.task_id != task_id {
                    return Err(EngineError::Validation(format!(
                        "parent comment {parent_id} belongs to task {}, not {task_id}",
                        parent.task_id
                    )));
                }
            }
            let comment =
                CommentRepo::insert(txn, task_id, agent_id, content, parent_comment_id, mentions)?;
            let event = ChangeEvent::new(EventKind::CommentCreated, task_id, agent_id)
                .with_summary(json!({
                    "comment_id": comment.id,
                    "parent_comment_id": parent_comment_id,
                }));
            Ok((comment, event))
        })?;
        self.publisher().publish(event);
        Ok(comment)
    }

    /// Edit a comment. Only the author may edit.
    pub fn update_comment(
        &self,
        comment_id: i64,
        agent_id: &str,
        content: &str,
    ) -> Result<Comment, EngineError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "comment content cannot be empty".into(),
            ));
        }
        self.store().with_write(|txn| {
            let comment = CommentRepo::get(txn, comment_id)?.ok_or(EngineError::NotFound {
                entity: "Comment",
                id: comment_id.to_string(),
            })?;
            if comment.agent_id != agent_id {
                return Err(EngineError::NotAssigned {
                    entity: "Comment",
                    id: comment_id,
                    assigned: comment.agent_id,
                    caller: agent_id.to_string(),
                });
            }
            CommentRepo::update_content(txn, comment_id, content)
        })
    }

    /// Delete a comment and its reply subtree. Only the author may delete.
    pub fn delete_comment(&self, comment_id: i64, agent_id: &str) -> Result<(), EngineError> {
        self.store().with_write(|txn| {
            let comment = CommentRepo::get(txn, comment_id)?.ok_or(EngineError::NotFound {
                entity: "Comment",
                id: comment_id.to_string(),
            })?;
            if comment.agent_id != agent_id {
                return Err(EngineError::NotAssigned {
                    entity: "Comment",
                    id: comment_id,
                    assigned: comment.agent_id,
                    caller: agent_id.to_string(),
                });
            }
            let _ = CommentRepo::delete(txn, comment_id)?;
            Ok(())
        })
    }
}

impl QueryEngine {
    /// Fetch a single comment.
    pub fn get_comment(&self, comment_id: i64) -> Result<Comment, EngineError> {
        let conn = self.store().reader()?;
        CommentRepo::get(&conn, comment_id)?.ok_or(EngineError::NotFound {
            entity: "Comment",
            id: comment_id.to_string(),
        })
    }

    /// All comments on a task, oldest first.
    pub fn task_comments(&self, task_id: i64) -> Result<Vec<Comment>, EngineError> {
        let conn = self.store().reader()?;
        if TaskRepo::get(&conn, task_id)?.is_none() {
            return Err(EngineError::task_not_found(task_id));
        }
        CommentRepo::for_task(&conn, task_id)
    }

    /// A comment and its reply subtree, oldest first.
    pub fn comment_thread(&self, comment_id: i64) -> Result<Vec<Comment>, EngineError> {
        let conn = self.store().reader()?;
        let thread = CommentRepo::thread(&conn, comment_id)?;
        if thread.is_empty() {
            return Err(EngineError::NotFound {
                entity: "Comment",
                id: comment_id.to_string(),
            });
        }
        Ok(thread)
    }
}
