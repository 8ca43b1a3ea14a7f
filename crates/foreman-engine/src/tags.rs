//! Tag operations.
//!
//! Tag links are not task fields: assigning or removing a tag emits an
//! event but does not touch the change log or version log, which track
//! field mutations only.

use serde_json::json;

use foreman_core::types::Tag;
use foreman_core::{ChangeEvent, EngineError, EventKind};
use foreman_store::repository::{TagRepo, TaskRepo};

use crate::lifecycle::LifecycleEngine;
use crate::queries::QueryEngine;

impl LifecycleEngine {
    /// Create a tag with a unique name.
    pub fn create_tag(&self, name: &str) -> Result<Tag, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("tag name must be non-empty".into()));
        }
        self.store().with_write(|txn| TagRepo::create(txn, name))
    }

    /// Assign a tag to a task. Idempotent; the event fires only on a new
    /// link.
    pub fn assign_tag(
        &self,
        task_id: i64,
        tag_id: i64,
        agent_id: &str,
    ) -> Result<Tag, EngineError> {
        let (tag, event) = self.store().with_write(|txn| {
            if TaskRepo::get(txn, task_id)?.is_none() {
                return Err(EngineError::task_not_found(task_id));
            }
            let tag = TagRepo::get(txn, tag_id)?.ok_or(EngineError::NotFound {
                entity: "Tag",
                id: tag_id.to_string(),
            })?;
            let inserted = TagRepo::assign(txn, task_id, tag_id)?;
            let event = inserted.then(|| {
                ChangeEvent::new(EventKind::TagAssigned, task_id, agent_id)
                    .with_summary(json!({ "tag_id": tag_id, "tag": &tag.name }))
            });
            Ok((tag, event))
        })?;
        if let Some(event) = event {
            self.publisher().publish(event);
        }
        Ok(tag)
    }

    /// Remove a tag from a task. Removing an absent link is a no-op
    /// success; returns whether a link was removed.
    pub fn remove_tag(
        &self,
        task_id: i64,
        tag_id: i64,
        agent_id: &str,
    ) -> Result<bool, EngineError> {
        let (removed, event) = self.store().with_write(|txn| {
            if TaskRepo::get(txn, task_id)?.is_none() {
                return Err(EngineError::task_not_found(task_id));
            }
            let removed = TagRepo::remove(txn, task_id, tag_id)?;
            let event = removed.then(|| {
                ChangeEvent::new(EventKind::TagRemoved, task_id, agent_id)
                    .with_summary(json!({ "tag_id": tag_id }))
            });
            Ok((removed, event))
        })?;
        if let Some(event) = event {
            self.publisher().publish(event);
        }
        Ok(removed)
    }
}

impl QueryEngine {
    /// All tags, by name.
    pub fn list_tags(&self) -> Result<Vec<Tag>, EngineError> {
        let conn = self.store().reader()?;
        TagRepo::list(&conn)
    }

    /// Tags assigned to a task.
    pub fn task_tags(&self, task_id: i64) -> Result<Vec<Tag>, EngineError> {
        let conn = self.store().reader()?;
        if TaskRepo::get(&conn, task_id)?.is_none() {
            return Err(EngineError::task_not_found(task_id));
        }
        TagRepo::for_task(&conn, task_id)
    }
}
