//! Mutation bookkeeping: every task-field change persists its row update,
//! its per-field change entries, and its version snapshot on one
//! transaction handle.

use rusqlite::Connection;
use serde_json::Value;

use foreman_core::types::{ChangeType, Task};
use foreman_core::EngineError;
use foreman_store::repository::{ChangeRepo, FieldChange, TaskRepo, VersionRepo};

/// Render a snapshot value as audit-trail text. Strings are stored raw,
/// other values in JSON form, null as absent.
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Per-field differences between two task images, in the stable field
/// order.
pub(crate) fn field_changes(old: &Task, new: &Task) -> Vec<FieldChange> {
    let old_snap = old.snapshot();
    let new_snap = new.snapshot();
    let mut changes = Vec::new();
    for field in Task::VERSIONED_FIELDS {
        let old_value = old_snap.get(*field).cloned().unwrap_or(Value::Null);
        let new_value = new_snap.get(*field).cloned().unwrap_or(Value::Null);
        if old_value != new_value {
            changes.push((
                (*field).to_string(),
                value_to_text(&old_value),
                value_to_text(&new_value),
            ));
        }
    }
    changes
}

/// Change entries for a freshly created task: one per populated field.
pub(crate) fn creation_changes(task: &Task) -> Vec<FieldChange> {
    let snap = task.snapshot();
    let mut changes = Vec::new();
    for field in Task::VERSIONED_FIELDS {
        let value = snap.get(*field).cloned().unwrap_or(Value::Null);
        if let Some(text) = value_to_text(&value) {
            changes.push(((*field).to_string(), None, Some(text)));
        }
    }
    changes
}

/// Persist `new` as the post-image of `old`: row update, change entries,
/// version snapshot — all on `conn` (the writer's transaction). A no-op
/// diff writes nothing and returns the stored row unchanged.
pub(crate) fn persist_mutation(
    conn: &Connection,
    old: &Task,
    new: &Task,
    agent_id: &str,
) -> Result<Task, EngineError> {
    let changes = field_changes(old, new);
    if changes.is_empty() {
        return Ok(old.clone());
    }
    let stored = TaskRepo::update_row(conn, new)?;
    ChangeRepo::append_all(conn, new.id, agent_id, ChangeType::Update, &changes)?;
    let _ = VersionRepo::append(conn, &stored)?;
    Ok(stored)
}

/// Persist a freshly inserted task's audit trail: creation change entries
/// plus version 1.
pub(crate) fn persist_creation(
    conn: &Connection,
    task: &Task,
    agent_id: &str,
) -> Result<(), EngineError> {
    let changes = creation_changes(task);
    ChangeRepo::append_all(conn, task.id, agent_id, ChangeType::Create, &changes)?;
    let _ = VersionRepo::append(conn, task)?;
    Ok(())
}
