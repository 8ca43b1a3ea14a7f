//! Change events fanned out to external subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::now_iso;

/// Event types emitted by the lifecycle engine. Serialized with their
/// dotted wire names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.reserved")]
    TaskReserved,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.verified")]
    TaskVerified,
    #[serde(rename = "task.unlocked")]
    TaskUnlocked,
    #[serde(rename = "task.unlocked_stale")]
    TaskUnlockedStale,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "tag.assigned")]
    TagAssigned,
    #[serde(rename = "tag.removed")]
    TagRemoved,
    #[serde(rename = "relationship.created")]
    RelationshipCreated,
    #[serde(rename = "comment.created")]
    CommentCreated,
}

impl EventKind {
    /// Dotted wire name, e.g. `task.unlocked_stale`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "task.created",
            Self::TaskReserved => "task.reserved",
            Self::TaskUpdated => "task.updated",
            Self::TaskCompleted => "task.completed",
            Self::TaskVerified => "task.verified",
            Self::TaskUnlocked => "task.unlocked",
            Self::TaskUnlockedStale => "task.unlocked_stale",
            Self::TaskDeleted => "task.deleted",
            Self::TagAssigned => "tag.assigned",
            Self::TagRemoved => "tag.removed",
            Self::RelationshipCreated => "relationship.created",
            Self::CommentCreated => "comment.created",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change event: task id, actor, pre/post summary, timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub task_id: i64,
    pub actor: String,
    /// Compact pre/post summary of what changed, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    pub timestamp: String,
}

impl ChangeEvent {
    /// Create an event stamped with the current UTC time.
    pub fn new(kind: EventKind, task_id: i64, actor: impl Into<String>) -> Self {
        Self {
            kind,
            task_id,
            actor: actor.into(),
            summary: None,
            timestamp: now_iso(),
        }
    }

    /// Attach a pre/post summary.
    #[must_use]
    pub fn with_summary(mut self, summary: Value) -> Self {
        self.summary = Some(summary);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names() {
        assert_eq!(EventKind::TaskCreated.as_str(), "task.created");
        assert_eq!(EventKind::TaskUnlockedStale.as_str(), "task.unlocked_stale");
        assert_eq!(EventKind::TagAssigned.as_str(), "tag.assigned");
        assert_eq!(
            EventKind::RelationshipCreated.as_str(),
            "relationship.created"
        );
    }

    #[test]
    fn event_has_timestamp() {
        let ev = ChangeEvent::new(EventKind::TaskReserved, 1, "a1");
        assert!(ev.timestamp.ends_with('Z'));
        assert!(ev.summary.is_none());
    }

    #[test]
    fn kind_serializes_to_wire_name() {
        assert_eq!(
            serde_json::to_string(&EventKind::TaskUnlockedStale).unwrap(),
            "\"task.unlocked_stale\""
        );
        let back: EventKind = serde_json::from_str("\"task.created\"").unwrap();
        assert_eq!(back, EventKind::TaskCreated);
    }

    #[test]
    fn event_with_summary() {
        let ev = ChangeEvent::new(EventKind::TaskCompleted, 2, "a1")
            .with_summary(json!({"task_status": {"old": "in_progress", "new": "complete"}}));
        assert_eq!(ev.summary.unwrap()["task_status"]["new"], "complete");
    }
}
