//! Entity types and enums shared across the workspace.
//!
//! Enum string forms (`as_sql`) match the SQL CHECK constraints and the
//! wire protocol exactly; serde uses the same snake_case spellings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Available,
    InProgress,
    Complete,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further lifecycle transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Classification of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Concrete,
    Abstract,
    Epic,
}

impl TaskType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Concrete => "concrete",
            Self::Abstract => "abstract",
            Self::Epic => "epic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "concrete" => Some(Self::Concrete),
            "abstract" => Some(Self::Abstract),
            "epic" => Some(Self::Epic),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Task priority, ordered `critical > high > medium > low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Sort rank with 0 = most urgent. Used by the `CASE` ordering in SQL.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Secondary verification state, meaningful once a task is complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
}

impl VerificationStatus {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(Self::Unverified),
            "verified" => Some(Self::Verified),
            _ => None,
        }
    }
}

/// Directed edge type between two tasks.
///
/// Stored orientation is `(parent, child)`:
/// - `Subtask`: child is a subtask of parent
/// - `Blocking`: child blocks parent (parent waits for child)
/// - `BlockedBy`: parent blocks child (child waits for parent)
/// - `Followup` / `Related`: informational, never affect availability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Subtask,
    Blocking,
    BlockedBy,
    Followup,
    Related,
}

impl RelationshipType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Subtask => "subtask",
            Self::Blocking => "blocking",
            Self::BlockedBy => "blocked_by",
            Self::Followup => "followup",
            Self::Related => "related",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subtask" => Some(Self::Subtask),
            "blocking" => Some(Self::Blocking),
            "blocked_by" => Some(Self::BlockedBy),
            "followup" => Some(Self::Followup),
            "related" => Some(Self::Related),
            _ => None,
        }
    }

    /// Edge types that participate in dependency evaluation and the
    /// acyclicity invariant.
    pub fn is_dependency(self) -> bool {
        matches!(self, Self::Subtask | Self::Blocking | Self::BlockedBy)
    }
}

/// Kind of an agent-authored narrative update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Progress,
    Note,
    Blocker,
    Question,
    Finding,
}

impl UpdateType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Note => "note",
            Self::Blocker => "blocker",
            Self::Question => "question",
            Self::Finding => "finding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(Self::Progress),
            "note" => Some(Self::Note),
            "blocker" => Some(Self::Blocker),
            "question" => Some(Self::Question),
            "finding" => Some(Self::Finding),
            _ => None,
        }
    }
}

/// Kind of an audit-trail entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Agent-type projection used by availability queries.
///
/// Implementation agents receive concrete tasks; breakdown agents receive
/// abstract and epic tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Implementation,
    Breakdown,
}

impl AgentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "implementation" => Some(Self::Implementation),
            "breakdown" => Some(Self::Breakdown),
            _ => None,
        }
    }

    /// Task types this agent type may work on.
    pub fn task_types(self) -> &'static [TaskType] {
        match self {
            Self::Implementation => &[TaskType::Concrete],
            Self::Breakdown => &[TaskType::Abstract, TaskType::Epic],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of work with lifecycle state and ownership.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: Option<i64>,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub title: String,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub notes: Option<String>,
    pub assigned_agent: Option<String>,
    pub assigned_at: Option<String>,
    pub task_status: TaskStatus,
    pub verification_status: VerificationStatus,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub github_issue_url: Option<String>,
    pub github_pr_url: Option<String>,
}

impl Task {
    /// Fields captured in version snapshots and compared by version diffs,
    /// in a stable order.
    pub const VERSIONED_FIELDS: &'static [&'static str] = &[
        "project_id",
        "task_type",
        "priority",
        "title",
        "task_instruction",
        "verification_instruction",
        "notes",
        "assigned_agent",
        "assigned_at",
        "task_status",
        "verification_status",
        "estimated_hours",
        "actual_hours",
        "due_date",
        "completed_at",
        "github_issue_url",
        "github_pr_url",
    ];

    /// Serialize the full post-image for a version snapshot.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Tenant-like grouping of tasks. Immutable after create except
/// `description`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub local_path: Option<String>,
    pub origin_url: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Directed edge between two tasks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub parent_task_id: i64,
    pub child_task_id: i64,
    pub relationship_type: RelationshipType,
    pub created_at: String,
    pub created_by: String,
}

/// A label; assignment to tasks goes through the `task_tags` join table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Immutable agent-authored narrative entry on a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub update_type: UpdateType,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: String,
}

/// One audit-trail row per field mutation. Append-only; ordering within a
/// task is total by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub change_type: ChangeType,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: String,
}

/// Snapshot of a task's fields after a mutation, numbered 1..N per task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskVersion {
    pub task_id: i64,
    pub version_number: i64,
    pub payload: Value,
    pub created_at: String,
}

/// One differing field between two versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionDiffEntry {
    pub field: String,
    pub v1_value: Value,
    pub v2_value: Value,
}

/// Threaded comment on a task. Owner-only mutate/delete; deletion cascades
/// to replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub content: String,
    pub parent_comment_id: Option<i64>,
    pub mentions: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Reusable task blueprint with `{placeholder}` substitution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub priority: TaskPriority,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Schedule that instantiates a task every `interval_hours`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecurringTask {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub priority: TaskPriority,
    pub project_id: Option<i64>,
    pub interval_hours: f64,
    pub next_run_at: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Lightweight projection of a task for bulk listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: i64,
    pub title: String,
    pub task_type: TaskType,
    pub task_status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub project_id: Option<i64>,
    pub priority: TaskPriority,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Query inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Result ordering for structured queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Priority descending (critical first), then created_at, then id.
    Priority,
    /// Priority ascending (low first), then created_at, then id.
    PriorityAsc,
    /// Insertion order.
    #[default]
    CreatedAt,
}

impl TaskOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "priority" => Some(Self::Priority),
            "priority_asc" => Some(Self::PriorityAsc),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }
}

/// Structured filter for task queries. `tag_ids` requires ALL listed tags.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub task_status: Option<TaskStatus>,
    pub assigned_agent: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tag_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub order_by: TaskOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_sql_roundtrip() {
        for s in [
            TaskStatus::Available,
            TaskStatus::InProgress,
            TaskStatus::Complete,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(s.as_sql()), Some(s));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Available.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn priority_rank_ordering() {
        assert!(TaskPriority::Critical.rank() < TaskPriority::High.rank());
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn dependency_edge_types() {
        assert!(RelationshipType::Subtask.is_dependency());
        assert!(RelationshipType::Blocking.is_dependency());
        assert!(RelationshipType::BlockedBy.is_dependency());
        assert!(!RelationshipType::Followup.is_dependency());
        assert!(!RelationshipType::Related.is_dependency());
    }

    #[test]
    fn agent_type_projection() {
        assert_eq!(
            AgentType::Implementation.task_types(),
            &[TaskType::Concrete]
        );
        assert_eq!(
            AgentType::Breakdown.task_types(),
            &[TaskType::Abstract, TaskType::Epic]
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(back, TaskStatus::Blocked);
    }

    #[test]
    fn task_snapshot_contains_versioned_fields() {
        let task = Task {
            id: 1,
            project_id: None,
            task_type: TaskType::Concrete,
            priority: TaskPriority::Medium,
            title: "Sample".into(),
            task_instruction: "Do the thing properly".into(),
            verification_instruction: "Check the thing works".into(),
            notes: None,
            assigned_agent: None,
            assigned_at: None,
            task_status: TaskStatus::Available,
            verification_status: VerificationStatus::Unverified,
            estimated_hours: None,
            actual_hours: None,
            due_date: None,
            created_at: "2026-01-01T00:00:00.000000Z".into(),
            updated_at: "2026-01-01T00:00:00.000000Z".into(),
            completed_at: None,
            github_issue_url: None,
            github_pr_url: None,
        };
        let snap = task.snapshot();
        for field in Task::VERSIONED_FIELDS {
            assert!(snap.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn update_type_parse() {
        assert_eq!(UpdateType::parse("finding"), Some(UpdateType::Finding));
        assert_eq!(UpdateType::parse("unknown"), None);
    }

    #[test]
    fn order_parse() {
        assert_eq!(TaskOrder::parse("priority"), Some(TaskOrder::Priority));
        assert_eq!(
            TaskOrder::parse("priority_asc"),
            Some(TaskOrder::PriorityAsc)
        );
        assert_eq!(TaskOrder::parse("nope"), None);
    }
}
