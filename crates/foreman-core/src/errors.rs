//! Engine error taxonomy.
//!
//! One variant per abstract failure kind. Errors are never swallowed:
//! retryable storage contention is retried by the writer up to its budget
//! and then surfaces as `TransactionAborted`; everything else propagates
//! to the caller immediately.

use thiserror::Error;

/// Errors from core operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A parameter violates its declared constraints.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity id absent.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (e.g. "Task", "Project", "Tag").
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// State precondition not met (reserving a non-available task,
    /// reserving a blocked task, task held by another agent).
    #[error("Task {task_id} unavailable: {reason}")]
    Unavailable { task_id: i64, reason: String },

    /// Caller is not the assignee for an ownership-gated mutation.
    #[error("{entity} {id} is assigned to '{assigned}', not '{caller}'")]
    NotAssigned {
        entity: &'static str,
        id: i64,
        assigned: String,
        caller: String,
    },

    /// The state machine refuses the requested move.
    #[error("Invalid transition for task {task_id}: {detail}")]
    InvalidTransition { task_id: i64, detail: String },

    /// Creating the relationship would close a directed cycle in the
    /// dependency subgraph.
    #[error("Relationship {parent_id} -> {child_id} would create a cycle")]
    CycleDetected { parent_id: i64, child_id: i64 },

    /// Unique-name or unique-link constraint violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Write retry budget exhausted under sustained contention.
    #[error("Write transaction aborted after {attempts} attempts")]
    TransactionAborted { attempts: u32 },

    /// Underlying storage failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Corruption or invariant breach detected during a read.
    #[error("Fatal storage error: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Create a not-found error for a task.
    pub fn task_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Task",
            id: id.to_string(),
        }
    }

    /// Create a not-found error for a project.
    pub fn project_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Project",
            id: id.to_string(),
        }
    }

    /// Machine-readable kind token, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::NotAssigned { .. } => "NOT_ASSIGNED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::Conflict(_) => "CONFLICT",
            Self::TransactionAborted { .. } => "TRANSACTION_ABORTED",
            Self::Database(_) => "STORAGE_ERROR",
            Self::Fatal(_) => "FATAL",
        }
    }

    /// Whether the writer may retry the operation internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
