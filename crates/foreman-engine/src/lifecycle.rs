//! The task state machine.
//!
//! `available → in_progress → complete`, with unlock back to `available`,
//! `blocked` as a parking state, and `cancelled` terminal. Key rules:
//!
//! - **Reservation is exclusive**: the status check and the assignment
//!   happen inside one writer transaction, so exactly one of two racing
//!   reservations succeeds.
//! - **Audit in lockstep**: every field mutation commits atomically with
//!   its change entries and a new version snapshot.
//! - **Assignment mirrors status**: `assigned_agent`/`assigned_at` are
//!   non-null iff the task is `in_progress`.
//! - **Completion is terminal** except for the one-way
//!   `unverified → verified` step. Completing an already-complete,
//!   unverified task acts as verification and emits `task.verified`.

use std::sync::Arc;

use serde_json::{json, Value};

use foreman_core::time::{hours_between, now_iso, parse_required_tz};
use foreman_core::types::{
    Relationship, RelationshipType, Task, TaskPriority, TaskStatus, TaskType, TaskUpdate,
    UpdateType, VerificationStatus,
};
use foreman_core::{ChangeEvent, EngineError, EventKind, ForemanConfig};
use foreman_store::repository::{
    ChangeRepo, NewTask, ProjectRepo, RelationshipRepo, TaskRepo, UpdateRepo,
};
use foreman_store::Store;

use crate::deps::DependencyResolver;
use crate::events::EventPublisher;
use crate::mutation::{field_changes, persist_creation, persist_mutation};

/// Actor id used by the stale sweeper.
pub const SWEEPER_ACTOR: &str = "stale-sweeper";

/// Inputs for `create_task`.
#[derive(Clone, Debug)]
pub struct CreateTaskParams {
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub agent_id: String,
    pub project_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub relationship_type: Option<RelationshipType>,
    pub priority: Option<TaskPriority>,
    pub notes: Option<String>,
    pub estimated_hours: Option<f64>,
    pub due_date: Option<String>,
}

/// Outcome of `create_task`.
#[derive(Clone, Debug)]
pub struct CreateTaskResult {
    pub task: Task,
    pub relationship_id: Option<i64>,
}

/// Warning attached to a reservation of a previously auto-unlocked task.
#[derive(Clone, Debug, serde::Serialize)]
pub struct StaleWarning {
    pub previous_agent: String,
    pub unlocked_at: String,
    pub reason: String,
}

/// Outcome of `reserve`.
#[derive(Clone, Debug)]
pub struct ReserveResult {
    pub task: Task,
    pub stale_warning: Option<StaleWarning>,
}

/// Followup task created on completion.
#[derive(Clone, Debug)]
pub struct FollowupSpec {
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
}

/// Inputs for `complete`.
#[derive(Clone, Debug, Default)]
pub struct CompleteParams {
    pub notes: Option<String>,
    pub actual_hours: Option<f64>,
    pub followup: Option<FollowupSpec>,
}

/// Outcome of `complete`.
#[derive(Clone, Debug)]
pub struct CompleteResult {
    pub task: Task,
    /// True when the call acted as verification of an already-complete task.
    pub verified: bool,
    pub followup_task_id: Option<i64>,
}

/// Per-id outcome of `bulk_unlock`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BulkUnlockOutcome {
    pub task_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of `bulk_unlock`. All-or-nothing: `success` is true only when
/// every id transitioned.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BulkUnlockResult {
    pub success: bool,
    pub outcomes: Vec<BulkUnlockOutcome>,
}

/// The lifecycle engine: all task mutations flow through here.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Store,
    events: EventPublisher,
    config: Arc<ForemanConfig>,
}

/// Build a pre/post event summary from field changes.
fn change_summary(old: &Task, new: &Task) -> Option<Value> {
    let changes = field_changes(old, new);
    if changes.is_empty() {
        return None;
    }
    let mut summary = serde_json::Map::new();
    for (field, old_value, new_value) in changes {
        let _ = summary.insert(field, json!({ "old": old_value, "new": new_value }));
    }
    Some(Value::Object(summary))
}

fn validate_title(title: &str) -> Result<String, EngineError> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if !(3..=100).contains(&len) {
        return Err(EngineError::Validation(format!(
            "title must be 3-100 characters after trimming, got {len}"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_instruction(value: &str, field: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < 10 {
        return Err(EngineError::Validation(format!(
            "{field} must be at least 10 characters after trimming"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_hours(value: f64, field: &str) -> Result<f64, EngineError> {
    if !value.is_finite() || value < 0.1 - 1e-9 {
        return Err(EngineError::Validation(format!(
            "{field} must be a positive number of at least 0.1, got {value}"
        )));
    }
    Ok(value)
}

fn validate_agent(agent_id: &str) -> Result<String, EngineError> {
    let trimmed = agent_id.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("agent_id must be non-empty".into()));
    }
    Ok(trimmed.to_string())
}

impl LifecycleEngine {
    pub fn new(store: Store, events: EventPublisher, config: Arc<ForemanConfig>) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn publisher(&self) -> &EventPublisher {
        &self.events
    }

    fn emit_all(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Create
    // ─────────────────────────────────────────────────────────────────────

    /// Create a task, optionally linked to a parent. The task row, its
    /// creation change entries, version 1, and the optional relationship
    /// commit in one transaction.
    pub fn create_task(&self, params: &CreateTaskParams) -> Result<CreateTaskResult, EngineError> {
        let title = validate_title(&params.title)?;
        let task_instruction = validate_instruction(&params.task_instruction, "task_instruction")?;
        let verification_instruction =
            validate_instruction(&params.verification_instruction, "verification_instruction")?;
        let agent_id = validate_agent(&params.agent_id)?;
        if let Some(ref notes) = params.notes {
            if notes.trim().is_empty() {
                return Err(EngineError::Validation(
                    "notes must be non-empty when provided".into(),
                ));
            }
        }
        let estimated_hours = params
            .estimated_hours
            .map(|h| validate_hours(h, "estimated_hours"))
            .transpose()?;
        let due_date = params
            .due_date
            .as_deref()
            .map(|d| parse_required_tz(d, "due_date"))
            .transpose()?;
        if params.parent_task_id.is_some() && params.relationship_type.is_none() {
            return Err(EngineError::Validation(
                "relationship_type is required when parent_task_id is given".into(),
            ));
        }
        if params.relationship_type.is_some() && params.parent_task_id.is_none() {
            return Err(EngineError::Validation(
                "parent_task_id is required when relationship_type is given".into(),
            ));
        }

        let new = NewTask {
            project_id: params.project_id,
            task_type: Some(params.task_type),
            priority: params.priority,
            title,
            task_instruction,
            verification_instruction,
            notes: params.notes.as_ref().map(|n| n.trim().to_string()),
            estimated_hours,
            due_date,
        };

        let (result, events) = self.store.with_write(|txn| {
            if let Some(project_id) = params.project_id {
                if ProjectRepo::get(txn, project_id)?.is_none() {
                    return Err(EngineError::project_not_found(project_id));
                }
            }
            let parent = match params.parent_task_id {
                Some(parent_id) => {
                    Some(TaskRepo::get(txn, parent_id)?.ok_or(EngineError::NotFound {
                        entity: "Parent task",
                        id: parent_id.to_string(),
                    })?)
                }
                None => None,
            };

            let task = TaskRepo::insert(txn, &new)?;
            persist_creation(txn, &task, &agent_id)?;

            let mut events = vec![ChangeEvent::new(EventKind::TaskCreated, task.id, &agent_id)
                .with_summary(json!({ "title": &task.title, "task_type": task.task_type }))];

            let mut relationship_id = None;
            if let (Some(parent), Some(kind)) = (parent, params.relationship_type) {
                DependencyResolver::assert_no_cycle(txn, parent.id, task.id, kind)?;
                let rel = RelationshipRepo::insert(txn, parent.id, task.id, kind, &agent_id)?;
                events.push(
                    ChangeEvent::new(EventKind::RelationshipCreated, task.id, &agent_id)
                        .with_summary(json!({
                            "parent_task_id": parent.id,
                            "child_task_id": task.id,
                            "relationship_type": kind,
                        })),
                );
                relationship_id = Some(rel.id);
            }

            Ok((
                CreateTaskResult {
                    task,
                    relationship_id,
                },
                events,
            ))
        })?;

        self.emit_all(events);
        Ok(result)
    }

    /// Link two existing tasks. The cycle guard runs inside the same
    /// transaction as the insert.
    pub fn add_relationship(
        &self,
        parent_task_id: i64,
        child_task_id: i64,
        relationship_type: RelationshipType,
        agent_id: &str,
    ) -> Result<Relationship, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let (rel, event) = self.store.with_write(|txn| {
            for id in [parent_task_id, child_task_id] {
                if TaskRepo::get(txn, id)?.is_none() {
                    return Err(EngineError::task_not_found(id));
                }
            }
            DependencyResolver::assert_no_cycle(
                txn,
                parent_task_id,
                child_task_id,
                relationship_type,
            )?;
            let rel = RelationshipRepo::insert(
                txn,
                parent_task_id,
                child_task_id,
                relationship_type,
                &agent_id,
            )?;
            let event = ChangeEvent::new(EventKind::RelationshipCreated, child_task_id, &agent_id)
                .with_summary(json!({
                    "parent_task_id": parent_task_id,
                    "child_task_id": child_task_id,
                    "relationship_type": relationship_type,
                }));
            Ok((rel, event))
        })?;
        self.events.publish(event);
        Ok(rel)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reserve
    // ─────────────────────────────────────────────────────────────────────

    /// Atomically reserve an available, unblocked task for an agent.
    pub fn reserve(&self, task_id: i64, agent_id: &str) -> Result<ReserveResult, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let (result, event) = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;

            if task.task_status != TaskStatus::Available {
                let holder = task
                    .assigned_agent
                    .clone()
                    .unwrap_or_else(|| "none".to_string());
                return Err(EngineError::Unavailable {
                    task_id,
                    reason: format!(
                        "status is '{}' (assigned to: {holder}); only available tasks can be reserved",
                        task.task_status
                    ),
                });
            }
            if DependencyResolver::is_blocked(txn, task_id)? {
                return Err(EngineError::Unavailable {
                    task_id,
                    reason: "blocked by unfinished dependencies".into(),
                });
            }

            let mut next = task.clone();
            next.task_status = TaskStatus::InProgress;
            next.assigned_agent = Some(agent_id.clone());
            next.assigned_at = Some(now_iso());
            let stored = persist_mutation(txn, &task, &next, &agent_id)?;

            let stale_warning = stale_warning_for(txn, task_id)?;
            let event = ChangeEvent::new(EventKind::TaskReserved, task_id, &agent_id)
                .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null));
            Ok((
                ReserveResult {
                    task: stored,
                    stale_warning,
                },
                event,
            ))
        })?;

        self.events.publish(event);
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Complete / verify
    // ─────────────────────────────────────────────────────────────────────

    /// Complete a reserved task, or verify an already-complete one.
    ///
    /// Completing clears the assignment, stamps `completed_at` exactly
    /// once, and leaves `verification_status` untouched. Calling complete
    /// on a complete-but-unverified task performs verification instead and
    /// emits `task.verified`.
    pub fn complete(
        &self,
        task_id: i64,
        agent_id: &str,
        params: &CompleteParams,
    ) -> Result<CompleteResult, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let actual_hours = params
            .actual_hours
            .map(|h| validate_hours(h, "actual_hours"))
            .transpose()?;
        if let Some(ref followup) = params.followup {
            let _ = validate_title(&followup.title)?;
            let _ = validate_instruction(&followup.task_instruction, "followup task_instruction")?;
            let _ = validate_instruction(
                &followup.verification_instruction,
                "followup verification_instruction",
            )?;
        }

        let (result, events) = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;

            // Already complete: this call is a verification.
            if task.task_status == TaskStatus::Complete {
                if task.verification_status == VerificationStatus::Verified {
                    return Err(EngineError::InvalidTransition {
                        task_id,
                        detail: "task is already complete and verified".into(),
                    });
                }
                let stored = verify_in_txn(txn, &task, &agent_id, params.notes.as_deref())?;
                let event = ChangeEvent::new(EventKind::TaskVerified, task_id, &agent_id)
                    .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null));
                return Ok((
                    CompleteResult {
                        task: stored,
                        verified: true,
                        followup_task_id: None,
                    },
                    vec![event],
                ));
            }

            if task.task_status != TaskStatus::InProgress {
                return Err(EngineError::InvalidTransition {
                    task_id,
                    detail: format!("cannot complete a task in status '{}'", task.task_status),
                });
            }
            match task.assigned_agent.as_deref() {
                Some(assigned) if assigned == agent_id => {}
                Some(assigned) => {
                    return Err(EngineError::NotAssigned {
                        entity: "Task",
                        id: task_id,
                        assigned: assigned.to_string(),
                        caller: agent_id.clone(),
                    })
                }
                None => {
                    return Err(EngineError::Fatal(format!(
                        "task {task_id} is in_progress with no assigned agent"
                    )))
                }
            }

            let mut next = task.clone();
            next.task_status = TaskStatus::Complete;
            next.assigned_agent = None;
            next.assigned_at = None;
            if next.completed_at.is_none() {
                next.completed_at = Some(now_iso());
            }
            if let Some(hours) = actual_hours {
                next.actual_hours = Some(hours);
            }
            if let Some(ref notes) = params.notes {
                let trimmed = notes.trim();
                if !trimmed.is_empty() {
                    next.notes = Some(match &task.notes {
                        Some(existing) => format!("{existing}\n{trimmed}"),
                        None => trimmed.to_string(),
                    });
                }
            }
            let stored = persist_mutation(txn, &task, &next, &agent_id)?;

            let mut events = vec![
                ChangeEvent::new(EventKind::TaskCompleted, task_id, &agent_id)
                    .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null)),
            ];

            let mut followup_task_id = None;
            if let Some(ref followup) = params.followup {
                let new = NewTask {
                    project_id: stored.project_id,
                    task_type: Some(followup.task_type),
                    priority: Some(stored.priority),
                    title: followup.title.trim().to_string(),
                    task_instruction: followup.task_instruction.trim().to_string(),
                    verification_instruction: followup.verification_instruction.trim().to_string(),
                    notes: None,
                    estimated_hours: None,
                    due_date: None,
                };
                let created = TaskRepo::insert(txn, &new)?;
                persist_creation(txn, &created, &agent_id)?;
                let _ = RelationshipRepo::insert(
                    txn,
                    task_id,
                    created.id,
                    RelationshipType::Followup,
                    &agent_id,
                )?;
                events.push(
                    ChangeEvent::new(EventKind::TaskCreated, created.id, &agent_id)
                        .with_summary(json!({ "title": &created.title, "followup_of": task_id })),
                );
                events.push(
                    ChangeEvent::new(EventKind::RelationshipCreated, created.id, &agent_id)
                        .with_summary(json!({
                            "parent_task_id": task_id,
                            "child_task_id": created.id,
                            "relationship_type": RelationshipType::Followup,
                        })),
                );
                followup_task_id = Some(created.id);
            }

            Ok((
                CompleteResult {
                    task: stored,
                    verified: false,
                    followup_task_id,
                },
                events,
            ))
        })?;

        self.emit_all(events);
        Ok(result)
    }

    /// Verify a complete, unverified task.
    pub fn verify(
        &self,
        task_id: i64,
        agent_id: &str,
        notes: Option<&str>,
    ) -> Result<Task, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let (task, event) = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;
            if task.task_status != TaskStatus::Complete {
                return Err(EngineError::InvalidTransition {
                    task_id,
                    detail: format!(
                        "only complete tasks can be verified; status is '{}'",
                        task.task_status
                    ),
                });
            }
            if task.verification_status == VerificationStatus::Verified {
                return Err(EngineError::InvalidTransition {
                    task_id,
                    detail: "task is already verified".into(),
                });
            }
            let stored = verify_in_txn(txn, &task, &agent_id, notes)?;
            let event = ChangeEvent::new(EventKind::TaskVerified, task_id, &agent_id)
                .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null));
            Ok((stored, event))
        })?;
        self.events.publish(event);
        Ok(task)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Unlock
    // ─────────────────────────────────────────────────────────────────────

    /// Release a reservation held by `agent_id`.
    pub fn unlock(&self, task_id: i64, agent_id: &str) -> Result<Task, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let (task, event) = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;
            if task.task_status != TaskStatus::InProgress {
                return Err(EngineError::InvalidTransition {
                    task_id,
                    detail: format!("cannot unlock a task in status '{}'", task.task_status),
                });
            }
            match task.assigned_agent.as_deref() {
                Some(assigned) if assigned == agent_id => {}
                Some(assigned) => {
                    return Err(EngineError::NotAssigned {
                        entity: "Task",
                        id: task_id,
                        assigned: assigned.to_string(),
                        caller: agent_id.clone(),
                    })
                }
                None => {
                    return Err(EngineError::Fatal(format!(
                        "task {task_id} is in_progress with no assigned agent"
                    )))
                }
            }
            let stored = unlock_in_txn(txn, &task, &agent_id, None)?;
            let event = ChangeEvent::new(EventKind::TaskUnlocked, task_id, &agent_id)
                .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null));
            Ok((stored, event))
        })?;
        self.events.publish(event);
        Ok(task)
    }

    /// Sweeper path: unlock a reservation that exceeded the lease timeout.
    ///
    /// Re-checks staleness inside the writer transaction; returns `None`
    /// when the task was completed, unlocked, or refreshed in the meantime.
    pub fn auto_unlock(&self, task_id: i64) -> Result<Option<Task>, EngineError> {
        let timeout_hours = self.config.stale_timeout_hours;
        let (unlocked, event) = self.store.with_write(|txn| {
            let Some(task) = TaskRepo::get(txn, task_id)? else {
                return Ok((None, None));
            };
            if task.task_status != TaskStatus::InProgress {
                return Ok((None, None));
            }
            let Some(assigned_at) = task.assigned_at.clone() else {
                return Ok((None, None));
            };
            let held_hours = match hours_between(&assigned_at, &now_iso()) {
                Some(h) if h > timeout_hours => h,
                _ => return Ok((None, None)),
            };
            let previous_agent = task
                .assigned_agent
                .clone()
                .unwrap_or_else(|| "unknown".to_string());

            let reason = format!("auto-unlock after {held_hours:.1}h; previous={previous_agent}");
            let stored = unlock_in_txn(
                txn,
                &task,
                SWEEPER_ACTOR,
                Some(json!({
                    "auto_unlock": true,
                    "previous_agent": &previous_agent,
                    "held_hours": (held_hours * 10.0).round() / 10.0,
                    "reason": reason,
                })),
            )?;
            let event = ChangeEvent::new(EventKind::TaskUnlockedStale, task_id, SWEEPER_ACTOR)
                .with_summary(json!({
                    "previous_agent": &previous_agent,
                    "held_hours": (held_hours * 10.0).round() / 10.0,
                }));
            Ok((Some(stored), Some(event)))
        })?;
        if let Some(event) = event {
            self.events.publish(event);
        }
        Ok(unlocked)
    }

    /// Unlock several reservations atomically: either every id
    /// transitions, or none do and the per-id failures are reported.
    pub fn bulk_unlock(
        &self,
        task_ids: &[i64],
        agent_id: &str,
    ) -> Result<BulkUnlockResult, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        if task_ids.is_empty() {
            return Ok(BulkUnlockResult {
                success: true,
                outcomes: Vec::new(),
            });
        }

        let (result, events) = self.store.with_write(|txn| {
            // First pass: validate every id without touching anything.
            let mut failures: Vec<(i64, String)> = Vec::new();
            let mut tasks = Vec::with_capacity(task_ids.len());
            for &id in task_ids {
                match TaskRepo::get(txn, id)? {
                    None => failures.push((id, format!("NOT_FOUND: Task not found: {id}"))),
                    Some(task) => {
                        if task.task_status != TaskStatus::InProgress {
                            failures.push((
                                id,
                                format!(
                                    "INVALID_TRANSITION: cannot unlock a task in status '{}'",
                                    task.task_status
                                ),
                            ));
                        } else if task.assigned_agent.as_deref() != Some(agent_id.as_str()) {
                            let holder = task
                                .assigned_agent
                                .clone()
                                .unwrap_or_else(|| "none".to_string());
                            failures.push((
                                id,
                                format!(
                                    "NOT_ASSIGNED: Task {id} is assigned to '{holder}', not '{agent_id}'"
                                ),
                            ));
                        } else {
                            tasks.push(task);
                        }
                    }
                }
            }

            if !failures.is_empty() {
                // Nothing has been written; report per-id outcomes.
                let outcomes = task_ids
                    .iter()
                    .map(|&id| match failures.iter().find(|(fid, _)| *fid == id) {
                        Some((_, error)) => BulkUnlockOutcome {
                            task_id: id,
                            success: false,
                            error: Some(error.clone()),
                        },
                        None => BulkUnlockOutcome {
                            task_id: id,
                            success: false,
                            error: Some("rolled back: another task in the batch failed".into()),
                        },
                    })
                    .collect();
                return Ok((
                    BulkUnlockResult {
                        success: false,
                        outcomes,
                    },
                    Vec::new(),
                ));
            }

            // Second pass: all valid, transition every task.
            let mut events = Vec::with_capacity(tasks.len());
            for task in &tasks {
                let stored = unlock_in_txn(txn, task, &agent_id, None)?;
                events.push(
                    ChangeEvent::new(EventKind::TaskUnlocked, task.id, &agent_id)
                        .with_summary(change_summary(task, &stored).unwrap_or(Value::Null)),
                );
            }
            let outcomes = task_ids
                .iter()
                .map(|&id| BulkUnlockOutcome {
                    task_id: id,
                    success: true,
                    error: None,
                })
                .collect();
            Ok((
                BulkUnlockResult {
                    success: true,
                    outcomes,
                },
                events,
            ))
        })?;

        self.emit_all(events);
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Updates, cancellation, deletion
    // ─────────────────────────────────────────────────────────────────────

    /// Append an immutable narrative update. No state change.
    pub fn add_update(
        &self,
        task_id: i64,
        agent_id: &str,
        update_type: UpdateType,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<TaskUpdate, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "update content cannot be empty".into(),
            ));
        }
        let content = content.to_string();
        let metadata = metadata.cloned();
        let (update, event) = self.store.with_write(|txn| {
            if TaskRepo::get(txn, task_id)?.is_none() {
                return Err(EngineError::task_not_found(task_id));
            }
            let update = UpdateRepo::insert(
                txn,
                task_id,
                &agent_id,
                update_type,
                &content,
                metadata.as_ref(),
            )?;
            let event = ChangeEvent::new(EventKind::TaskUpdated, task_id, &agent_id)
                .with_summary(json!({ "update_type": update_type, "update_id": update.id }));
            Ok((update, event))
        })?;
        self.events.publish(event);
        Ok(update)
    }

    /// Cancel a task. Terminal: cancelled tasks never return to the pool.
    pub fn cancel(
        &self,
        task_id: i64,
        agent_id: &str,
        reason: Option<&str>,
    ) -> Result<Task, EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let reason = reason.map(str::to_string);
        let (task, event) = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;
            if task.task_status.is_terminal() {
                return Err(EngineError::InvalidTransition {
                    task_id,
                    detail: format!(
                        "cannot cancel a task in terminal status '{}'",
                        task.task_status
                    ),
                });
            }
            let mut next = task.clone();
            next.task_status = TaskStatus::Cancelled;
            next.assigned_agent = None;
            next.assigned_at = None;
            let stored = persist_mutation(txn, &task, &next, &agent_id)?;
            if let Some(ref reason) = reason {
                let _ = UpdateRepo::insert(
                    txn,
                    task_id,
                    &agent_id,
                    UpdateType::Note,
                    &format!("cancelled: {reason}"),
                    None,
                )?;
            }
            let event = ChangeEvent::new(EventKind::TaskUpdated, task_id, &agent_id)
                .with_summary(change_summary(&task, &stored).unwrap_or(Value::Null));
            Ok((stored, event))
        })?;
        self.events.publish(event);
        Ok(task)
    }

    /// Delete a task row. Relationships, tag links, and comments cascade;
    /// updates, change entries, and versions survive, and the deletion
    /// itself is the final audit entry.
    pub fn delete(&self, task_id: i64, agent_id: &str) -> Result<(), EngineError> {
        let agent_id = validate_agent(agent_id)?;
        let event = self.store.with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;
            let _ = TaskRepo::delete(txn, task_id)?;
            ChangeRepo::append_all(
                txn,
                task_id,
                &agent_id,
                foreman_core::types::ChangeType::Delete,
                &[("task".to_string(), Some(task.title.clone()), None)],
            )?;
            Ok(ChangeEvent::new(EventKind::TaskDeleted, task_id, &agent_id)
                .with_summary(json!({ "title": &task.title })))
        })?;
        self.events.publish(event);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared transaction helpers
// ─────────────────────────────────────────────────────────────────────────────

fn verify_in_txn(
    txn: &rusqlite::Connection,
    task: &Task,
    agent_id: &str,
    notes: Option<&str>,
) -> Result<Task, EngineError> {
    let mut next = task.clone();
    next.verification_status = VerificationStatus::Verified;
    let stored = persist_mutation(txn, task, &next, agent_id)?;
    // Verification notes go to the update log, not the task body, so the
    // version diff stays a pure verification_status change.
    if let Some(notes) = notes {
        let trimmed = notes.trim();
        if !trimmed.is_empty() {
            let _ = UpdateRepo::insert(txn, task.id, agent_id, UpdateType::Note, trimmed, None)?;
        }
    }
    Ok(stored)
}

/// Shared unlock path for manual, bulk, and sweeper unlocks. Records the
/// release as a finding-type update; sweeper metadata marks auto-unlocks.
fn unlock_in_txn(
    txn: &rusqlite::Connection,
    task: &Task,
    actor: &str,
    auto_metadata: Option<Value>,
) -> Result<Task, EngineError> {
    let mut next = task.clone();
    next.task_status = TaskStatus::Available;
    next.assigned_agent = None;
    next.assigned_at = None;
    let stored = persist_mutation(txn, task, &next, actor)?;

    let (content, metadata) = match auto_metadata {
        Some(metadata) => {
            let content = metadata
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("reservation auto-unlocked by {actor}"));
            (content, metadata)
        }
        None => (
            format!("reservation released by {actor}"),
            json!({ "auto_unlock": false, "unlocked_by": actor }),
        ),
    };
    let _ = UpdateRepo::insert(
        txn,
        task.id,
        actor,
        UpdateType::Finding,
        &content,
        Some(&metadata),
    )?;
    Ok(stored)
}

/// Scan recent finding updates for the auto-unlock marker.
pub(crate) fn stale_warning_for(
    conn: &rusqlite::Connection,
    task_id: i64,
) -> Result<Option<StaleWarning>, EngineError> {
    for finding in UpdateRepo::recent_findings(conn, task_id, 10)? {
        let Some(metadata) = finding.metadata.as_ref() else {
            continue;
        };
        if metadata.get("auto_unlock").and_then(Value::as_bool) == Some(true) {
            let previous_agent = metadata
                .get("previous_agent")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Ok(Some(StaleWarning {
                previous_agent,
                unlocked_at: finding.created_at.clone(),
                reason: finding.content.clone(),
            }));
        }
        if metadata.get("auto_unlock").and_then(Value::as_bool) == Some(false) {
            // A manual release since the last auto-unlock clears the flag.
            return Ok(None);
        }
    }
    Ok(None)
}
