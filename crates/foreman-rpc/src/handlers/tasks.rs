//! Lifecycle tools: create, reserve, complete, verify, unlock, updates,
//! cancellation, deletion, and relationship linking.

use async_trait::async_trait;
use serde_json::{json, Value};

use foreman_core::types::{RelationshipType, TaskPriority, TaskType, UpdateType};
use foreman_engine::{CompleteParams, CreateTaskParams, FollowupSpec};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::{to_value, PRIORITIES, RELATIONSHIP_TYPES, TASK_TYPES, UPDATE_TYPES};

fn parse_task_type(s: &str) -> Result<TaskType, RpcError> {
    TaskType::parse(s).ok_or_else(|| RpcError::invalid_params(format!("invalid task_type '{s}'")))
}

fn parse_relationship(s: &str) -> Result<RelationshipType, RpcError> {
    RelationshipType::parse(s)
        .ok_or_else(|| RpcError::invalid_params(format!("invalid relationship_type '{s}'")))
}

/// Create a new task, optionally linked to a parent.
pub struct CreateTaskHandler;

#[async_trait]
impl MethodHandler for CreateTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params = CreateTaskParams {
            title: args.req_str("title")?.to_string(),
            task_type: parse_task_type(args.req_str("task_type")?)?,
            task_instruction: args.req_str("task_instruction")?.to_string(),
            verification_instruction: args.req_str("verification_instruction")?.to_string(),
            agent_id: args.req_str("agent_id")?.to_string(),
            project_id: args.i64("project_id"),
            parent_task_id: args.i64("parent_task_id"),
            relationship_type: args
                .str("relationship_type")
                .map(parse_relationship)
                .transpose()?,
            priority: args.str("priority").and_then(TaskPriority::parse),
            notes: args.str("notes").map(str::to_string),
            estimated_hours: args.f64("estimated_hours"),
            due_date: args.str("due_date").map(str::to_string),
        };
        let result = ctx.foreman.lifecycle.create_task(&params)?;
        let mut payload = json!({
            "task_id": result.task.id,
            "task": to_value(&result.task)?,
        });
        if let Some(rel_id) = result.relationship_id {
            payload["relationship_id"] = json!(rel_id);
        }
        Ok(payload)
    }
}

/// Atomically reserve an available task.
pub struct ReserveTaskHandler;

#[async_trait]
impl MethodHandler for ReserveTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        let result = ctx.foreman.lifecycle.reserve(task_id, agent_id)?;
        let mut payload = json!({ "task": to_value(&result.task)? });
        if let Some(warning) = result.stale_warning {
            payload["stale_warning"] = to_value(&warning)?;
        }
        Ok(payload)
    }
}

/// Complete a reserved task (or verify an already-complete one), with an
/// optional followup task.
pub struct CompleteTaskHandler;

#[async_trait]
impl MethodHandler for CompleteTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;

        let followup = match (
            args.str("followup_title"),
            args.str("followup_task_type"),
            args.str("followup_instruction"),
            args.str("followup_verification"),
        ) {
            (None, None, None, None) => None,
            (Some(title), Some(task_type), Some(instruction), Some(verification)) => {
                Some(FollowupSpec {
                    title: title.to_string(),
                    task_type: parse_task_type(task_type)?,
                    task_instruction: instruction.to_string(),
                    verification_instruction: verification.to_string(),
                })
            }
            _ => {
                return Err(RpcError::invalid_params(
                    "followup requires followup_title, followup_task_type, \
                     followup_instruction, and followup_verification together",
                ))
            }
        };

        let result = ctx.foreman.lifecycle.complete(
            task_id,
            agent_id,
            &CompleteParams {
                notes: args.str("notes").map(str::to_string),
                actual_hours: args.f64("actual_hours"),
                followup,
            },
        )?;

        let mut payload = json!({
            "task_id": task_id,
            "completed": !result.verified,
            "verified": result.verified,
            "task": to_value(&result.task)?,
        });
        if let Some(followup_id) = result.followup_task_id {
            payload["followup_task_id"] = json!(followup_id);
        }
        Ok(payload)
    }
}

/// Verify a complete, unverified task.
pub struct VerifyTaskHandler;

#[async_trait]
impl MethodHandler for VerifyTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        let task = ctx
            .foreman
            .lifecycle
            .verify(task_id, agent_id, args.str("notes"))?;
        Ok(json!({ "task_id": task_id, "task": to_value(&task)? }))
    }
}

/// Release a reservation.
pub struct UnlockTaskHandler;

#[async_trait]
impl MethodHandler for UnlockTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        let task = ctx.foreman.lifecycle.unlock(task_id, agent_id)?;
        Ok(json!({ "task_id": task_id, "task": to_value(&task)? }))
    }
}

/// Release several reservations atomically.
pub struct BulkUnlockTasksHandler;

#[async_trait]
impl MethodHandler for BulkUnlockTasksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_ids = args.req_i64_array("task_ids")?;
        let agent_id = args.req_str("agent_id")?;
        let result = ctx.foreman.lifecycle.bulk_unlock(&task_ids, agent_id)?;
        let unlocked: Vec<i64> = result
            .outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.task_id)
            .collect();
        Ok(json!({
            "all_unlocked": result.success,
            "unlocked_count": unlocked.len(),
            "unlocked_task_ids": unlocked,
            "outcomes": to_value(&result.outcomes)?,
        }))
    }
}

/// Append a narrative update.
pub struct AddTaskUpdateHandler;

#[async_trait]
impl MethodHandler for AddTaskUpdateHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        let update_type = args.req_str("update_type")?;
        let update_type = UpdateType::parse(update_type).ok_or_else(|| {
            RpcError::invalid_params(format!("invalid update_type '{update_type}'"))
        })?;
        let metadata = args.object("metadata").map(|m| Value::Object(m.clone()));
        let update = ctx.foreman.lifecycle.add_update(
            task_id,
            agent_id,
            update_type,
            args.req_str("content")?,
            metadata.as_ref(),
        )?;
        Ok(json!({ "update_id": update.id, "task_id": task_id }))
    }
}

/// Full working context for a task.
pub struct GetTaskContextHandler;

#[async_trait]
impl MethodHandler for GetTaskContextHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let context = ctx.foreman.queries.task_context(task_id)?;
        to_value(&context)
    }
}

/// Cancel a task (terminal).
pub struct CancelTaskHandler;

#[async_trait]
impl MethodHandler for CancelTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        let task = ctx
            .foreman
            .lifecycle
            .cancel(task_id, agent_id, args.str("reason"))?;
        Ok(json!({ "task_id": task_id, "task": to_value(&task)? }))
    }
}

/// Delete a task; the audit trail survives.
pub struct DeleteTaskHandler;

#[async_trait]
impl MethodHandler for DeleteTaskHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let agent_id = args.req_str("agent_id")?;
        ctx.foreman.lifecycle.delete(task_id, agent_id)?;
        Ok(json!({ "task_id": task_id, "deleted": true }))
    }
}

/// Link two existing tasks.
pub struct CreateTaskRelationshipHandler;

#[async_trait]
impl MethodHandler for CreateTaskRelationshipHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let relationship = ctx.foreman.lifecycle.add_relationship(
            args.req_i64("parent_task_id")?,
            args.req_i64("child_task_id")?,
            parse_relationship(args.req_str("relationship_type")?)?,
            args.req_str("agent_id")?,
        )?;
        Ok(json!({ "relationship_id": relationship.id, "relationship": to_value(&relationship)? }))
    }
}

/// Register the lifecycle tools.
const CREATE_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("title", ParamKind::Str).len_between(3, 100),
    ParamSpec::required("task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::required("task_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::required("verification_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("parent_task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("relationship_type", ParamKind::Str).one_of(RELATIONSHIP_TYPES),
    ParamSpec::optional("priority", ParamKind::Str).one_of(PRIORITIES),
    ParamSpec::optional("notes", ParamKind::Str).len_between(1, 10_000),
    ParamSpec::optional("estimated_hours", ParamKind::Float).at_least(0.1),
    ParamSpec::optional("due_date", ParamKind::Str),
];
const RESERVE_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const COMPLETE_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("notes", ParamKind::Str).len_between(1, 10_000),
    ParamSpec::optional("actual_hours", ParamKind::Float).at_least(0.1),
    ParamSpec::optional("followup_title", ParamKind::Str).len_between(3, 100),
    ParamSpec::optional("followup_task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::optional("followup_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::optional("followup_verification", ParamKind::Str).len_between(10, 10_000),
];
const VERIFY_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("notes", ParamKind::Str).len_between(1, 10_000),
];
const UNLOCK_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const BULK_UNLOCK_TASKS_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_ids", ParamKind::IntArray).len_between(1, 1_000),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const ADD_TASK_UPDATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::required("content", ParamKind::Str).len_between(1, 10_000),
    ParamSpec::required("update_type", ParamKind::Str).one_of(UPDATE_TYPES),
    ParamSpec::optional("metadata", ParamKind::Object),
];
const GET_TASK_CONTEXT_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];
const CANCEL_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("reason", ParamKind::Str).len_between(1, 1_000),
];
const DELETE_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const CREATE_TASK_RELATIONSHIP_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("parent_task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("child_task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("relationship_type", ParamKind::Str).one_of(RELATIONSHIP_TYPES),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "create_task",
            description: "Create a new task, optionally linked to a parent task",
            params: CREATE_TASK_PARAMS,
        },
        CreateTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "reserve_task",
            description: "Reserve (lock) an available task for an agent",
            params: RESERVE_TASK_PARAMS,
        },
        ReserveTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "complete_task",
            description: "Complete a reserved task, optionally creating a followup",
            params: COMPLETE_TASK_PARAMS,
        },
        CompleteTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "verify_task",
            description: "Mark a complete task's verification_status as verified",
            params: VERIFY_TASK_PARAMS,
        },
        VerifyTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "unlock_task",
            description: "Release a reservation back to the available pool",
            params: UNLOCK_TASK_PARAMS,
        },
        UnlockTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "bulk_unlock_tasks",
            description: "Atomically release several reservations (all-or-nothing)",
            params: BULK_UNLOCK_TASKS_PARAMS,
        },
        BulkUnlockTasksHandler,
    );
    registry.register(
        ToolSchema {
            name: "add_task_update",
            description: "Append an immutable progress/note/blocker/question/finding update",
            params: ADD_TASK_UPDATE_PARAMS,
        },
        AddTaskUpdateHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_task_context",
            description: "Task with project, ancestry, updates, recent changes, and stale info",
            params: GET_TASK_CONTEXT_PARAMS,
        },
        GetTaskContextHandler,
    );
    registry.register(
        ToolSchema {
            name: "cancel_task",
            description: "Cancel a task (terminal)",
            params: CANCEL_TASK_PARAMS,
        },
        CancelTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "delete_task",
            description: "Delete a task; its audit trail is retained",
            params: DELETE_TASK_PARAMS,
        },
        DeleteTaskHandler,
    );
    registry.register(
        ToolSchema {
            name: "create_task_relationship",
            description: "Link two existing tasks with a typed, cycle-checked edge",
            params: CREATE_TASK_RELATIONSHIP_PARAMS,
        },
        CreateTaskRelationshipHandler,
    );
}
