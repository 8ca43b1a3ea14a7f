//! Read-side tools: availability, structured queries, search, deadlines,
//! stale scans, and the activity feed.

use async_trait::async_trait;
use serde_json::{json, Value};

use foreman_core::types::{AgentType, TaskFilter, TaskOrder, TaskPriority, TaskStatus, TaskType};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::{to_value, AGENT_TYPES, ORDERINGS, PRIORITIES, TASK_STATUSES, TASK_TYPES};

fn filter_from_args(args: &Args<'_>) -> Result<TaskFilter, RpcError> {
    let order_by = match args.str("order_by") {
        Some(raw) => TaskOrder::parse(raw)
            .ok_or_else(|| RpcError::invalid_params(format!("invalid order_by '{raw}'")))?,
        None => TaskOrder::default(),
    };
    Ok(TaskFilter {
        project_id: args.i64("project_id"),
        task_type: args.str("task_type").and_then(TaskType::parse),
        task_status: args.str("task_status").and_then(TaskStatus::parse),
        assigned_agent: args.str("agent_id").map(str::to_string),
        priority: args.str("priority").and_then(TaskPriority::parse),
        tag_id: args.i64("tag_id"),
        tag_ids: args.i64_array("tag_ids"),
        order_by,
    })
}

const FILTER_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("project_id", ParamKind::Int),
    ParamSpec::optional("task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::optional("task_status", ParamKind::Str).one_of(TASK_STATUSES),
    ParamSpec::optional("agent_id", ParamKind::Str),
    ParamSpec::optional("priority", ParamKind::Str).one_of(PRIORITIES),
    ParamSpec::optional("tag_id", ParamKind::Int),
    ParamSpec::optional("tag_ids", ParamKind::IntArray).len_between(1, 50),
    ParamSpec::optional("order_by", ParamKind::Str).one_of(ORDERINGS),
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
];

/// Available tasks for an agent type, dependency-aware.
pub struct ListAvailableTasksHandler;

#[async_trait]
impl MethodHandler for ListAvailableTasksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let agent_type = args.req_str("agent_type")?;
        let agent_type = AgentType::parse(agent_type).ok_or_else(|| {
            RpcError::invalid_params(format!("invalid agent_type '{agent_type}'"))
        })?;
        let limit = args.i64("limit").unwrap_or(10) as u32;
        let tasks =
            ctx.foreman
                .queries
                .list_available(agent_type, args.i64("project_id"), limit)?;
        Ok(json!({ "tasks": to_value(&tasks)?, "count": tasks.len() }))
    }
}

/// Structured filtered query.
pub struct QueryTasksHandler;

#[async_trait]
impl MethodHandler for QueryTasksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let filter = filter_from_args(&args)?;
        let limit = args.i64("limit").unwrap_or(100) as u32;
        let tasks = ctx.foreman.queries.query(&filter, limit)?;
        Ok(json!({ "tasks": to_value(&tasks)?, "count": tasks.len() }))
    }
}

/// Lightweight summaries with the same filters as `query_tasks`.
pub struct GetTaskSummaryHandler;

#[async_trait]
impl MethodHandler for GetTaskSummaryHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let filter = filter_from_args(&args)?;
        let limit = args.i64("limit").unwrap_or(100) as u32;
        let summaries = ctx.foreman.queries.summary(&filter, limit)?;
        Ok(json!({ "tasks": to_value(&summaries)?, "count": summaries.len() }))
    }
}

/// Case-insensitive substring search.
pub struct SearchTasksHandler;

#[async_trait]
impl MethodHandler for SearchTasksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let query = args.req_str("query")?;
        let limit = args.i64("limit").unwrap_or(100) as u32;
        let tasks = ctx.foreman.queries.search(query, limit)?;
        Ok(json!({ "tasks": to_value(&tasks)?, "count": tasks.len() }))
    }
}

/// In-progress tasks exceeding the lease timeout.
pub struct QueryStaleTasksHandler;

#[async_trait]
impl MethodHandler for QueryStaleTasksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let (tasks, timeout_hours) = ctx.foreman.queries.stale(args.f64("hours"))?;
        Ok(json!({
            "stale_tasks": to_value(&tasks)?,
            "count": tasks.len(),
            "timeout_hours": timeout_hours,
        }))
    }
}

/// Tasks with a due date inside the coming window.
pub struct ApproachingDeadlineHandler;

#[async_trait]
impl MethodHandler for ApproachingDeadlineHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let days_ahead = args.f64("days_ahead").unwrap_or(3.0);
        let limit = args.i64("limit").unwrap_or(100) as u32;
        let tasks = ctx
            .foreman
            .queries
            .approaching_deadline(days_ahead, limit)?;
        Ok(json!({
            "tasks": to_value(&tasks)?,
            "count": tasks.len(),
            "days_ahead": days_ahead,
        }))
    }
}

/// Merged change-entry/update feed.
pub struct GetActivityFeedHandler;

#[async_trait]
impl MethodHandler for GetActivityFeedHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let limit = args.i64("limit").unwrap_or(1000) as u32;
        let feed = ctx.foreman.queries.activity_feed(
            args.i64("task_id"),
            args.str("agent_id"),
            args.str("start_date"),
            args.str("end_date"),
            limit,
        )?;
        Ok(json!({ "feed": to_value(&feed)?, "count": feed.len() }))
    }
}

/// Register the query tools.
const LIST_AVAILABLE_TASKS_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("agent_type", ParamKind::Str).one_of(AGENT_TYPES),
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
];
const SEARCH_TASKS_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("query", ParamKind::Str).len_between(1, 500),
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
];
const QUERY_STALE_TASKS_PARAMS: &[ParamSpec] =
    &[ParamSpec::optional("hours", ParamKind::Float).at_least(0.1)];
const GET_TASKS_APPROACHING_DEADLINE_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("days_ahead", ParamKind::Float).between(0.1, 365.0),
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
];
const GET_ACTIVITY_FEED_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("agent_id", ParamKind::Str),
    ParamSpec::optional("start_date", ParamKind::Str),
    ParamSpec::optional("end_date", ParamKind::Str),
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "list_available_tasks",
            description: "Available, unblocked tasks matching the agent-type projection",
            params: LIST_AVAILABLE_TASKS_PARAMS,
        },
        ListAvailableTasksHandler,
    );
    registry.register(
        ToolSchema {
            name: "query_tasks",
            description: "Structured task query with filters and ordering",
            params: FILTER_PARAMS,
        },
        QueryTasksHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_task_summary",
            description: "Lightweight task summaries with the same filters as query_tasks",
            params: FILTER_PARAMS,
        },
        GetTaskSummaryHandler,
    );
    registry.register(
        ToolSchema {
            name: "search_tasks",
            description: "Case-insensitive substring search over titles, instructions, and notes",
            params: SEARCH_TASKS_PARAMS,
        },
        SearchTasksHandler,
    );
    registry.register(
        ToolSchema {
            name: "query_stale_tasks",
            description: "In-progress tasks held past the lease timeout",
            params: QUERY_STALE_TASKS_PARAMS,
        },
        QueryStaleTasksHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_tasks_approaching_deadline",
            description: "Open tasks due within the next days_ahead days",
            params: GET_TASKS_APPROACHING_DEADLINE_PARAMS,
        },
        ApproachingDeadlineHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_activity_feed",
            description: "Merged audit-trail and update feed in chronological order",
            params: GET_ACTIVITY_FEED_PARAMS,
        },
        GetActivityFeedHandler,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_helpers::make_test_context;
    use crate::types::RpcRequest;

    fn full_registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        crate::handlers::register_all(&mut registry);
        registry
    }

    async fn call(
        ctx: &RpcContext,
        registry: &MethodRegistry,
        method: &str,
        params: Value,
    ) -> Value {
        registry
            .dispatch(
                &RpcRequest {
                    id: None,
                    method: method.to_string(),
                    params: Some(params),
                },
                ctx,
            )
            .await
    }

    async fn seed_task(ctx: &RpcContext, registry: &MethodRegistry, title: &str) -> i64 {
        let created = call(
            ctx,
            registry,
            "create_task",
            json!({
                "title": title,
                "task_type": "concrete",
                "task_instruction": "Do a meaningful unit of work",
                "verification_instruction": "Check the work holds up",
                "agent_id": "a1",
            }),
        )
        .await;
        created["task_id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn list_available_default_limit() {
        let ctx = make_test_context();
        let registry = full_registry();
        for i in 0..3 {
            seed_task(&ctx, &registry, &format!("Task number {i}")).await;
        }
        let response = call(
            &ctx,
            &registry,
            "list_available_tasks",
            json!({"agent_type": "implementation"}),
        )
        .await;
        assert_eq!(response["success"], true);
        assert_eq!(response["count"], 3);
    }

    #[tokio::test]
    async fn list_available_rejects_bad_agent_type() {
        let ctx = make_test_context();
        let registry = full_registry();
        let response = call(
            &ctx,
            &registry,
            "list_available_tasks",
            json!({"agent_type": "manager"}),
        )
        .await;
        assert_eq!(response["success"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("INVALID_PARAMS"));
    }

    #[tokio::test]
    async fn query_limit_boundary() {
        let ctx = make_test_context();
        let registry = full_registry();
        let ok = call(&ctx, &registry, "query_tasks", json!({"limit": 1000})).await;
        assert_eq!(ok["success"], true);
        let too_big = call(&ctx, &registry, "query_tasks", json!({"limit": 1001})).await;
        assert_eq!(too_big["success"], false);
    }

    #[tokio::test]
    async fn search_returns_matches() {
        let ctx = make_test_context();
        let registry = full_registry();
        seed_task(&ctx, &registry, "Fix payment flow").await;
        seed_task(&ctx, &registry, "Unrelated work").await;

        let response = call(&ctx, &registry, "search_tasks", json!({"query": "payment"})).await;
        assert_eq!(response["count"], 1);
        assert_eq!(response["tasks"][0]["title"], "Fix payment flow");
    }

    #[tokio::test]
    async fn stale_query_reports_timeout() {
        let ctx = make_test_context();
        let registry = full_registry();
        let response = call(&ctx, &registry, "query_stale_tasks", json!({})).await;
        assert_eq!(response["success"], true);
        assert_eq!(response["count"], 0);
        assert_eq!(response["timeout_hours"], 24.0);
    }

    #[tokio::test]
    async fn activity_feed_for_task() {
        let ctx = make_test_context();
        let registry = full_registry();
        let task_id = seed_task(&ctx, &registry, "Task with history").await;
        call(
            &ctx,
            &registry,
            "add_task_update",
            json!({"task_id": task_id, "agent_id": "a1", "content": "note", "update_type": "note"}),
        )
        .await;

        let response = call(
            &ctx,
            &registry,
            "get_activity_feed",
            json!({"task_id": task_id}),
        )
        .await;
        assert_eq!(response["success"], true);
        assert!(response["count"].as_i64().unwrap() > 1);
        let entries = response["feed"].as_array().unwrap();
        assert!(entries.iter().any(|e| e["entry_type"] == "change"));
        assert!(entries.iter().any(|e| e["entry_type"] == "update"));
    }

    #[tokio::test]
    async fn summary_returns_projection_only() {
        let ctx = make_test_context();
        let registry = full_registry();
        seed_task(&ctx, &registry, "Projected").await;
        let response = call(&ctx, &registry, "get_task_summary", json!({})).await;
        let task = &response["tasks"][0];
        assert!(task.get("title").is_some());
        assert!(task.get("task_instruction").is_none());
    }
}
