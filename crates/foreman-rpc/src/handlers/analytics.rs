//! Statistics and performance tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use foreman_core::types::TaskType;
use foreman_store::repository::StatisticsFilter;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::{to_value, TASK_TYPES};

/// Aggregate counts by status, type, and project.
pub struct GetTaskStatisticsHandler;

#[async_trait]
impl MethodHandler for GetTaskStatisticsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let filter = StatisticsFilter {
            project_id: args.i64("project_id"),
            task_type: args.str("task_type").and_then(TaskType::parse),
            start_date: args.str("start_date").map(str::to_string),
            end_date: args.str("end_date").map(str::to_string),
        };
        let stats = ctx.foreman.queries.statistics(&filter)?;
        to_value(&stats)
    }
}

/// Recently completed tasks, newest first.
pub struct GetRecentCompletionsHandler;

#[async_trait]
impl MethodHandler for GetRecentCompletionsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let limit = args.i64("limit").unwrap_or(10) as u32;
        let completions = ctx.foreman.queries.recent_completions(
            limit,
            args.i64("project_id"),
            args.f64("hours"),
        )?;
        Ok(json!({ "tasks": to_value(&completions)?, "count": completions.len() }))
    }
}

/// Per-agent completion aggregates.
pub struct GetAgentPerformanceHandler;

#[async_trait]
impl MethodHandler for GetAgentPerformanceHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let agent_id = args.req_str("agent_id")?;
        let task_type = args.str("task_type").and_then(TaskType::parse);
        let performance = ctx.foreman.queries.agent_performance(agent_id, task_type)?;
        to_value(&performance)
    }
}

/// Register the analytics tools.
const GET_TASK_STATISTICS_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::optional("start_date", ParamKind::Str),
    ParamSpec::optional("end_date", ParamKind::Str),
];
const GET_RECENT_COMPLETIONS_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("limit", ParamKind::Int).between(1.0, 1000.0),
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("hours", ParamKind::Float).at_least(0.1),
];
const GET_AGENT_PERFORMANCE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("task_type", ParamKind::Str).one_of(TASK_TYPES),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "get_task_statistics",
            description: "Totals, counts by status/type/project, and completion rate",
            params: GET_TASK_STATISTICS_PARAMS,
        },
        GetTaskStatisticsHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_recent_completions",
            description: "Recently completed task summaries, newest first",
            params: GET_RECENT_COMPLETIONS_PARAMS,
        },
        GetRecentCompletionsHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_agent_performance",
            description: "Completion count, mean hours, and success rate for an agent",
            params: GET_AGENT_PERFORMANCE_PARAMS,
        },
        GetAgentPerformanceHandler,
    );
}
