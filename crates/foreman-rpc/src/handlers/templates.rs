//! Template and recurring-schedule tools.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use foreman_core::types::{TaskPriority, TaskType};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::{to_value, PRIORITIES, TASK_TYPES};

fn parse_task_type(s: &str) -> Result<TaskType, RpcError> {
    TaskType::parse(s).ok_or_else(|| RpcError::invalid_params(format!("invalid task_type '{s}'")))
}

fn variables_from(args: &Args<'_>) -> Result<BTreeMap<String, String>, RpcError> {
    let mut variables = BTreeMap::new();
    if let Some(object) = args.object("variables") {
        for (key, value) in object {
            let Some(value) = value.as_str() else {
                return Err(RpcError::invalid_params(format!(
                    "variable '{key}' must be a string"
                )));
            };
            let _ = variables.insert(key.clone(), value.to_string());
        }
    }
    Ok(variables)
}

/// Create a task template.
pub struct CreateTemplateHandler;

#[async_trait]
impl MethodHandler for CreateTemplateHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let template = ctx.foreman.lifecycle.create_template(
            args.req_str("name")?,
            args.req_str("title")?,
            parse_task_type(args.req_str("task_type")?)?,
            args.req_str("task_instruction")?,
            args.req_str("verification_instruction")?,
            args.str("priority").and_then(TaskPriority::parse),
            args.str("notes"),
        )?;
        Ok(json!({ "template_id": template.id, "template": to_value(&template)? }))
    }
}

/// List templates.
pub struct ListTemplatesHandler;

#[async_trait]
impl MethodHandler for ListTemplatesHandler {
    async fn handle(&self, _args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let templates = ctx.foreman.queries.list_templates()?;
        Ok(json!({ "templates": to_value(&templates)?, "count": templates.len() }))
    }
}

/// Fetch a template.
pub struct GetTemplateHandler;

#[async_trait]
impl MethodHandler for GetTemplateHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let template = ctx
            .foreman
            .queries
            .get_template(args.req_i64("template_id")?)?;
        Ok(json!({ "template": to_value(&template)? }))
    }
}

/// Instantiate a template with `{placeholder}` substitution.
pub struct CreateTaskFromTemplateHandler;

#[async_trait]
impl MethodHandler for CreateTaskFromTemplateHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let variables = variables_from(&args)?;
        let result = ctx.foreman.lifecycle.create_task_from_template(
            args.req_i64("template_id")?,
            args.req_str("agent_id")?,
            &variables,
            args.i64("project_id"),
            args.str("due_date").map(str::to_string),
        )?;
        Ok(json!({ "task_id": result.task.id, "task": to_value(&result.task)? }))
    }
}

/// Create a recurring schedule.
pub struct CreateRecurringHandler;

#[async_trait]
impl MethodHandler for CreateRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let schedule = ctx.foreman.lifecycle.create_recurring(
            args.req_str("name")?,
            args.req_str("title")?,
            parse_task_type(args.req_str("task_type")?)?,
            args.req_str("task_instruction")?,
            args.req_str("verification_instruction")?,
            args.str("priority").and_then(TaskPriority::parse),
            args.i64("project_id"),
            args.f64("interval_hours").ok_or_else(|| {
                RpcError::invalid_params("Missing required parameter 'interval_hours'")
            })?,
        )?;
        Ok(json!({ "recurring_task_id": schedule.id, "recurring_task": to_value(&schedule)? }))
    }
}

/// List schedules.
pub struct ListRecurringHandler;

#[async_trait]
impl MethodHandler for ListRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let active_only = args.bool("active_only").unwrap_or(false);
        let schedules = ctx.foreman.queries.list_recurring(active_only)?;
        Ok(json!({ "recurring_tasks": to_value(&schedules)?, "count": schedules.len() }))
    }
}

/// Fetch a schedule.
pub struct GetRecurringHandler;

#[async_trait]
impl MethodHandler for GetRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let schedule = ctx
            .foreman
            .queries
            .get_recurring(args.req_i64("recurring_task_id")?)?;
        Ok(json!({ "recurring_task": to_value(&schedule)? }))
    }
}

/// Update a schedule's mutable fields.
pub struct UpdateRecurringHandler;

#[async_trait]
impl MethodHandler for UpdateRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let schedule = ctx.foreman.lifecycle.update_recurring(
            args.req_i64("recurring_task_id")?,
            args.str("title"),
            args.str("task_instruction"),
            args.str("verification_instruction"),
            args.str("priority").and_then(TaskPriority::parse),
            args.f64("interval_hours"),
        )?;
        Ok(json!({ "recurring_task": to_value(&schedule)? }))
    }
}

/// Deactivate a schedule.
pub struct DeactivateRecurringHandler;

#[async_trait]
impl MethodHandler for DeactivateRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let schedule = ctx
            .foreman
            .lifecycle
            .deactivate_recurring(args.req_i64("recurring_task_id")?)?;
        Ok(json!({ "recurring_task": to_value(&schedule)? }))
    }
}

/// Instantiate a schedule now.
pub struct InstantiateRecurringHandler;

#[async_trait]
impl MethodHandler for InstantiateRecurringHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let result = ctx.foreman.lifecycle.instantiate_recurring(
            args.req_i64("recurring_task_id")?,
            args.req_str("agent_id")?,
        )?;
        Ok(json!({ "task_id": result.task.id, "task": to_value(&result.task)? }))
    }
}

/// Register the template and recurring tools.
const CREATE_TEMPLATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("name", ParamKind::Str).len_between(1, 100),
    ParamSpec::required("title", ParamKind::Str).len_between(3, 100),
    ParamSpec::required("task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::required("task_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::required("verification_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::optional("priority", ParamKind::Str).one_of(PRIORITIES),
    ParamSpec::optional("notes", ParamKind::Str).len_between(1, 10_000),
];
const LIST_TEMPLATES_PARAMS: &[ParamSpec] = &[];
const GET_TEMPLATE_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("template_id", ParamKind::Int).at_least(1.0)];
const CREATE_TASK_FROM_TEMPLATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("template_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::optional("variables", ParamKind::Object),
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("due_date", ParamKind::Str),
];
const CREATE_RECURRING_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("name", ParamKind::Str).len_between(1, 100),
    ParamSpec::required("title", ParamKind::Str).len_between(3, 100),
    ParamSpec::required("task_type", ParamKind::Str).one_of(TASK_TYPES),
    ParamSpec::required("task_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::required("verification_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::optional("priority", ParamKind::Str).one_of(PRIORITIES),
    ParamSpec::optional("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("interval_hours", ParamKind::Float).at_least(1.0),
];
const LIST_RECURRING_TASKS_PARAMS: &[ParamSpec] =
    &[ParamSpec::optional("active_only", ParamKind::Bool)];
const GET_RECURRING_TASK_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("recurring_task_id", ParamKind::Int).at_least(1.0)];
const UPDATE_RECURRING_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("recurring_task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("title", ParamKind::Str).len_between(3, 100),
    ParamSpec::optional("task_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::optional("verification_instruction", ParamKind::Str).len_between(10, 10_000),
    ParamSpec::optional("priority", ParamKind::Str).one_of(PRIORITIES),
    ParamSpec::optional("interval_hours", ParamKind::Float).at_least(1.0),
];
const DEACTIVATE_RECURRING_TASK_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("recurring_task_id", ParamKind::Int).at_least(1.0)];
const INSTANTIATE_RECURRING_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("recurring_task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "create_template",
            description: "Create a reusable task template with {placeholder} fields",
            params: CREATE_TEMPLATE_PARAMS,
        },
        CreateTemplateHandler,
    );
    registry.register(
        ToolSchema {
            name: "list_templates",
            description: "List all templates",
            params: LIST_TEMPLATES_PARAMS,
        },
        ListTemplatesHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_template",
            description: "Fetch a template by id",
            params: GET_TEMPLATE_PARAMS,
        },
        GetTemplateHandler,
    );
    registry.register(
        ToolSchema {
            name: "create_task_from_template",
            description: "Instantiate a template, substituting {placeholder} variables",
            params: CREATE_TASK_FROM_TEMPLATE_PARAMS,
        },
        CreateTaskFromTemplateHandler,
    );
    registry.register(
        ToolSchema {
            name: "create_recurring_task",
            description: "Create a schedule that instantiates a task every interval_hours",
            params: CREATE_RECURRING_TASK_PARAMS,
        },
        CreateRecurringHandler,
    );
    registry.register(
        ToolSchema {
            name: "list_recurring_tasks",
            description: "List recurring schedules",
            params: LIST_RECURRING_TASKS_PARAMS,
        },
        ListRecurringHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_recurring_task",
            description: "Fetch a recurring schedule by id",
            params: GET_RECURRING_TASK_PARAMS,
        },
        GetRecurringHandler,
    );
    registry.register(
        ToolSchema {
            name: "update_recurring_task",
            description: "Update a recurring schedule's mutable fields",
            params: UPDATE_RECURRING_TASK_PARAMS,
        },
        UpdateRecurringHandler,
    );
    registry.register(
        ToolSchema {
            name: "deactivate_recurring_task",
            description: "Deactivate a recurring schedule",
            params: DEACTIVATE_RECURRING_TASK_PARAMS,
        },
        DeactivateRecurringHandler,
    );
    registry.register(
        ToolSchema {
            name: "instantiate_recurring_task",
            description: "Create a task from a recurring schedule now",
            params: INSTANTIATE_RECURRING_TASK_PARAMS,
        },
        InstantiateRecurringHandler,
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

    #[tokio::test]
    async fn template_to_task() {
        let ctx = make_test_context();
        let registry = full_registry();
        let template = call(
            &ctx,
            &registry,
            "create_template",
            json!({
                "name": "bugfix",
                "title": "Fix {component} bug",
                "task_type": "concrete",
                "task_instruction": "Reproduce and fix the bug in {component}",
                "verification_instruction": "Regression test for {component} passes",
                "priority": "high",
            }),
        )
        .await;
        assert_eq!(template["success"], true);
        let template_id = template["template_id"].as_i64().unwrap();

        let task = call(
            &ctx,
            &registry,
            "create_task_from_template",
            json!({
                "template_id": template_id,
                "agent_id": "a1",
                "variables": {"component": "payments"},
            }),
        )
        .await;
        assert_eq!(task["success"], true);
        assert_eq!(task["task"]["title"], "Fix payments bug");
        assert_eq!(task["task"]["priority"], "high");
    }

    #[tokio::test]
    async fn non_string_variable_rejected() {
        let ctx = make_test_context();
        let registry = full_registry();
        let template = call(
            &ctx,
            &registry,
            "create_template",
            json!({
                "name": "t",
                "title": "A {x} title",
                "task_type": "concrete",
                "task_instruction": "Instruction body text",
                "verification_instruction": "Verification body text",
            }),
        )
        .await;
        let template_id = template["template_id"].as_i64().unwrap();

        let response = call(
            &ctx,
            &registry,
            "create_task_from_template",
            json!({"template_id": template_id, "agent_id": "a1", "variables": {"x": 5}}),
        )
        .await;
        assert_eq!(response["success"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("INVALID_PARAMS"));
    }

    #[tokio::test]
    async fn recurring_schedule_tools() {
        let ctx = make_test_context();
        let registry = full_registry();
        let schedule = call(
            &ctx,
            &registry,
            "create_recurring_task",
            json!({
                "name": "weekly-report",
                "title": "Write weekly report",
                "task_type": "concrete",
                "task_instruction": "Summarise the week's fleet activity",
                "verification_instruction": "Report posted to the channel",
                "interval_hours": 168,
            }),
        )
        .await;
        assert_eq!(schedule["success"], true);
        let id = schedule["recurring_task_id"].as_i64().unwrap();

        let instantiated = call(
            &ctx,
            &registry,
            "instantiate_recurring_task",
            json!({"recurring_task_id": id, "agent_id": "scheduler"}),
        )
        .await;
        assert_eq!(instantiated["success"], true);
        assert_eq!(instantiated["task"]["title"], "Write weekly report");

        let deactivated = call(
            &ctx,
            &registry,
            "deactivate_recurring_task",
            json!({"recurring_task_id": id}),
        )
        .await;
        assert_eq!(deactivated["recurring_task"]["active"], false);

        let listed = call(
            &ctx,
            &registry,
            "list_recurring_tasks",
            json!({"active_only": true}),
        )
        .await;
        assert_eq!(listed["count"], 0);
    }
}
