//! Tag tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::to_value;

/// Create a uniquely named tag.
pub struct CreateTagHandler;

#[async_trait]
impl MethodHandler for CreateTagHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let tag = ctx.foreman.lifecycle.create_tag(args.req_str("name")?)?;
        Ok(json!({ "tag_id": tag.id, "tag": to_value(&tag)? }))
    }
}

/// List all tags.
pub struct ListTagsHandler;

#[async_trait]
impl MethodHandler for ListTagsHandler {
    async fn handle(&self, _args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let tags = ctx.foreman.queries.list_tags()?;
        Ok(json!({ "tags": to_value(&tags)?, "count": tags.len() }))
    }
}

/// Assign a tag to a task (idempotent).
pub struct AssignTagHandler;

#[async_trait]
impl MethodHandler for AssignTagHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let tag = ctx.foreman.lifecycle.assign_tag(
            task_id,
            args.req_i64("tag_id")?,
            args.req_str("agent_id")?,
        )?;
        Ok(json!({ "task_id": task_id, "tag": to_value(&tag)? }))
    }
}

/// Remove a tag from a task; removing an absent link is a no-op success.
pub struct RemoveTagHandler;

#[async_trait]
impl MethodHandler for RemoveTagHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let removed = ctx.foreman.lifecycle.remove_tag(
            task_id,
            args.req_i64("tag_id")?,
            args.req_str("agent_id")?,
        )?;
        Ok(json!({ "task_id": task_id, "removed": removed }))
    }
}

/// Tags on a task.
pub struct GetTaskTagsHandler;

#[async_trait]
impl MethodHandler for GetTaskTagsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let tags = ctx.foreman.queries.task_tags(task_id)?;
        Ok(json!({ "task_id": task_id, "tags": to_value(&tags)?, "count": tags.len() }))
    }
}

/// Register the tag tools.
const CREATE_TAG_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("name", ParamKind::Str).len_between(1, 100)];
const LIST_TAGS_PARAMS: &[ParamSpec] = &[];
const ASSIGN_TAG_TO_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("tag_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const REMOVE_TAG_FROM_TASK_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("tag_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const GET_TASK_TAGS_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "create_tag",
            description: "Create a uniquely named tag",
            params: CREATE_TAG_PARAMS,
        },
        CreateTagHandler,
    );
    registry.register(
        ToolSchema {
            name: "list_tags",
            description: "List all tags",
            params: LIST_TAGS_PARAMS,
        },
        ListTagsHandler,
    );
    registry.register(
        ToolSchema {
            name: "assign_tag_to_task",
            description: "Assign a tag to a task",
            params: ASSIGN_TAG_TO_TASK_PARAMS,
        },
        AssignTagHandler,
    );
    registry.register(
        ToolSchema {
            name: "remove_tag_from_task",
            description: "Remove a tag from a task (no-op when absent)",
            params: REMOVE_TAG_FROM_TASK_PARAMS,
        },
        RemoveTagHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_task_tags",
            description: "Tags assigned to a task",
            params: GET_TASK_TAGS_PARAMS,
        },
        GetTaskTagsHandler,
    );
}
