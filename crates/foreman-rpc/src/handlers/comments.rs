//! Comment tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::to_value;

/// Add a comment, optionally as a reply.
pub struct CreateCommentHandler;

#[async_trait]
impl MethodHandler for CreateCommentHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let mentions = args.str_array("mentions").unwrap_or_default();
        let comment = ctx.foreman.lifecycle.create_comment(
            args.req_i64("task_id")?,
            args.req_str("agent_id")?,
            args.req_str("content")?,
            args.i64("parent_comment_id"),
            &mentions,
        )?;
        Ok(json!({ "comment_id": comment.id, "comment": to_value(&comment)? }))
    }
}

/// Fetch a comment.
pub struct GetCommentHandler;

#[async_trait]
impl MethodHandler for GetCommentHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let comment = ctx
            .foreman
            .queries
            .get_comment(args.req_i64("comment_id")?)?;
        Ok(json!({ "comment": to_value(&comment)? }))
    }
}

/// Edit a comment (author only).
pub struct UpdateCommentHandler;

#[async_trait]
impl MethodHandler for UpdateCommentHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let comment = ctx.foreman.lifecycle.update_comment(
            args.req_i64("comment_id")?,
            args.req_str("agent_id")?,
            args.req_str("content")?,
        )?;
        Ok(json!({ "comment": to_value(&comment)? }))
    }
}

/// Delete a comment and its replies (author only).
pub struct DeleteCommentHandler;

#[async_trait]
impl MethodHandler for DeleteCommentHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let comment_id = args.req_i64("comment_id")?;
        ctx.foreman
            .lifecycle
            .delete_comment(comment_id, args.req_str("agent_id")?)?;
        Ok(json!({ "comment_id": comment_id, "deleted": true }))
    }
}

/// A comment and its reply subtree.
pub struct GetCommentThreadHandler;

#[async_trait]
impl MethodHandler for GetCommentThreadHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let thread = ctx
            .foreman
            .queries
            .comment_thread(args.req_i64("comment_id")?)?;
        Ok(json!({ "comments": to_value(&thread)?, "count": thread.len() }))
    }
}

/// All comments on a task.
pub struct GetTaskCommentsHandler;

#[async_trait]
impl MethodHandler for GetTaskCommentsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let comments = ctx.foreman.queries.task_comments(task_id)?;
        Ok(json!({
            "task_id": task_id,
            "comments": to_value(&comments)?,
            "count": comments.len(),
        }))
    }
}

/// Register the comment tools.
const CREATE_COMMENT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::required("content", ParamKind::Str).len_between(1, 10_000),
    ParamSpec::optional("parent_comment_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("mentions", ParamKind::StrArray).len_between(1, 50),
];
const GET_COMMENT_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("comment_id", ParamKind::Int).at_least(1.0)];
const UPDATE_COMMENT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("comment_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::required("content", ParamKind::Str).len_between(1, 10_000),
];
const DELETE_COMMENT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("comment_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
];
const GET_COMMENT_THREAD_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("comment_id", ParamKind::Int).at_least(1.0)];
const GET_TASK_COMMENTS_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "create_comment",
            description: "Add a comment to a task, optionally replying to another comment",
            params: CREATE_COMMENT_PARAMS,
        },
        CreateCommentHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_comment",
            description: "Fetch a comment by id",
            params: GET_COMMENT_PARAMS,
        },
        GetCommentHandler,
    );
    registry.register(
        ToolSchema {
            name: "update_comment",
            description: "Edit a comment (author only)",
            params: UPDATE_COMMENT_PARAMS,
        },
        UpdateCommentHandler,
    );
    registry.register(
        ToolSchema {
            name: "delete_comment",
            description: "Delete a comment and its reply subtree (author only)",
            params: DELETE_COMMENT_PARAMS,
        },
        DeleteCommentHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_comment_thread",
            description: "A comment and its reply subtree, oldest first",
            params: GET_COMMENT_THREAD_PARAMS,
        },
        GetCommentThreadHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_task_comments",
            description: "All comments on a task, oldest first",
            params: GET_TASK_COMMENTS_PARAMS,
        },
        GetTaskCommentsHandler,
    );
}
