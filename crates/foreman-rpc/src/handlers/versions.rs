//! Version-log tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::to_value;

/// All versions of a task, newest first.
pub struct GetTaskVersionsHandler;

#[async_trait]
impl MethodHandler for GetTaskVersionsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let versions = ctx.foreman.queries.task_versions(task_id)?;
        Ok(json!({
            "task_id": task_id,
            "versions": to_value(&versions)?,
            "count": versions.len(),
        }))
    }
}

/// One specific version.
pub struct GetTaskVersionHandler;

#[async_trait]
impl MethodHandler for GetTaskVersionHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let version = ctx
            .foreman
            .queries
            .task_version(args.req_i64("task_id")?, args.req_i64("version_number")?)?;
        Ok(json!({ "version": to_value(&version)? }))
    }
}

/// The latest version.
pub struct GetLatestTaskVersionHandler;

#[async_trait]
impl MethodHandler for GetLatestTaskVersionHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let version = ctx
            .foreman
            .queries
            .latest_task_version(args.req_i64("task_id")?)?;
        Ok(json!({ "version": to_value(&version)? }))
    }
}

/// Field diff between two versions.
pub struct DiffTaskVersionsHandler;

#[async_trait]
impl MethodHandler for DiffTaskVersionsHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let v1 = args.req_i64("version_number_1")?;
        let v2 = args.req_i64("version_number_2")?;
        let diff = ctx.foreman.queries.diff_task_versions(task_id, v1, v2)?;
        let changed_fields: Vec<&str> = diff.iter().map(|d| d.field.as_str()).collect();
        Ok(json!({
            "task_id": task_id,
            "version_1": v1,
            "version_2": v2,
            "diff": to_value(&diff)?,
            "changed_fields": changed_fields,
        }))
    }
}

/// Register the version tools.
const GET_TASK_VERSIONS_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];
const GET_TASK_VERSION_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("version_number", ParamKind::Int).at_least(1.0),
];
const GET_LATEST_TASK_VERSION_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];
const DIFF_TASK_VERSIONS_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("version_number_1", ParamKind::Int).at_least(1.0),
    ParamSpec::required("version_number_2", ParamKind::Int).at_least(1.0),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "get_task_versions",
            description: "All snapshots of a task, newest first",
            params: GET_TASK_VERSIONS_PARAMS,
        },
        GetTaskVersionsHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_task_version",
            description: "One snapshot by version number",
            params: GET_TASK_VERSION_PARAMS,
        },
        GetTaskVersionHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_latest_task_version",
            description: "The most recent snapshot",
            params: GET_LATEST_TASK_VERSION_PARAMS,
        },
        GetLatestTaskVersionHandler,
    );
    registry.register(
        ToolSchema {
            name: "diff_task_versions",
            description: "Changed fields between two snapshots (v2 must exceed v1)",
            params: DIFF_TASK_VERSIONS_PARAMS,
        },
        DiffTaskVersionsHandler,
    );
}
