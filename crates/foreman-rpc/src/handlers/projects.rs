//! Project tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::to_value;

/// Create a project.
pub struct CreateProjectHandler;

#[async_trait]
impl MethodHandler for CreateProjectHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let project = ctx.foreman.lifecycle.create_project(
            args.req_str("name")?,
            args.str("local_path"),
            args.str("origin_url"),
            args.str("description"),
        )?;
        Ok(json!({ "project_id": project.id, "project": to_value(&project)? }))
    }
}

/// List projects.
pub struct ListProjectsHandler;

#[async_trait]
impl MethodHandler for ListProjectsHandler {
    async fn handle(&self, _args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let projects = ctx.foreman.queries.list_projects()?;
        Ok(json!({ "projects": to_value(&projects)?, "count": projects.len() }))
    }
}

/// Fetch a project.
pub struct GetProjectHandler;

#[async_trait]
impl MethodHandler for GetProjectHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let project = ctx
            .foreman
            .queries
            .get_project(args.req_i64("project_id")?)?;
        Ok(json!({ "project": to_value(&project)? }))
    }
}

/// Update the project description (the only mutable field).
pub struct UpdateProjectHandler;

#[async_trait]
impl MethodHandler for UpdateProjectHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let project = ctx
            .foreman
            .lifecycle
            .update_project_description(args.req_i64("project_id")?, args.str("description"))?;
        Ok(json!({ "project": to_value(&project)? }))
    }
}

/// Register the project tools.
const CREATE_PROJECT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("name", ParamKind::Str).len_between(1, 100),
    ParamSpec::optional("local_path", ParamKind::Str).len_between(1, 1_000),
    ParamSpec::optional("origin_url", ParamKind::Str).len_between(1, 1_000),
    ParamSpec::optional("description", ParamKind::Str).len_between(1, 10_000),
];
const LIST_PROJECTS_PARAMS: &[ParamSpec] = &[];
const GET_PROJECT_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("project_id", ParamKind::Int).at_least(1.0)];
const UPDATE_PROJECT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("project_id", ParamKind::Int).at_least(1.0),
    ParamSpec::optional("description", ParamKind::Str).len_between(1, 10_000),
];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "create_project",
            description: "Create a uniquely named project",
            params: CREATE_PROJECT_PARAMS,
        },
        CreateProjectHandler,
    );
    registry.register(
        ToolSchema {
            name: "list_projects",
            description: "List all projects",
            params: LIST_PROJECTS_PARAMS,
        },
        ListProjectsHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_project",
            description: "Fetch a project by id",
            params: GET_PROJECT_PARAMS,
        },
        GetProjectHandler,
    );
    registry.register(
        ToolSchema {
            name: "update_project",
            description: "Replace a project's description",
            params: UPDATE_PROJECT_PARAMS,
        },
        UpdateProjectHandler,
    );
}
