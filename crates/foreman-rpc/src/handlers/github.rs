//! GitHub link tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};
use crate::schema::{Args, ParamKind, ParamSpec, ToolSchema};

use super::to_value;

/// Link a GitHub issue to a task.
pub struct LinkGithubIssueHandler;

#[async_trait]
impl MethodHandler for LinkGithubIssueHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let task = ctx.foreman.lifecycle.link_github_issue(
            task_id,
            args.req_str("agent_id")?,
            args.req_str("url")?,
        )?;
        Ok(json!({ "task_id": task_id, "github_issue_url": task.github_issue_url }))
    }
}

/// Link a GitHub pull request to a task.
pub struct LinkGithubPrHandler;

#[async_trait]
impl MethodHandler for LinkGithubPrHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let task_id = args.req_i64("task_id")?;
        let task = ctx.foreman.lifecycle.link_github_pr(
            task_id,
            args.req_str("agent_id")?,
            args.req_str("url")?,
        )?;
        Ok(json!({ "task_id": task_id, "github_pr_url": task.github_pr_url }))
    }
}

/// Both GitHub links for a task.
pub struct GetGithubLinksHandler;

#[async_trait]
impl MethodHandler for GetGithubLinksHandler {
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let links = ctx.foreman.queries.github_links(args.req_i64("task_id")?)?;
        to_value(&links)
    }
}

/// Register the GitHub link tools.
const LINK_GITHUB_ISSUE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::required("url", ParamKind::Str).len_between(1, 500),
];
const LINK_GITHUB_PR_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("task_id", ParamKind::Int).at_least(1.0),
    ParamSpec::required("agent_id", ParamKind::Str).len_between(1, 200),
    ParamSpec::required("url", ParamKind::Str).len_between(1, 500),
];
const GET_GITHUB_LINKS_PARAMS: &[ParamSpec] =
    &[ParamSpec::required("task_id", ParamKind::Int).at_least(1.0)];

pub fn register(registry: &mut MethodRegistry) {
    registry.register(
        ToolSchema {
            name: "link_github_issue",
            description: "Attach a GitHub issue URL to a task (at most one)",
            params: LINK_GITHUB_ISSUE_PARAMS,
        },
        LinkGithubIssueHandler,
    );
    registry.register(
        ToolSchema {
            name: "link_github_pr",
            description: "Attach a GitHub pull-request URL to a task (at most one)",
            params: LINK_GITHUB_PR_PARAMS,
        },
        LinkGithubPrHandler,
    );
    registry.register(
        ToolSchema {
            name: "get_github_links",
            description: "Both GitHub links for a task",
            params: GET_GITHUB_LINKS_PARAMS,
        },
        GetGithubLinksHandler,
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
    async fn link_and_fetch() {
        let ctx = make_test_context();
        let registry = full_registry();
        let created = call(
            &ctx,
            &registry,
            "create_task",
            json!({
                "title": "Issue-tracked work",
                "task_type": "concrete",
                "task_instruction": "Fix the reported regression",
                "verification_instruction": "The linked issue closes",
                "agent_id": "a1",
            }),
        )
        .await;
        let task_id = created["task_id"].as_i64().unwrap();

        let linked = call(
            &ctx,
            &registry,
            "link_github_issue",
            json!({
                "task_id": task_id,
                "agent_id": "a1",
                "url": "https://github.com/acme/api/issues/12",
            }),
        )
        .await;
        assert_eq!(linked["success"], true);

        let links = call(
            &ctx,
            &registry,
            "get_github_links",
            json!({"task_id": task_id}),
        )
        .await;
        assert_eq!(
            links["github_issue_url"],
            "https://github.com/acme/api/issues/12"
        );
        assert_eq!(links["github_pr_url"], Value::Null);
    }

    #[tokio::test]
    async fn second_link_conflicts() {
        let ctx = make_test_context();
        let registry = full_registry();
        let created = call(
            &ctx,
            &registry,
            "create_task",
            json!({
                "title": "Single-issue work",
                "task_type": "concrete",
                "task_instruction": "Only one issue may attach",
                "verification_instruction": "Second link is refused",
                "agent_id": "a1",
            }),
        )
        .await;
        let task_id = created["task_id"].as_i64().unwrap();

        call(
            &ctx,
            &registry,
            "link_github_issue",
            json!({"task_id": task_id, "agent_id": "a1", "url": "https://github.com/acme/api/issues/1"}),
        )
        .await;
        let response = call(
            &ctx,
            &registry,
            "link_github_issue",
            json!({"task_id": task_id, "agent_id": "a1", "url": "https://github.com/acme/api/issues/2"}),
        )
        .await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().starts_with("CONFLICT"));
    }
}
