//! Method registry and async dispatch.
//!
//! Each tool registers its schema alongside its handler; dispatch
//! validates parameters against the schema before the handler runs, so a
//! validation failure can never have side effects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::schema::{self, Args, ToolSchema};
use crate::types::{error_response, success_response, RpcRequest};

/// Trait implemented by every tool handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute with validated arguments. The returned object's fields merge
    /// into the response next to `success: true`.
    async fn handle(&self, args: Args<'_>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

struct Entry {
    schema: ToolSchema,
    handler: Arc<dyn MethodHandler>,
}

/// Registry mapping tool names to schemas and handlers.
pub struct MethodRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl MethodRegistry {
    /// Maximum time a single handler is allowed to run. On expiry the
    /// in-flight write aborts at its next suspension point and rolls back.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, schema: ToolSchema, handler: impl MethodHandler + 'static) {
        let _ = self.entries.insert(
            schema.name,
            Entry {
                schema,
                handler: Arc::new(handler),
            },
        );
    }

    /// Dispatch a request: resolve, validate, execute, format.
    pub async fn dispatch(&self, request: &RpcRequest, ctx: &RpcContext) -> Value {
        let method = request.method.as_str();
        counter!("rpc_requests_total", "method" => method.to_string()).increment(1);

        let Some(entry) = self.entries.get(method) else {
            let err = RpcError::MethodNotFound {
                method: method.to_string(),
            };
            counter!("rpc_errors_total", "method" => method.to_string(), "error_type" => err.code())
                .increment(1);
            return error_response(&err);
        };

        let args = match schema::validate(&entry.schema, request.params.as_ref()) {
            Ok(args) => args,
            Err(err) => {
                counter!("rpc_errors_total", "method" => method.to_string(), "error_type" => err.code())
                    .increment(1);
                return error_response(&err);
            }
        };

        let start = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(Self::HANDLER_TIMEOUT, entry.handler.handle(args, ctx)).await;

        let response = match outcome {
            Ok(Ok(payload)) => success_response(payload),
            Ok(Err(err)) => {
                counter!("rpc_errors_total", "method" => method.to_string(), "error_type" => err.code())
                    .increment(1);
                error_response(&err)
            }
            Err(_elapsed) => {
                let err = RpcError::Timeout {
                    method: method.to_string(),
                };
                counter!("rpc_errors_total", "method" => method.to_string(), "error_type" => err.code())
                    .increment(1);
                tracing::error!(
                    method,
                    "handler timed out after {:?}",
                    Self::HANDLER_TIMEOUT
                );
                error_response(&err)
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.to_string())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow tool call"
            );
        }

        response
    }

    /// All registered tool names, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Schema for a tool, if registered.
    pub fn schema(&self, method: &str) -> Option<&ToolSchema> {
        self.entries.get(method).map(|e| &e.schema)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_helpers::make_test_context;
    use crate::schema::{ParamKind, ParamSpec};
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, args: Args<'_>, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Ok(json!({ "echo": args.str("text") }))
        }
    }

    struct FailHandler;

    #[async_trait]
    impl MethodHandler for FailHandler {
        async fn handle(&self, _args: Args<'_>, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Err(RpcError::Internal {
                message: "boom".into(),
            })
        }
    }

    const ECHO: ToolSchema = ToolSchema {
        name: "echo",
        description: "echo text back",
        params: &[ParamSpec::optional("text", ParamKind::Str)],
    };

    const FAIL: ToolSchema = ToolSchema {
        name: "fail",
        description: "always fails",
        params: &[],
    };

    fn request(method: &str, params: Option<Value>) -> RpcRequest {
        RpcRequest {
            id: None,
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn dispatch_success() {
        let ctx = make_test_context();
        let mut registry = MethodRegistry::new();
        registry.register(ECHO, EchoHandler);

        let response = registry
            .dispatch(&request("echo", Some(json!({"text": "hi"}))), &ctx)
            .await;
        assert_eq!(response["success"], true);
        assert_eq!(response["echo"], "hi");
    }

    #[tokio::test]
    async fn dispatch_method_not_found() {
        let ctx = make_test_context();
        let registry = MethodRegistry::new();
        let response = registry.dispatch(&request("nope", None), &ctx).await;
        assert_eq!(response["success"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("METHOD_NOT_FOUND"));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_param_before_handler() {
        let ctx = make_test_context();
        let mut registry = MethodRegistry::new();
        registry.register(ECHO, EchoHandler);

        let response = registry
            .dispatch(&request("echo", Some(json!({"unexpected": 1}))), &ctx)
            .await;
        assert_eq!(response["success"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("INVALID_PARAMS"));
    }

    #[tokio::test]
    async fn dispatch_handler_error_masked() {
        let ctx = make_test_context();
        let mut registry = MethodRegistry::new();
        registry.register(FAIL, FailHandler);

        let response = registry.dispatch(&request("fail", None), &ctx).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["error"], "INTERNAL_ERROR: internal error");
    }

    #[tokio::test]
    async fn methods_sorted() {
        let mut registry = MethodRegistry::new();
        registry.register(FAIL, FailHandler);
        registry.register(ECHO, EchoHandler);
        assert_eq!(registry.methods(), vec!["echo", "fail"]);
        assert!(registry.has_method("echo"));
        assert!(!registry.has_method("missing"));
    }

    struct SlowHandler;

    #[async_trait]
    impl MethodHandler for SlowHandler {
        async fn handle(&self, _args: Args<'_>, _ctx: &RpcContext) -> Result<Value, RpcError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn dispatch_timeout() {
        tokio::time::pause();
        let ctx = make_test_context();
        let mut registry = MethodRegistry::new();
        registry.register(
            ToolSchema {
                name: "slow",
                description: "sleeps past the deadline",
                params: &[],
            },
            SlowHandler,
        );

        let response = registry.dispatch(&request("slow", None), &ctx).await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().starts_with("TIMEOUT"));
    }
}
