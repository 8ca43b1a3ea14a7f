//! # foreman-rpc
//!
//! The agent-facing tool-call protocol: a method registry dispatching
//! `{method, params}` requests, declarative parameter schemas with one
//! generic validator, and handlers routing to the lifecycle and query
//! engines.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod schema;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use registry::{MethodHandler, MethodRegistry};
pub use schema::{Args, ParamKind, ParamSpec, ToolSchema};
pub use types::RpcRequest;

/// Build the full tool registry for a coordinator.
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    handlers::register_all(&mut registry);
    registry
}
