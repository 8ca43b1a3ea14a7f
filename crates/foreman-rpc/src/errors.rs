//! RPC error type and the mapping from engine errors to wire strings.
//!
//! The wire form is `"<KIND>: <detail>"` — a machine-readable kind token
//! followed by a human-readable message that never leaks internal handles.

use foreman_core::EngineError;

/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Handler exceeded its deadline.
pub const TIMEOUT: &str = "TIMEOUT";

/// Errors returned by the dispatcher and handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Request parameters violate the tool schema.
    #[error("{message}")]
    InvalidParams { message: String },

    /// Unknown method name.
    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },

    /// A typed error from the core engine.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// The handler exceeded its deadline; partial writes rolled back.
    #[error("Handler for '{method}' timed out")]
    Timeout { method: String },

    /// Unexpected internal failure.
    #[error("{message}")]
    Internal { message: String },
}

impl RpcError {
    /// Machine-readable kind token.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Engine(err) => err.kind(),
            Self::Timeout { .. } => TIMEOUT,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Wire-format error string: `"<KIND>: <detail>"`. Storage internals
    /// are masked.
    pub fn to_wire(&self) -> String {
        let detail = match self {
            Self::Engine(EngineError::Database(_)) | Self::Engine(EngineError::Fatal(_)) => {
                "internal storage error".to_string()
            }
            Self::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        };
        format!("{}: {detail}", self.code())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}
