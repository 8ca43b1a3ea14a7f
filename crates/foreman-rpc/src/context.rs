//! Dependency-injection context passed to every handler.

use foreman_engine::Foreman;

/// Shared context: the assembled coordinator.
#[derive(Clone)]
pub struct RpcContext {
    pub foreman: Foreman,
}

impl RpcContext {
    pub fn new(foreman: Foreman) -> Self {
        Self { foreman }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    pub fn make_test_context() -> RpcContext {
        RpcContext::new(Foreman::open_in_memory().unwrap())
    }
}
