//! # foreman-engine
//!
//! The task lifecycle engine: the reservation/completion state machine,
//! dependency-aware availability, the query surface, the stale sweeper, and
//! change-event publication. All mutations flow through the store's single
//! writer and commit atomically with their change-log entries and version
//! snapshots.

#![deny(unsafe_code)]

pub mod comments;
pub mod deps;
pub mod events;
pub mod github;
pub mod lifecycle;
mod mutation;
pub mod projects;
pub mod queries;
pub mod sweeper;
pub mod tags;
pub mod templates;

use std::sync::Arc;

use foreman_core::{EngineError, ForemanConfig};
use foreman_store::Store;

pub use deps::DependencyResolver;
pub use events::EventPublisher;
pub use github::{GithubLinkKind, GithubLinks};
pub use lifecycle::{
    BulkUnlockOutcome, BulkUnlockResult, CompleteParams, CompleteResult, CreateTaskParams,
    CreateTaskResult, FollowupSpec, LifecycleEngine, ReserveResult, StaleWarning, SWEEPER_ACTOR,
};
pub use queries::{ActivityEntry, QueryEngine, TaskContext};
pub use sweeper::{StaleSweeper, SweepReport};

/// The assembled coordinator: store, lifecycle engine, query engine, and
/// event fan-out, sharing one configuration.
#[derive(Clone)]
pub struct Foreman {
    pub store: Store,
    pub lifecycle: LifecycleEngine,
    pub queries: QueryEngine,
    pub events: EventPublisher,
    pub config: Arc<ForemanConfig>,
}

impl Foreman {
    /// Open the store described by `config` and wire the engine components.
    pub fn open(config: ForemanConfig) -> Result<Self, EngineError> {
        let config = Arc::new(config);
        let store = Store::open(&config)?;
        let events = EventPublisher::new(config.event_buffer);
        let lifecycle = LifecycleEngine::new(store.clone(), events.clone(), config.clone());
        let queries = QueryEngine::new(store.clone(), config.clone());
        Ok(Self {
            store,
            lifecycle,
            queries,
            events,
            config,
        })
    }

    /// In-memory coordinator with default configuration, for tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::open(ForemanConfig::default())
    }

    /// Build the background sweeper for this coordinator.
    pub fn sweeper(&self) -> StaleSweeper {
        StaleSweeper::new(
            self.lifecycle.clone(),
            self.store.clone(),
            self.config.clone(),
        )
    }
}
