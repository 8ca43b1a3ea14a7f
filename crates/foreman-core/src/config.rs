//! Boot configuration, read once at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Configuration for the Foreman coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForemanConfig {
    /// Path to the SQLite database. `None` selects an in-memory store.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Reservation lease timeout in hours (default 24). Reservations held
    /// longer than this are auto-unlocked by the sweeper.
    #[serde(default = "default_stale_timeout_hours")]
    pub stale_timeout_hours: f64,
    /// Optional cap on the sweeper period in seconds. The effective period
    /// is `min(stale_timeout / 4, this cap)`.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    /// Queries slower than this log a warning (default 100 ms).
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
    /// Writer transaction retry budget.
    #[serde(default)]
    pub write_retry: RetryConfig,
    /// Connection pool size for readers (default 16).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// SQLite busy timeout in milliseconds (default 5000).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
    /// SQLite page cache size in KiB (default 8192).
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i64,
    /// Capacity of the outgoing event channel (default 1024). Lagging
    /// subscribers lose the oldest events rather than blocking mutators.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_stale_timeout_hours() -> f64 {
    24.0
}
fn default_slow_query_threshold_ms() -> u64 {
    100
}
fn default_pool_size() -> u32 {
    16
}
fn default_busy_timeout_ms() -> u32 {
    5_000
}
fn default_cache_size_kib() -> i64 {
    8_192
}
fn default_event_buffer() -> usize {
    1_024
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            stale_timeout_hours: default_stale_timeout_hours(),
            sweep_interval_secs: None,
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            write_retry: RetryConfig::default(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size_kib: default_cache_size_kib(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ForemanConfig {
    /// Effective sweeper period: at most a quarter of the lease timeout,
    /// optionally capped by `sweep_interval_secs`.
    pub fn sweep_interval(&self) -> std::time::Duration {
        let quarter_secs = (self.stale_timeout_hours * 3600.0 / 4.0).max(1.0) as u64;
        let secs = match self.sweep_interval_secs {
            Some(cap) => quarter_secs.min(cap.max(1)),
            None => quarter_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}
