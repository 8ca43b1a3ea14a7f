//! The store: pooled readers plus a single logical writer.
//!
//! All mutations go through [`Store::with_write`], which serialises writers
//! on a dedicated connection and runs the closure inside a `BEGIN IMMEDIATE`
//! transaction. The closure appends its change-log and version rows on the
//! same transaction handle, so a mutation and its audit trail commit or roll
//! back together. Busy/locked errors are retried with jittered exponential
//! backoff up to the configured budget, then surface as
//! `TransactionAborted`.
//!
//! Readers take short-lived pooled connections and observe either the
//! pre-image or the post-image of a concurrent write, never a mix.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::warn;

use foreman_core::retry::{backoff_delay_ms, RetryConfig};
use foreman_core::{EngineError, ForemanConfig};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::migrations;

/// Durable storage with single-writer discipline.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
    writer: Arc<Mutex<Connection>>,
    retry: RetryConfig,
}

impl Store {
    /// Open the store described by `config` and run migrations.
    pub fn open(config: &ForemanConfig) -> Result<Self, EngineError> {
        let target = match &config.db_path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => connection::memory_uri(),
        };
        let conn_config = ConnectionConfig {
            pool_size: config.pool_size,
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        };

        let writer = connection::open_connection(&target, &conn_config)?;
        migrations::run_migrations(&writer)?;

        let pool = connection::new_pool(&target, &conn_config)
            .map_err(|e| EngineError::Fatal(format!("failed to build reader pool: {e}")))?;

        Ok(Self {
            pool,
            writer: Arc::new(Mutex::new(writer)),
            retry: config.write_retry.clone(),
        })
    }

    /// In-memory store with default tuning, for tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::open(&ForemanConfig::default())
    }

    /// Borrow a pooled reader connection.
    pub fn reader(&self) -> Result<PooledConnection, EngineError> {
        self.pool
            .get()
            .map_err(|e| EngineError::Fatal(format!("reader pool exhausted: {e}")))
    }

    /// Run `f` inside a serialised write transaction.
    ///
    /// The closure may be invoked more than once if the transaction is
    /// retried; it must not have side effects outside the transaction.
    pub fn with_write<T>(
        &self,
        mut f: impl FnMut(&Transaction<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut attempt: u32 = 0;
        loop {
            let result = {
                let mut conn = self.writer.lock();
                run_transaction(&mut conn, &mut f)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.retry.max_retries {
                        warn!(attempts = attempt + 1, "write retry budget exhausted");
                        return Err(EngineError::TransactionAborted {
                            attempts: attempt + 1,
                        });
                    }
                    let delay = backoff_delay_ms(attempt, &self.retry, jitter_unit());
                    std::thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn run_transaction<T>(
    conn: &mut Connection,
    f: &mut impl FnMut(&Transaction<'_>) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&txn)?;
    txn.commit()?;
    Ok(value)
}

static JITTER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cheap jitter source in `[0, 1)`; backoff does not need a real PRNG.
fn jitter_unit() -> f64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    JITTER_COUNTER
        .fetch_add(1, Ordering::Relaxed)
        .hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        .hash(&mut hasher);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.reader().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn write_commits_on_success() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_write(|txn| {
                txn.execute(
                    "INSERT INTO projects (name, created_at, updated_at)
                     VALUES ('p1', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let conn = store.reader().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn write_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), _> = store.with_write(|txn| {
            txn.execute(
                "INSERT INTO projects (name, created_at, updated_at)
                 VALUES ('p1', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                [],
            )?;
            Err(EngineError::Validation("forced failure".into()))
        });
        assert!(result.is_err());

        let conn = store.reader().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn concurrent_writers_serialise() {
        let store = Store::open_in_memory().unwrap();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.with_write(move |txn| {
                    txn.execute(
                        "INSERT INTO projects (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
                        rusqlite::params![format!("p{i}"), "2026-01-01T00:00:00.000000Z"],
                    )?;
                    Ok(())
                })
            }));
        }
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let conn = store.reader().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 8);
    }

    #[test]
    fn jitter_stays_in_unit_interval() {
        for _ in 0..100 {
            let j = jitter_unit();
            assert!((0.0..1.0).contains(&j));
        }
    }
}
