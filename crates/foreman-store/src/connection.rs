//! SQLite connection pool with WAL mode and foreign keys enabled.
//!
//! Uses `r2d2` pooling with the `r2d2_sqlite` backend. The
//! [`PragmaCustomizer`] runs on each new connection so WAL mode, foreign
//! keys, and performance pragmas are always in effect. In-memory stores use
//! a shared-cache URI so the writer connection and pooled readers see the
//! same database.

use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

/// Alias for the reader connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool tuning knobs.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 16).
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 5000).
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB (default: 8192).
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            busy_timeout_ms: 5_000,
            cache_size_kib: 8_192,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

fn pragma_batch(busy_timeout_ms: u32, cache_size_kib: i64) -> String {
    format!(
        "PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = {busy_timeout_ms};\
         PRAGMA foreign_keys = ON;\
         PRAGMA cache_size = -{cache_size_kib};\
         PRAGMA synchronous = NORMAL;"
    )
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&pragma_batch(self.busy_timeout_ms, self.cache_size_kib))?;
        Ok(())
    }
}

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// URI for a process-unique shared-cache in-memory database.
pub fn memory_uri() -> String {
    let n = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("file:foreman_mem_{n}?mode=memory&cache=shared")
}

fn uri_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Build the reader pool for a database URI or file path.
pub fn new_pool(target: &str, config: &ConnectionConfig) -> Result<ConnectionPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(target).with_flags(uri_flags());
    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)
}

/// Open a standalone connection (used for the dedicated writer) with the
/// same pragmas the pool applies.
pub fn open_connection(
    target: &str,
    config: &ConnectionConfig,
) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open_with_flags(target, uri_flags())?;
    conn.execute_batch(&pragma_batch(config.busy_timeout_ms, config.cache_size_kib))?;
    Ok(conn)
}

/// Verify pragmas are set correctly on a connection.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState, rusqlite::Error> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
    })
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode ("wal" for file-backed stores).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_uris_are_unique() {
        assert_ne!(memory_uri(), memory_uri());
    }

    #[test]
    fn in_memory_pool_creates_successfully() {
        let config = ConnectionConfig::default();
        let pool = new_pool(&memory_uri(), &config).unwrap();
        let conn = pool.get().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert!(pragmas.foreign_keys_enabled);
    }

    #[test]
    fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = ConnectionConfig::default();
        let pool = new_pool(path.to_str().unwrap(), &config).unwrap();
        let conn = pool.get().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert_eq!(pragmas.journal_mode, "wal");
        assert!(pragmas.foreign_keys_enabled);
    }

    #[test]
    fn writer_and_pool_share_memory_database() {
        let uri = memory_uri();
        let config = ConnectionConfig::default();
        let writer = open_connection(&uri, &config).unwrap();
        writer
            .execute_batch(
                "CREATE TABLE probe (id INTEGER PRIMARY KEY); INSERT INTO probe VALUES (1);",
            )
            .unwrap();

        let pool = new_pool(&uri, &config).unwrap();
        let reader = pool.get().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM probe", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn separate_memory_databases_are_isolated() {
        let config = ConnectionConfig::default();
        let a = open_connection(&memory_uri(), &config).unwrap();
        a.execute_batch("CREATE TABLE probe (id INTEGER)").unwrap();

        let b = open_connection(&memory_uri(), &config).unwrap();
        let result: Result<i64, _> =
            b.query_row("SELECT COUNT(*) FROM probe", [], |row| row.get(0));
        assert!(result.is_err());
    }
}
