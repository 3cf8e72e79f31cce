//! Shared connection handling for `SQLite` backends.
//!
//! This module provides utilities for managing `SQLite` connections with proper
//! mutex handling, poison recovery, schema setup and transactions.

use super::fts::initialize_text_schema;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a connection waits for a competing writer.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds for locks instead of failing
///
/// The scaled backend opens one connection per call, so `busy_timeout` is
/// what serializes its writers.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if pragma configuration fails.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"), so the result is ignored rather than
    // run through execute_batch
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| Error::operation("configure_connection", e))?;

    Ok(())
}

/// Creates the `resources` table, its indexes and the full-text tables if
/// they do not exist.
///
/// The full [`Resource`](crate::models::Resource) is stored as JSON in
/// `data`; the other columns duplicate the fields used for filtering and
/// cascades. `path` uses the default `BINARY` collation, so prefix ranges on
/// it are case-sensitive.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            root_id TEXT NOT NULL,
            path TEXT NOT NULL,
            resource_type INTEGER NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_resources_root_path ON resources(root_id, path);
        CREATE INDEX IF NOT EXISTS idx_resources_deleted ON resources(deleted);",
    )
    .map_err(|e| Error::operation("create_resources_table", e))?;

    initialize_text_schema(conn)
}

/// Opens a database file, configures it and ensures the schema exists.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be opened or initialized.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_index_dir", e))?;
    }
    let conn = Connection::open(path).map_err(|e| Error::operation("open_sqlite", e))?;
    configure_connection(&conn)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Runs `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// # Errors
///
/// Returns the error of `f`, or [`Error::OperationFailed`] if the
/// transaction cannot be started or committed.
pub fn in_transaction<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| Error::operation("begin_transaction", e))?;

    let result = f(conn);

    if result.is_ok() {
        conn.execute("COMMIT", [])
            .map_err(|e| Error::operation("commit_transaction", e))?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }

    result
}
