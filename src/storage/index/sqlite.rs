//! `SQLite` index backend with a single shared connection.
//!
//! The statements live in free functions taking a `&Connection` so that
//! [`ScaledSqliteBackend`](super::ScaledSqliteBackend) can run the exact same
//! logic on a connection it opens per call.

use super::{in_scope, rank};
use crate::models::{Resource, ResourceId, SearchIndexRequest, SearchIndexResponse, is_within};
use crate::query::Query;
use crate::storage::sqlite::{
    acquire_lock, build_candidate_clause, configure_connection, count_resources,
    descendant_range, fetch_resource, fetch_resources, in_transaction, index_text,
    initialize_schema, match_text, open_connection, record_operation_metrics, remove_resource,
    remove_text, write_resource,
};
use crate::storage::traits::IndexBackend;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-based index backend.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. Cascades run inside a
/// `BEGIN IMMEDIATE` transaction while holding the lock, so readers on this
/// backend never observe a half-applied cascade.
pub struct SqliteBackend {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Opens (or creates) an index database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Creates an in-memory `SQLite` backend (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::operation("open_sqlite_memory", e))?;
        configure_connection(&conn)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

/// Runs a search on `conn`.
///
/// Body-text clauses run against the FTS5 index first. When their hits bound
/// the result, only those entries are loaded; otherwise every live entry in
/// scope is.
pub(super) fn search_with(
    conn: &Connection,
    request: &SearchIndexRequest,
) -> Result<SearchIndexResponse> {
    let query = Query::parse(&request.query)?;
    let scope = request.reference.as_ref();
    let text = match_text(conn, &query, scope.map(|s| &s.resource_id))?;

    let candidates = match text.candidate_ids(&query) {
        Some(ids) => {
            let mut loaded = Vec::with_capacity(ids.len());
            for id in ids {
                let Ok(id) = ResourceId::parse(id) else {
                    continue;
                };
                loaded.extend(fetch_resource(conn, &id)?);
            }
            loaded
        },
        None => {
            let (clause, params) = build_candidate_clause(scope, query.required_id());
            fetch_resources(conn, &clause, &params)?
        },
    };

    let candidates = candidates
        .into_iter()
        .filter(|resource| in_scope(resource, scope));
    Ok(rank(&query, &text, candidates, request.page_size))
}

/// Inserts or replaces an entry together with its body text.
pub(super) fn upsert_with(conn: &Connection, resource: &Resource) -> Result<()> {
    in_transaction(conn, |conn| {
        write_resource(conn, resource)?;
        index_text(conn, resource)
    })
}

/// Removes an entry and its body text.
pub(super) fn purge_with(conn: &Connection, id: &ResourceId) -> Result<bool> {
    in_transaction(conn, |conn| {
        let removed = remove_resource(conn, id)?;
        remove_text(conn, id)?;
        Ok(removed)
    })
}

/// Loads an entry or fails with [`Error::NotFound`].
fn require(conn: &Connection, id: &ResourceId) -> Result<Resource> {
    fetch_resource(conn, id)?.ok_or_else(|| Error::NotFound(format!("resource {id} is not indexed")))
}

/// Loads every entry strictly below `path` in the space `root_id`.
fn descendants(conn: &Connection, root_id: &ResourceId, path: &str) -> Result<Vec<Resource>> {
    let (low, high) = descendant_range(path);
    let mut found = fetch_resources(
        conn,
        "root_id = ?1 AND path >= ?2 AND path < ?3",
        &[root_id.to_string(), low, high],
    )?;
    found.retain(|child| child.path != path && is_within(&child.path, path));
    Ok(found)
}

/// Moves an entry and, for containers, rewrites the paths of its descendants.
///
/// Returns the number of descendants rewritten.
pub(super) fn move_with(
    conn: &Connection,
    id: &ResourceId,
    parent_id: &ResourceId,
    new_path: &str,
) -> Result<usize> {
    in_transaction(conn, |conn| {
        let mut resource = require(conn, id)?;
        let old_path = resource.path.clone();
        resource.relocate(parent_id.clone(), new_path);
        write_resource(conn, &resource)?;

        if !resource.resource_type.is_container() || old_path == resource.path {
            return Ok(0);
        }

        let mut rewritten = 0;
        for mut child in descendants(conn, &resource.root_id, &old_path)? {
            if child.rebase(&old_path, &resource.path) {
                write_resource(conn, &child)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    })
}

/// Sets the deleted flag on an entry and, for containers, its descendants.
///
/// Returns the number of descendants updated.
pub(super) fn set_deleted_with(conn: &Connection, id: &ResourceId, deleted: bool) -> Result<usize> {
    in_transaction(conn, |conn| {
        let mut resource = require(conn, id)?;
        resource.deleted = deleted;
        write_resource(conn, &resource)?;

        if !resource.resource_type.is_container() {
            return Ok(0);
        }

        let children = descendants(conn, &resource.root_id, &resource.path)?;
        let count = children.len();
        for mut child in children {
            child.deleted = deleted;
            write_resource(conn, &child)?;
        }
        Ok(count)
    })
}

impl IndexBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(
        skip(self, request),
        fields(operation = "search", backend = "sqlite", query = %request.query)
    )]
    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            search_with(&conn, request)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "search", start, status);
        result
    }

    #[instrument(
        skip(self, resource),
        fields(operation = "upsert", backend = "sqlite", resource.id = %resource.id, path = %resource.path)
    )]
    fn upsert(&self, resource: &Resource) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            upsert_with(&conn, resource)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "upsert", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "move", backend = "sqlite", resource.id = %id))]
    fn move_resource(&self, id: &ResourceId, parent_id: &ResourceId, new_path: &str) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let rewritten = move_with(&conn, id, parent_id, new_path)?;
            tracing::debug!(descendants = rewritten, "moved resource");
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "move", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "delete", backend = "sqlite", resource.id = %id))]
    fn delete(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let cascaded = set_deleted_with(&conn, id, true)?;
            tracing::debug!(descendants = cascaded, "marked resource deleted");
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "delete", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "restore", backend = "sqlite", resource.id = %id))]
    fn restore(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let cascaded = set_deleted_with(&conn, id, false)?;
            tracing::debug!(descendants = cascaded, "restored resource");
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "restore", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "purge", backend = "sqlite", resource.id = %id))]
    fn purge(&self, id: &ResourceId) -> Result<bool> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            purge_with(&conn, id)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "purge", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "get", backend = "sqlite", resource.id = %id))]
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            fetch_resource(&conn, id)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "get", start, status);
        result
    }

    fn doc_count(&self) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        count_resources(&conn)
    }
}
