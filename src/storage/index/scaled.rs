//! `SQLite` index backend that opens a connection per call.
//!
//! Callers on many threads never queue behind a process-wide mutex; `SQLite`
//! itself serializes writers through WAL and the busy timeout.

use super::sqlite::{move_with, purge_with, search_with, set_deleted_with, upsert_with};
use crate::Result;
use crate::models::{Resource, ResourceId, SearchIndexRequest, SearchIndexResponse};
use crate::storage::sqlite::{
    count_resources, fetch_resource, open_connection, record_operation_metrics,
};
use crate::storage::traits::IndexBackend;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-based index backend with a connection per operation.
pub struct ScaledSqliteBackend {
    db_path: PathBuf,
}

impl ScaledSqliteBackend {
    /// Creates the backend and initializes the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        open_connection(&db_path)?;
        Ok(Self { db_path })
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        open_connection(&self.db_path)
    }
}

impl IndexBackend for ScaledSqliteBackend {
    fn name(&self) -> &'static str {
        "scaled"
    }

    #[instrument(
        skip(self, request),
        fields(operation = "search", backend = "scaled", query = %request.query)
    )]
    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse> {
        let start = Instant::now();
        let result = self.connect().and_then(|conn| search_with(&conn, request));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "search", start, status);
        result
    }

    #[instrument(
        skip(self, resource),
        fields(operation = "upsert", backend = "scaled", resource.id = %resource.id, path = %resource.path)
    )]
    fn upsert(&self, resource: &Resource) -> Result<()> {
        let start = Instant::now();
        let result = self.connect().and_then(|conn| upsert_with(&conn, resource));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "upsert", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "move", backend = "scaled", resource.id = %id))]
    fn move_resource(&self, id: &ResourceId, parent_id: &ResourceId, new_path: &str) -> Result<()> {
        let start = Instant::now();
        let result = self
            .connect()
            .and_then(|conn| move_with(&conn, id, parent_id, new_path))
            .map(|rewritten| tracing::debug!(descendants = rewritten, "moved resource"));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "move", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "delete", backend = "scaled", resource.id = %id))]
    fn delete(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = self
            .connect()
            .and_then(|conn| set_deleted_with(&conn, id, true))
            .map(|cascaded| tracing::debug!(descendants = cascaded, "marked resource deleted"));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "delete", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "restore", backend = "scaled", resource.id = %id))]
    fn restore(&self, id: &ResourceId) -> Result<()> {
        let start = Instant::now();
        let result = self
            .connect()
            .and_then(|conn| set_deleted_with(&conn, id, false))
            .map(|cascaded| tracing::debug!(descendants = cascaded, "restored resource"));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "restore", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "purge", backend = "scaled", resource.id = %id))]
    fn purge(&self, id: &ResourceId) -> Result<bool> {
        let start = Instant::now();
        let result = self.connect().and_then(|conn| purge_with(&conn, id));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "purge", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "get", backend = "scaled", resource.id = %id))]
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let start = Instant::now();
        let result = self.connect().and_then(|conn| fetch_resource(&conn, id));

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("scaled", "get", start, status);
        result
    }

    fn doc_count(&self) -> Result<u64> {
        self.connect().and_then(|conn| count_resources(&conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, ResourceType};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScaledSqliteBackend::new(dir.path().join("index.db")).unwrap());
        let root = ResourceId::new("st", "sp", "sp");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let backend = Arc::clone(&backend);
                let root = root.clone();
                thread::spawn(move || {
                    for j in 0..5 {
                        let name = format!("f{i}-{j}");
                        let resource = Resource::new(
                            ResourceId::new("st", "sp", &name),
                            root.clone(),
                            Some(root.clone()),
                            &format!("./{name}"),
                            ResourceType::File,
                            Document {
                                name: name.clone(),
                                ..Document::default()
                            },
                        );
                        backend.upsert(&resource).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(backend.doc_count().unwrap(), 20);
    }
}
