//! Index backend trait.
//!
//! The index stores one [`Resource`] per file or folder and answers
//! structured queries scoped to a space root and path prefix.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Connection |
//! |---------|----------|------------|
//! | `MemoryBackend` | Tests, ephemeral deployments | none |
//! | `SqliteBackend` | Default; embedded | one `Mutex<Connection>` |
//! | `ScaledSqliteBackend` | Many concurrent writers | opened per call |
//!
//! # Cascades
//!
//! `move_resource`, `delete` and `restore` on a container also rewrite
//! every entry with the same root whose path lies below the container's old
//! path. The `SQLite` backends apply the whole cascade in one transaction;
//! the memory backend applies it under one write lock.
//!
//! # Error Modes
//!
//! | Error Type | Raised When |
//! |------------|-------------|
//! | `Error::BadRequest` | Query fails to parse |
//! | `Error::NotFound` | `move_resource`/`delete`/`restore` on an unknown id |
//! | `Error::OperationFailed` | Storage, lock or serialization failure |

use crate::Result;
use crate::models::{Resource, ResourceId, SearchIndexRequest, SearchIndexResponse};

/// Trait for index layer backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn IndexBackend>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
/// - `search` never returns soft-deleted entries
/// - `upsert` fully replaces an existing entry with the same id
pub trait IndexBackend: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Searches the index.
    ///
    /// Only entries with `deleted = false` are considered. If the request has
    /// a reference, results are limited to entries whose root is the
    /// reference's resource id and, unless the path is `.`, whose path equals
    /// the reference path or lies below it.
    ///
    /// Matches are ranked by descending score and truncated to the page
    /// size; `total_matches` counts all matches before truncation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BadRequest`] for an invalid query.
    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse>;

    /// Inserts or fully replaces the entry with the resource's id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert(&self, resource: &Resource) -> Result<()>;

    /// Moves an entry to a new parent and path.
    ///
    /// Containers take their descendants along.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the id is unknown.
    fn move_resource(&self, id: &ResourceId, parent_id: &ResourceId, new_path: &str) -> Result<()>;

    /// Marks an entry, and for containers all descendants, as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the id is unknown.
    fn delete(&self, id: &ResourceId) -> Result<()>;

    /// Clears the deleted flag of an entry and, for containers, all descendants.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the id is unknown.
    fn restore(&self, id: &ResourceId) -> Result<()>;

    /// Permanently removes a single entry. No cascade.
    ///
    /// Returns `false` if the id was not indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn purge(&self, id: &ResourceId) -> Result<bool>;

    /// Retrieves an entry by id, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, id: &ResourceId) -> Result<Option<Resource>>;

    /// Returns the number of stored entries, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn doc_count(&self) -> Result<u64>;
}
