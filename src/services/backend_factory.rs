//! Backend factory for index initialization.
//!
//! Centralizes backend creation so the binary, the services and the tests
//! select an index strategy the same way.
//!
//! # Architecture
//!
//! ```text
//! BackendFactory
//!   ├── create_index_backend(Memory, _)    → MemoryBackend
//!   ├── create_index_backend(Sqlite, path) → SqliteBackend
//!   └── create_index_backend(Scaled, path) → ScaledSqliteBackend
//! ```

use crate::Result;
use crate::config::IndexBackendKind;
use crate::storage::index::{MemoryBackend, ScaledSqliteBackend, SqliteBackend};
use crate::storage::traits::IndexBackend;
use std::path::Path;
use std::sync::Arc;

/// Factory for creating index backends.
///
/// # Example
///
/// ```rust
/// use spacesearch::config::IndexBackendKind;
/// use spacesearch::services::BackendFactory;
/// use std::path::Path;
///
/// let index = BackendFactory::create_index_backend(IndexBackendKind::Memory, Path::new(""))
///     .unwrap();
/// assert_eq!(index.name(), "memory");
/// ```
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the index backend of the given kind.
    ///
    /// `path` is the `SQLite` database file; the memory backend ignores it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn create_index_backend(
        kind: IndexBackendKind,
        path: &Path,
    ) -> Result<Arc<dyn IndexBackend>> {
        let backend: Arc<dyn IndexBackend> = match kind {
            IndexBackendKind::Memory => Arc::new(MemoryBackend::new()?),
            IndexBackendKind::Sqlite => {
                Arc::new(Self::log_failure(kind, path, SqliteBackend::new(path))?)
            },
            IndexBackendKind::Scaled => {
                Arc::new(Self::log_failure(kind, path, ScaledSqliteBackend::new(path))?)
            },
        };

        tracing::debug!(backend = backend.name(), path = %path.display(), "Created index backend");
        Ok(backend)
    }

    /// Creates the index backend, or `None` if initialization fails.
    ///
    /// Failures are logged, allowing callers to continue with reduced
    /// functionality.
    pub fn try_create_index_backend(
        kind: IndexBackendKind,
        path: &Path,
    ) -> Option<Arc<dyn IndexBackend>> {
        Self::create_index_backend(kind, path).ok()
    }

    fn log_failure<T>(kind: IndexBackendKind, path: &Path, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| {
            tracing::warn!(
                backend = kind.as_str(),
                path = %path.display(),
                error = %e,
                "Failed to create index backend"
            );
        })
    }
}
