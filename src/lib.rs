//! # Spacesearch
//!
//! Federated full-text and metadata search over distributed storage spaces.
//!
//! Files and folders live in remote storage spaces (a user's personal space,
//! plus spaces shared with them through grants and mountpoints). Spacesearch
//! keeps a local, eventually consistent index of that tree and answers queries
//! across every space a user can see as if they were one flat search space.
//!
//! ## Components
//!
//! - [`storage::IndexBackend`]: the index, with cascading move/delete/restore
//! - [`services::Indexer`]: change-aware walk of a space into the index
//! - [`services::SpaceDebouncer`]: coalesces bursts of "space changed" signals
//! - [`services::ChangeDispatcher`]: turns storage events into index updates
//! - [`services::SearchService`]: fans a query out over the user's spaces and
//!   merges the results
//!
//! ## Example
//!
//! ```rust,ignore
//! use spacesearch::{SearchRequest, SearchService, UserContext};
//!
//! let service = SearchService::new(gateway, index);
//! let response = service.search(&user, &SearchRequest::new("report"))?;
//! for m in response.matches {
//!     println!("{} {}", m.score, m.entity.reference.path);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod events;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod observability;
pub mod query;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::SearchConfig;
pub use extract::{BasicExtractor, Extractor};
pub use gateway::{InMemoryGateway, StorageGateway, WalkControl};
pub use models::{
    ChangeEvent, Document, Match, Reference, Resource, ResourceId, ResourceType, SearchIndexRequest,
    SearchIndexResponse, SearchRequest, SearchResponse, SpaceId, SpaceType, StorageSpace,
    UserContext, UserId,
};
pub use services::{ChangeDispatcher, Indexer, SearchService, SpaceDebouncer};
pub use storage::IndexBackend;

/// Error type for spacesearch operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `BadRequest` | Empty or malformed query, invalid space id, unparsable scope |
/// | `NotFound` | Unknown document in the index, unknown resource at the gateway |
/// | `Unavailable` | Gateway, authentication or transport failure |
/// | `OperationFailed` | Local storage, serialization or lock failure |
/// | `Unauthorized` | The gateway rejected the presented credentials |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The request was malformed.
    ///
    /// Surfaced directly to the caller and never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A referenced document, space or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote collaborator (gateway, auth, transport) failed.
    #[error("'{operation}' unavailable: {cause}")]
    Unavailable {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A local operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - documents cannot be serialized or deserialized
    /// - filesystem I/O errors occur
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Authentication was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds an [`Error::Unavailable`] from an operation name and any displayable cause.
    pub fn unavailable(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for errors caused by something that does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for spacesearch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use spacesearch::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
