//! Shared `SQLite` infrastructure for the index backends.
//!
//! Both [`SqliteBackend`](crate::storage::index::SqliteBackend) and
//! [`ScaledSqliteBackend`](crate::storage::index::ScaledSqliteBackend) use
//! the same schema and statements; they only differ in how they obtain a
//! connection.
//!
//! ## Module Structure
//!
//! - [`connection`]: lock acquisition, pragmas, schema, transactions
//! - [`sql`]: path ranges and candidate filter building
//! - [`fts`]: FTS5 text index, `bm25()` ranking and excerpts
//! - [`resource_row`]: row conversion for [`Resource`](crate::models::Resource)
//! - [`metrics`]: operation metrics shared by all backends

mod connection;
mod fts;
mod metrics;
mod resource_row;
mod sql;

pub use connection::{
    acquire_lock, configure_connection, in_transaction, initialize_schema, open_connection,
};
pub use fts::{
    MAX_WILDCARD_EXPANSION, index_text, initialize_text_schema, match_text, remove_text,
};
pub use metrics::record_operation_metrics;
pub use resource_row::{
    count_resources, fetch_resource, fetch_resources, remove_resource, write_resource,
};
pub use sql::{build_candidate_clause, descendant_range};
