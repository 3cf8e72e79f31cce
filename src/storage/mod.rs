//! Index storage.
//!
//! - [`traits`]: the [`IndexBackend`] capability every caller depends on
//! - [`index`]: the memory, `SQLite` and scaled `SQLite` strategies
//! - [`sqlite`]: schema, statements and metrics shared by the `SQLite` backends

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod index;
pub mod sqlite;
pub mod traits;

pub use index::{MemoryBackend, ScaledSqliteBackend, SqliteBackend};
pub use traits::IndexBackend;
