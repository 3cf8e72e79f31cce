//! Storage backend traits.

mod index;

pub use index::IndexBackend;
