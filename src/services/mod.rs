//! Business logic services.
//!
//! Services orchestrate the gateway, the extractor and the index backend:
//! the [`Indexer`] writes, the [`SearchService`] reads, and the
//! [`ChangeDispatcher`] turns change events into indexer calls through the
//! [`SpaceDebouncer`].

mod backend_factory;
mod debouncer;
mod dispatcher;
mod federator;
mod indexer;

pub use backend_factory::BackendFactory;
pub use debouncer::{DebounceCallback, SpaceDebouncer};
pub use dispatcher::ChangeDispatcher;
pub use federator::{
    DEFAULT_FANOUT_WORKERS, DEFAULT_SLOW_QUERY, SearchService, format_query, parse_scope,
};
pub use indexer::{IndexStats, Indexer};
