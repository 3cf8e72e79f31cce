//! Data models for spacesearch.
//!
//! This module contains the core data structures shared by the index, the
//! gateway boundary and the services.

mod document;
mod events;
pub mod media;
mod resource;
mod search;
mod space;

pub use document::{Document, FieldValue, Resource, ResourceType, is_hidden};
pub use events::{ChangeEvent, EventMeta};
pub use media::{Audio, GeoCoordinates, Image, MediaKind, Photo};
pub use resource::{
    Reference, ResourceId, SpaceId, Token, UserContext, UserId, base_name, is_within, join_path,
    make_relative_path,
};
pub use search::{
    DEFAULT_PAGE_SIZE, Entity, Match, SearchIndexRequest, SearchIndexResponse, SearchRequest,
    SearchResponse, UNLIMITED, effective_limit, sort_by_score,
};
pub use space::{
    OPAQUE_GRANT_OPAQUE_ID, OPAQUE_GRANT_SPACE_ID, OPAQUE_GRANT_STORAGE_ID, OPAQUE_TRASHED,
    ReceivedShare, ResourceInfo, ResourcePermissions, SHARE_STORAGE_SPACE_ID, SpaceFilter,
    SpaceType, StorageSpace,
};
