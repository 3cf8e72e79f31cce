//! Search requests, responses and matches.

use super::document::{Resource, ResourceType};
use super::media::{Audio, GeoCoordinates, Image, Photo};
use super::resource::{Reference, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page size used when a request asks for `0`.
pub const DEFAULT_PAGE_SIZE: i32 = 200;

/// Page size requesting every match.
pub const UNLIMITED: i32 = -1;

/// Resolves a requested page size to a match limit.
///
/// `0` means the default of 200, any negative value means unlimited.
///
/// # Examples
///
/// ```
/// use spacesearch::models::effective_limit;
///
/// assert_eq!(effective_limit(0), Some(200));
/// assert_eq!(effective_limit(-1), None);
/// assert_eq!(effective_limit(5), Some(5));
/// ```
#[must_use]
pub fn effective_limit(page_size: i32) -> Option<usize> {
    match page_size {
        0 => usize::try_from(DEFAULT_PAGE_SIZE).ok(),
        n if n < 0 => None,
        n => usize::try_from(n).ok(),
    }
}

/// A federated search request issued by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// The query string.
    pub query: String,
    /// Restricts the search to one space and path.
    pub reference: Option<Reference>,
    /// Maximum number of matches (`0` default, `-1` unlimited).
    pub page_size: i32,
}

impl SearchRequest {
    /// Creates a request with the default page size and no scope.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reference: None,
            page_size: 0,
        }
    }

    /// Restricts the request to a reference.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// A search against a single index scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexRequest {
    /// The query string.
    pub query: String,
    /// Space root (`resource_id`) and path prefix (`path`) to search under.
    pub reference: Option<Reference>,
    /// Maximum number of matches (`0` default, `-1` unlimited).
    pub page_size: i32,
}

impl SearchIndexRequest {
    /// Creates an unscoped request.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reference: None,
            page_size: 0,
        }
    }

    /// Scopes the request to a space root and path prefix.
    #[must_use]
    pub fn scoped(mut self, root_id: ResourceId, path_prefix: &str) -> Self {
        self.reference = Some(Reference::new(root_id, path_prefix));
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// The matched resource as presented to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Location of the match: space root plus relative path.
    pub reference: Reference,
    /// Resource id.
    pub id: ResourceId,
    /// Parent id.
    pub parent_id: Option<ResourceId>,
    /// Name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub mime_type: String,
    /// File or folder.
    pub resource_type: ResourceType,
    /// Last modification time.
    pub mtime: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Tags.
    pub tags: Vec<String>,
    /// Highlighted content excerpt.
    pub highlights: Option<String>,
    /// Audio metadata.
    pub audio: Option<Audio>,
    /// Image metadata.
    pub image: Option<Image>,
    /// Capture location.
    pub location: Option<GeoCoordinates>,
    /// Photo metadata.
    pub photo: Option<Photo>,
    /// Name of the share root, for matches inside a share.
    pub share_root_name: Option<String>,
    /// Id of the shared resource, for matches inside a share.
    pub remote_item_id: Option<ResourceId>,
    /// WebDAV permission string.
    pub permissions: String,
}

impl Entity {
    /// Builds the entity for an index entry.
    #[must_use]
    pub fn from_resource(resource: &Resource) -> Self {
        let document = &resource.document;
        Self {
            reference: Reference::new(resource.root_id.clone(), &resource.path),
            id: resource.id.clone(),
            parent_id: resource.parent_id.clone(),
            name: document.name.clone(),
            size: document.size,
            mime_type: document.mime_type.clone(),
            resource_type: resource.resource_type,
            mtime: document.mtime,
            deleted: resource.deleted,
            tags: document.tags.clone(),
            highlights: None,
            audio: document.audio.clone(),
            image: document.image.clone(),
            location: document.location.clone(),
            photo: document.photo.clone(),
            share_root_name: None,
            remote_item_id: None,
            permissions: String::new(),
        }
    }
}

/// A scored search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Relevance score; higher is better.
    pub score: f32,
    /// The matched resource.
    pub entity: Entity,
}

/// Sorts matches by descending score.
pub fn sort_by_score(matches: &mut [Match]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Result of a single index search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchIndexResponse {
    /// Ranked matches, truncated to the page size.
    pub matches: Vec<Match>,
    /// Number of matches before truncation.
    pub total_matches: i32,
}

/// Result of a federated search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Ranked matches across all spaces, truncated to the page size.
    pub matches: Vec<Match>,
    /// Sum of the per-space totals.
    pub total_matches: i32,
}
