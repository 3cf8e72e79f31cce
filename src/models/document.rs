//! Indexed documents.
//!
//! A [`Resource`] is the unit stored in the index: the identity and position
//! of a file or folder inside its space, plus the [`Document`] produced by
//! the extractor.

use super::media::{Audio, GeoCoordinates, Image, MediaKind, Photo};
use super::resource::{ResourceId, base_name, make_relative_path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The type of a resource in the storage tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A regular file.
    #[default]
    File,
    /// A folder.
    Container,
}

impl ResourceType {
    /// Returns the numeric code storage providers use for this type.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::File => 1,
            Self::Container => 2,
        }
    }

    /// Returns the type for a numeric code, if known.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::File),
            2 => Some(Self::Container),
            _ => None,
        }
    }

    /// Returns the lowercase type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Container => "container",
        }
    }

    /// Returns true for folders.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Container)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed field value used by query evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Tokenized, case-insensitive text.
    Text(String),
    /// Exact, case-sensitive keyword.
    Keyword(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Point in time.
    Time(DateTime<Utc>),
}

/// Content and metadata extracted from a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// File or folder name.
    pub name: String,
    /// Document title, if the extractor found one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Extracted body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tags attached to the resource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Audio metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Audio>,
    /// Image metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    /// Capture location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoCoordinates>,
    /// Photo metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Photo>,
}

impl Document {
    /// Reads a media field by kind and canonical field name.
    #[must_use]
    pub fn media_field(&self, kind: MediaKind, field: &str) -> Option<FieldValue> {
        match kind {
            MediaKind::Audio => self.audio.as_ref()?.get(field),
            MediaKind::Image => self.image.as_ref()?.get(field),
            MediaKind::Location => self.location.as_ref()?.get(field),
            MediaKind::Photo => self.photo.as_ref()?.get(field),
        }
    }

    /// Returns true if the document carries any media metadata.
    #[must_use]
    pub fn has_media(&self) -> bool {
        self.audio.as_ref().is_some_and(|m| !m.is_empty())
            || self.image.as_ref().is_some_and(|m| !m.is_empty())
            || self.location.as_ref().is_some_and(|m| !m.is_empty())
            || self.photo.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Flattens all media metadata into `libre.graph.<kind>.<field>` entries.
    #[must_use]
    pub fn media_metadata(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(audio) = &self.audio {
            audio.write_flat(&MediaKind::Audio.storage_prefix(), &mut out);
        }
        if let Some(image) = &self.image {
            image.write_flat(&MediaKind::Image.storage_prefix(), &mut out);
        }
        if let Some(location) = &self.location {
            location.write_flat(&MediaKind::Location.storage_prefix(), &mut out);
        }
        if let Some(photo) = &self.photo {
            photo.write_flat(&MediaKind::Photo.storage_prefix(), &mut out);
        }
        out
    }
}

/// An entry in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Primary key.
    pub id: ResourceId,
    /// Root of the space this resource belongs to.
    pub root_id: ResourceId,
    /// Immediate parent, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    /// Path relative to the space root, always in `./a/b` form.
    pub path: String,
    /// File or folder.
    pub resource_type: ResourceType,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    /// True if any path segment starts with a dot.
    #[serde(default)]
    pub hidden: bool,
    /// Extracted content.
    pub document: Document,
}

impl Resource {
    /// Creates an index entry, normalizing the path and deriving `hidden`.
    #[must_use]
    pub fn new(
        id: ResourceId,
        root_id: ResourceId,
        parent_id: Option<ResourceId>,
        path: &str,
        resource_type: ResourceType,
        document: Document,
    ) -> Self {
        let path = make_relative_path(path);
        let hidden = is_hidden(&path);
        Self {
            id,
            root_id,
            parent_id,
            path,
            resource_type,
            deleted: false,
            hidden,
            document,
        }
    }

    /// Moves this entry to a new parent and path, updating name and hidden flag.
    pub fn relocate(&mut self, parent_id: ResourceId, new_path: &str) {
        self.path = make_relative_path(new_path);
        self.document.name = base_name(&self.path).to_string();
        self.hidden = is_hidden(&self.path);
        self.parent_id = Some(parent_id);
    }

    /// Rewrites the leading `old_prefix` of this entry's path to `new_prefix`.
    ///
    /// Returns false if the path does not lie below `old_prefix`.
    pub fn rebase(&mut self, old_prefix: &str, new_prefix: &str) -> bool {
        let Some(rest) = self.path.strip_prefix(old_prefix) else {
            return false;
        };
        if !rest.starts_with('/') {
            return false;
        }
        self.path = format!("{new_prefix}{rest}");
        self.hidden = is_hidden(&self.path);
        true
    }

    /// Returns the file or folder name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.document.name
    }
}

/// Returns true if any segment of a normalized path starts with a dot.
#[must_use]
pub fn is_hidden(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment.starts_with('.') && segment != ".")
}
