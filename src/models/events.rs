//! Storage change events consumed by the dispatcher.

use super::resource::{Reference, ResourceId, SpaceId, UserId};
use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timestamp(current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(timestamp: u64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp,
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A change in the storage tree.
///
/// `executant` is the user who caused the change, or the space owner when
/// the event source has no executant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file or folder was moved to the trash.
    ItemTrashed {
        /// Event metadata.
        meta: EventMeta,
        /// Id of the trashed item.
        id: ResourceId,
        /// Reference the item was trashed from.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// A trashed item was restored.
    ItemRestored {
        /// Event metadata.
        meta: EventMeta,
        /// Where the item was restored to.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// An item was moved or renamed.
    ItemMoved {
        /// Event metadata.
        meta: EventMeta,
        /// The new location of the item.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// A folder was created.
    ContainerCreated {
        /// Event metadata.
        meta: EventMeta,
        /// The new folder.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// A file upload finished.
    FileUploaded {
        /// Event metadata.
        meta: EventMeta,
        /// The uploaded file.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// Post-processing of an upload finished and the file is ready.
    UploadReady {
        /// Event metadata.
        meta: EventMeta,
        /// The uploaded file.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// A file was touched (created empty or mtime bumped).
    FileTouched {
        /// Event metadata.
        meta: EventMeta,
        /// The touched file.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// An older file version was restored.
    FileVersionRestored {
        /// Event metadata.
        meta: EventMeta,
        /// The file.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// Tags were added to an item.
    TagsAdded {
        /// Event metadata.
        meta: EventMeta,
        /// The tagged item.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
    /// Tags were removed from an item.
    TagsRemoved {
        /// Event metadata.
        meta: EventMeta,
        /// The item.
        reference: Reference,
        /// Acting user.
        executant: UserId,
    },
}

impl ChangeEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ItemTrashed { .. } => "item_trashed",
            Self::ItemRestored { .. } => "item_restored",
            Self::ItemMoved { .. } => "item_moved",
            Self::ContainerCreated { .. } => "container_created",
            Self::FileUploaded { .. } => "file_uploaded",
            Self::UploadReady { .. } => "upload_ready",
            Self::FileTouched { .. } => "file_touched",
            Self::FileVersionRestored { .. } => "file_version_restored",
            Self::TagsAdded { .. } => "tags_added",
            Self::TagsRemoved { .. } => "tags_removed",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::ItemTrashed { meta, .. }
            | Self::ItemRestored { meta, .. }
            | Self::ItemMoved { meta, .. }
            | Self::ContainerCreated { meta, .. }
            | Self::FileUploaded { meta, .. }
            | Self::UploadReady { meta, .. }
            | Self::FileTouched { meta, .. }
            | Self::FileVersionRestored { meta, .. }
            | Self::TagsAdded { meta, .. }
            | Self::TagsRemoved { meta, .. } => meta,
        }
    }

    /// Returns the reference the event is about.
    #[must_use]
    pub const fn reference(&self) -> &Reference {
        match self {
            Self::ItemTrashed { reference, .. }
            | Self::ItemRestored { reference, .. }
            | Self::ItemMoved { reference, .. }
            | Self::ContainerCreated { reference, .. }
            | Self::FileUploaded { reference, .. }
            | Self::UploadReady { reference, .. }
            | Self::FileTouched { reference, .. }
            | Self::FileVersionRestored { reference, .. }
            | Self::TagsAdded { reference, .. }
            | Self::TagsRemoved { reference, .. } => reference,
        }
    }

    /// Returns the acting user.
    #[must_use]
    pub const fn executant(&self) -> &UserId {
        match self {
            Self::ItemTrashed { executant, .. }
            | Self::ItemRestored { executant, .. }
            | Self::ItemMoved { executant, .. }
            | Self::ContainerCreated { executant, .. }
            | Self::FileUploaded { executant, .. }
            | Self::UploadReady { executant, .. }
            | Self::FileTouched { executant, .. }
            | Self::FileVersionRestored { executant, .. }
            | Self::TagsAdded { executant, .. }
            | Self::TagsRemoved { executant, .. } => executant,
        }
    }

    /// Returns the space containing the affected resource.
    #[must_use]
    pub fn space_id(&self) -> SpaceId {
        self.reference().resource_id.space()
    }
}
