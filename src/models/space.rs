//! Storage spaces and the resource metadata the gateway returns.

use super::document::ResourceType;
use super::resource::{ResourceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque key marking a trashed space.
pub const OPAQUE_TRASHED: &str = "trashed";
/// Opaque keys a mountpoint uses to point at its grant.
pub const OPAQUE_GRANT_STORAGE_ID: &str = "grantStorageID";
/// See [`OPAQUE_GRANT_STORAGE_ID`].
pub const OPAQUE_GRANT_SPACE_ID: &str = "grantSpaceID";
/// See [`OPAQUE_GRANT_STORAGE_ID`].
pub const OPAQUE_GRANT_OPAQUE_ID: &str = "grantOpaqueID";

/// The kind of a storage space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    /// A user's own drive.
    Personal,
    /// A project drive.
    Project,
    /// The canonical location of something shared with the user.
    Grant,
    /// The alias under which a grant appears in the user's namespace.
    Mountpoint,
}

impl SpaceType {
    /// Returns the lowercase type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Project => "project",
            Self::Grant => "grant",
            Self::Mountpoint => "mountpoint",
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Space id of the virtual space that holds received shares.
pub const SHARE_STORAGE_SPACE_ID: &str = "a0ca6a90-a365-4782-871e-d44447bbc668";

/// Permissions the current user holds on a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ResourcePermissions {
    /// May create folders.
    pub create_container: bool,
    /// May delete.
    pub delete: bool,
    /// May read the path of the resource.
    pub get_path: bool,
    /// May read the quota.
    pub get_quota: bool,
    /// May download file content.
    pub initiate_file_download: bool,
    /// May upload file content.
    pub initiate_file_upload: bool,
    /// May list folder children.
    pub list_container: bool,
    /// May list file versions.
    pub list_file_versions: bool,
    /// May list the trash.
    pub list_recycle: bool,
    /// May empty the trash.
    pub purge_recycle: bool,
    /// May restore file versions.
    pub restore_file_version: bool,
    /// May restore trashed items.
    pub restore_recycle_item: bool,
    /// May stat the resource.
    pub stat: bool,
}

impl ResourcePermissions {
    /// Every permission granted (space manager).
    #[must_use]
    pub const fn full() -> Self {
        Self {
            create_container: true,
            delete: true,
            get_path: true,
            get_quota: true,
            initiate_file_download: true,
            initiate_file_upload: true,
            list_container: true,
            list_file_versions: true,
            list_recycle: true,
            purge_recycle: true,
            restore_file_version: true,
            restore_recycle_item: true,
            stat: true,
        }
    }

    /// Read-only access (viewer).
    #[must_use]
    pub const fn viewer() -> Self {
        Self {
            get_path: true,
            get_quota: true,
            initiate_file_download: true,
            list_container: true,
            list_file_versions: true,
            list_recycle: true,
            stat: true,
            ..Self::none()
        }
    }

    /// No permission at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            create_container: false,
            delete: false,
            get_path: false,
            get_quota: false,
            initiate_file_download: false,
            initiate_file_upload: false,
            list_container: false,
            list_file_versions: false,
            list_recycle: false,
            purge_recycle: false,
            restore_file_version: false,
            restore_recycle_item: false,
            stat: false,
        }
    }

    /// Renders the permissions as a WebDAV `oc:permissions` string.
    ///
    /// Letters: `S` shared, `R` shareable, `M` mounted, `D` deletable,
    /// `NV` renameable/movable, `W` writable file, `CK` folder accepting new children.
    #[must_use]
    pub fn to_webdav(&self, is_shared: bool, is_mountpoint: bool, is_dir: bool) -> String {
        let mut out = String::new();
        if is_shared {
            out.push('S');
        }
        if self.list_container
            && self.list_file_versions
            && self.list_recycle
            && self.stat
            && self.get_path
            && self.get_quota
            && self.initiate_file_download
        {
            out.push('R');
        }
        if is_mountpoint {
            out.push('M');
        }
        if self.delete && self.purge_recycle {
            out.push('D');
        }
        if self.initiate_file_upload && self.restore_file_version && self.restore_recycle_item {
            out.push_str("NV");
            if !is_dir {
                out.push('W');
            }
        }
        if is_dir
            && self.list_container
            && self.stat
            && self.create_container
            && self.initiate_file_upload
        {
            out.push_str("CK");
        }
        out
    }
}

/// Resource metadata as returned by a `stat` against the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource id.
    pub id: ResourceId,
    /// Parent id (absent for space roots).
    #[serde(default)]
    pub parent_id: Option<ResourceId>,
    /// Name.
    pub name: String,
    /// File or folder.
    pub resource_type: ResourceType,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Arbitrary metadata stored with the resource.
    #[serde(default)]
    pub arbitrary_metadata: BTreeMap<String, String>,
    /// The caller's permissions.
    #[serde(default)]
    pub permission_set: ResourcePermissions,
}

/// A storage space visible to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpace {
    /// Space id, `storage$space`.
    pub id: String,
    /// Kind of space.
    pub space_type: SpaceType,
    /// Owner of the space.
    pub owner: UserId,
    /// Root resource of the space.
    pub root: ResourceId,
    /// Stat of the space root, if the gateway included it.
    #[serde(default)]
    pub root_info: Option<ResourceInfo>,
    /// Opaque key-value map carrying grant linkage and flags.
    #[serde(default)]
    pub opaque: BTreeMap<String, String>,
}

impl StorageSpace {
    /// Returns true if the space has been moved to the trash.
    #[must_use]
    pub fn is_trashed(&self) -> bool {
        self.opaque.get(OPAQUE_TRASHED).map(String::as_str) == Some(OPAQUE_TRASHED)
    }

    /// For a mountpoint, returns the id of the grant it aliases.
    #[must_use]
    pub fn grant_id(&self) -> Option<ResourceId> {
        let storage = self.opaque.get(OPAQUE_GRANT_STORAGE_ID)?;
        let space = self.opaque.get(OPAQUE_GRANT_SPACE_ID)?;
        let opaque = self.opaque.get(OPAQUE_GRANT_OPAQUE_ID)?;
        Some(ResourceId::new(storage, space, opaque))
    }
}

/// Restricts the spaces returned by `list_storage_spaces`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceFilter {
    /// Only spaces of these types; empty means all.
    pub space_types: Vec<SpaceType>,
    /// Only the space with this id.
    pub space_id: Option<String>,
}

impl SpaceFilter {
    /// Matches every space.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches a single space by id.
    #[must_use]
    pub fn by_id(space_id: impl Into<String>) -> Self {
        Self {
            space_types: Vec::new(),
            space_id: Some(space_id.into()),
        }
    }

    /// Returns true if `space` passes this filter.
    #[must_use]
    pub fn matches(&self, space: &StorageSpace) -> bool {
        (self.space_types.is_empty() || self.space_types.contains(&space.space_type))
            && self.space_id.as_ref().is_none_or(|id| *id == space.id)
    }
}

/// The recipient's view of a share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedShare {
    /// Share id.
    pub id: String,
    /// The recipient hid the share from their namespace.
    pub hidden: bool,
}
