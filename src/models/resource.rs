//! Resource identity and path helpers.
//!
//! Identifiers are serialized the way the storage platform prints them:
//! `<storage>$<space>!<opaque>`. A space id is the `<storage>$<space>` part,
//! and a space root is the resource whose opaque id equals its space id.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STORAGE_DELIMITER: char = '$';
const OPAQUE_DELIMITER: char = '!';

/// Globally unique identifier of a file, folder or space root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    /// Storage provider id.
    pub storage_id: String,
    /// Space id within the storage provider.
    pub space_id: String,
    /// Opaque node id within the space.
    pub opaque_id: String,
}

impl ResourceId {
    /// Creates a new resource id.
    #[must_use]
    pub fn new(
        storage_id: impl Into<String>,
        space_id: impl Into<String>,
        opaque_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// Returns the id of the root of the space this resource lives in.
    ///
    /// Space roots are self-referential: their opaque id is the space id.
    #[must_use]
    pub fn space_root(&self) -> Self {
        Self::new(&self.storage_id, &self.space_id, &self.space_id)
    }

    /// Returns true if this id points at the root of its space.
    #[must_use]
    pub fn is_space_root(&self) -> bool {
        self.opaque_id == self.space_id
    }

    /// Returns the id of the space this resource lives in.
    #[must_use]
    pub fn space(&self) -> SpaceId {
        SpaceId::new(&self.storage_id, &self.space_id)
    }

    /// Parses an id of the form `storage$space!opaque`.
    ///
    /// The `!opaque` part is optional and the `storage$` part may be omitted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty string or an empty space id.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::BadRequest("empty resource id".to_string()));
        }

        let (storage_space, opaque) = match s.split_once(OPAQUE_DELIMITER) {
            Some((head, opaque)) => (head, opaque),
            None => (s, ""),
        };
        let (storage, space) = match storage_space.split_once(STORAGE_DELIMITER) {
            Some((storage, space)) => (storage, space),
            None => ("", storage_space),
        };

        if space.is_empty() {
            return Err(Error::BadRequest(format!("invalid resource id: {s}")));
        }

        Ok(Self::new(storage, space, opaque))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.storage_id.is_empty() {
            write!(f, "{}{STORAGE_DELIMITER}", self.storage_id)?;
        }
        write!(f, "{}", self.space_id)?;
        if !self.opaque_id.is_empty() {
            write!(f, "{OPAQUE_DELIMITER}{}", self.opaque_id)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Identifier of a storage space (`storage$space`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId {
    /// Storage provider id.
    pub storage_id: String,
    /// Space id within the storage provider.
    pub space_id: String,
}

impl SpaceId {
    /// Creates a new space id.
    #[must_use]
    pub fn new(storage_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
        }
    }

    /// Parses a space id; any `!opaque` suffix is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] unless both storage and space id are present.
    pub fn parse(s: &str) -> Result<Self> {
        let id = ResourceId::parse(s)?;
        if id.storage_id.is_empty() || id.space_id.is_empty() {
            return Err(Error::BadRequest(format!("invalid space id: {s}")));
        }
        Ok(Self::new(id.storage_id, id.space_id))
    }

    /// Returns the resource id of the space root.
    #[must_use]
    pub fn root(&self) -> ResourceId {
        ResourceId::new(&self.storage_id, &self.space_id, &self.space_id)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{STORAGE_DELIMITER}{}", self.storage_id, self.space_id)
    }
}

/// Identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An authentication token issued by the gateway.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// The identity a request runs as.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// The user.
    pub user_id: UserId,
    /// Token authenticating the user against the gateway.
    pub token: Token,
}

impl UserContext {
    /// Creates a new user context.
    #[must_use]
    pub const fn new(user_id: UserId, token: Token) -> Self {
        Self { user_id, token }
    }
}

/// A resource addressed relative to another resource (usually a space root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// The anchor resource.
    pub resource_id: ResourceId,
    /// Path relative to the anchor (`.` for the anchor itself).
    pub path: String,
}

impl Reference {
    /// Creates a reference, normalizing the path.
    #[must_use]
    pub fn new(resource_id: ResourceId, path: &str) -> Self {
        Self {
            resource_id,
            path: make_relative_path(path),
        }
    }

    /// Creates a reference to the anchor itself.
    #[must_use]
    pub fn to_id(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            path: ".".to_string(),
        }
    }
}

/// Normalizes a path to the `./a/b` form used throughout the index.
///
/// Empty and root paths become `.`; `.` and `..` segments are resolved and
/// trailing slashes are dropped.
///
/// # Examples
///
/// ```
/// use spacesearch::models::make_relative_path;
///
/// assert_eq!(make_relative_path(""), ".");
/// assert_eq!(make_relative_path("/"), ".");
/// assert_eq!(make_relative_path("/grant/path"), "./grant/path");
/// assert_eq!(make_relative_path("./doc/"), "./doc");
/// ```
#[must_use]
pub fn make_relative_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", segments.join("/"))
    }
}

/// Joins a relative directory and a child name into a normalized path.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    make_relative_path(&format!("{dir}/{name}"))
}

/// Returns the last segment of a normalized path (`.` for the root).
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns true if `path` equals `prefix` or lies below it.
#[must_use]
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "." {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_roundtrip() {
        let id = ResourceId::new("storage-1", "space-1", "node-1");
        assert_eq!(id.to_string(), "storage-1$space-1!node-1");
        assert_eq!(ResourceId::parse("storage-1$space-1!node-1").unwrap(), id);
    }

    #[test]
    fn test_resource_id_without_opaque() {
        let id = ResourceId::parse("storage-1$space-1").unwrap();
        assert_eq!(id.storage_id, "storage-1");
        assert_eq!(id.space_id, "space-1");
        assert!(id.opaque_id.is_empty());
        assert_eq!(id.to_string(), "storage-1$space-1");
    }

    #[test]
    fn test_resource_id_parse_rejects_empty() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("storage$").is_err());
    }

    #[test]
    fn test_space_root_is_self_referential() {
        let id = ResourceId::new("s", "sp", "file");
        let root = id.space_root();
        assert!(root.is_space_root());
        assert_eq!(root.opaque_id, "sp");
        assert_eq!(id.space().root(), root);
    }

    #[test]
    fn test_space_id_parse_requires_storage() {
        assert!(SpaceId::parse("space-only").is_err());
        let space = SpaceId::parse("st$sp!ignored").unwrap();
        assert_eq!(space.to_string(), "st$sp");
    }

    #[test]
    fn test_make_relative_path() {
        assert_eq!(make_relative_path("."), ".");
        assert_eq!(make_relative_path("a/b"), "./a/b");
        assert_eq!(make_relative_path("./a//b/"), "./a/b");
        assert_eq!(make_relative_path("/a/../b"), "./b");
    }

    #[test]
    fn test_join_and_base_name() {
        assert_eq!(join_path(".", "doc"), "./doc");
        assert_eq!(join_path("./doc", "file.pdf"), "./doc/file.pdf");
        assert_eq!(base_name("./doc/file.pdf"), "file.pdf");
        assert_eq!(base_name("."), ".");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("./doc/file.pdf", "./doc"));
        assert!(is_within("./doc", "./doc"));
        assert!(!is_within("./docs/file.pdf", "./doc"));
        assert!(is_within("./anything", "."));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
    }
}
