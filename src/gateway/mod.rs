//! Storage gateway boundary.
//!
//! The gateway is the only way the services see storage: authentication,
//! stat, path resolution, space listing and tree walks. Implementations
//! wrap whatever transport the deployment uses; [`InMemoryGateway`] keeps a
//! tree in memory for tests and local tooling.

mod memory;

pub use memory::{InMemoryGateway, child_info};

use crate::Result;
use crate::models::{
    ReceivedShare, Reference, ResourceId, ResourceInfo, SpaceFilter, StorageSpace, Token, UserId,
    join_path,
};
use std::collections::BTreeMap;

/// What a tree walk should do after visiting a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Descend into the resource if it is a container.
    Continue,
    /// Do not descend into the resource.
    SkipSubtree,
}

/// Client for the storage gateway.
///
/// All calls are blocking from the caller's point of view.
pub trait StorageGateway: Send + Sync {
    /// Authenticates `user_id` with the machine auth key and returns a token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unauthorized`] if the key is rejected, or
    /// [`crate::Error::Unavailable`] if the gateway cannot be reached.
    fn authenticate(&self, user_id: &UserId, api_key: &str) -> Result<Token>;

    /// Returns the metadata of the referenced resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the resource does not exist.
    fn stat(&self, token: &Token, reference: &Reference) -> Result<ResourceInfo>;

    /// Returns the path of a resource relative to its space root.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the resource does not exist.
    fn get_path(&self, token: &Token, id: &ResourceId) -> Result<String>;

    /// Lists the spaces visible to the token's user.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    fn list_storage_spaces(&self, token: &Token, filter: &SpaceFilter)
    -> Result<Vec<StorageSpace>>;

    /// Lists the direct children of a container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the container does not exist.
    fn list_container(&self, token: &Token, id: &ResourceId) -> Result<Vec<ResourceInfo>>;

    /// Merges `metadata` into the arbitrary metadata of a resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the resource does not exist.
    fn set_arbitrary_metadata(
        &self,
        token: &Token,
        reference: &Reference,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Returns the token user's view of a share, if they received it.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    fn get_received_share(&self, token: &Token, share_id: &str) -> Result<Option<ReceivedShare>>;

    /// Walks the tree below `root` depth first, parents before children.
    ///
    /// `visit` receives the path of each resource relative to `root` (`.` for
    /// `root` itself) and its metadata. Returning
    /// [`WalkControl::SkipSubtree`] for a container skips its children.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the gateway or by `visit`; the walk
    /// stops there.
    fn walk_tree(
        &self,
        token: &Token,
        root: &ResourceId,
        visit: &mut dyn FnMut(&str, &ResourceInfo) -> Result<WalkControl>,
    ) -> Result<()> {
        let info = self.stat(token, &Reference::to_id(root.clone()))?;
        let mut stack = vec![(".".to_string(), info)];

        while let Some((path, info)) = stack.pop() {
            if visit(&path, &info)? == WalkControl::SkipSubtree
                || !info.resource_type.is_container()
            {
                continue;
            }

            let children = self.list_container(token, &info.id)?;
            // reversed so the first child is visited first
            for child in children.into_iter().rev() {
                let child_path = join_path(&path, &child.name);
                stack.push((child_path, child));
            }
        }

        Ok(())
    }
}
