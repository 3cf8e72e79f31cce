//! In-memory storage gateway.

use super::StorageGateway;
use crate::models::{
    ReceivedShare, Reference, ResourceId, ResourceInfo, SpaceFilter, StorageSpace, Token, UserId,
    base_name, make_relative_path,
};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct Node {
    info: ResourceInfo,
    children: Vec<ResourceId>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<ResourceId, Node>,
    spaces: Vec<(StorageSpace, BTreeSet<UserId>)>,
    shares: BTreeMap<(UserId, String), ReceivedShare>,
    unavailable: bool,
}

/// A storage gateway backed by an in-memory tree.
///
/// Tokens are `token:<user id>`; [`authenticate`](StorageGateway::authenticate)
/// accepts only the configured API key. Every user sees every resource;
/// space visibility is per user.
pub struct InMemoryGateway {
    api_key: String,
    state: RwLock<State>,
}

impl InMemoryGateway {
    /// Creates an empty gateway accepting `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a space and its root container, visible to `members` and its owner.
    pub fn add_space(&self, space: StorageSpace, root: ResourceInfo, members: &[UserId]) {
        let mut state = self.write();
        let mut visible: BTreeSet<UserId> = members.iter().cloned().collect();
        visible.insert(space.owner.clone());
        state.nodes.entry(root.id.clone()).or_insert(Node {
            info: root,
            children: Vec::new(),
        });
        state.spaces.push((space, visible));
    }

    /// Adds a space without a root node, e.g. a mountpoint alias.
    pub fn add_space_alias(&self, space: StorageSpace, members: &[UserId]) {
        let mut visible: BTreeSet<UserId> = members.iter().cloned().collect();
        visible.insert(space.owner.clone());
        self.write().spaces.push((space, visible));
    }

    /// Inserts or replaces a resource below its parent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the parent does not exist.
    pub fn put(&self, info: ResourceInfo) -> Result<()> {
        let mut state = self.write();
        let parent_id = info
            .parent_id
            .clone()
            .ok_or_else(|| Error::BadRequest(format!("resource {} has no parent", info.id)))?;
        let parent = state
            .nodes
            .get_mut(&parent_id)
            .ok_or_else(|| Error::NotFound(format!("parent {parent_id} does not exist")))?;
        if !parent.children.contains(&info.id) {
            parent.children.push(info.id.clone());
        }

        let id = info.id.clone();
        let children = state
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        state.nodes.insert(id, Node { info, children });
        Ok(())
    }

    /// Moves a resource under a new parent with a new name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the resource or the new parent does not exist.
    pub fn rename(&self, id: &ResourceId, new_parent: &ResourceId, new_name: &str) -> Result<()> {
        let mut state = self.write();
        if !state.nodes.contains_key(new_parent) {
            return Err(Error::NotFound(format!("parent {new_parent} does not exist")));
        }
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("resource {id} does not exist")))?;
        let old_parent = node.info.parent_id.replace(new_parent.clone());
        node.info.name = new_name.to_string();

        if let Some(old_parent) = old_parent {
            if let Some(node) = state.nodes.get_mut(&old_parent) {
                node.children.retain(|child| child != id);
            }
        }
        if let Some(parent) = state.nodes.get_mut(new_parent) {
            parent.children.push(id.clone());
        }
        Ok(())
    }

    /// Removes a resource and its subtree.
    pub fn remove(&self, id: &ResourceId) {
        let mut state = self.write();
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            let Some(node) = state.nodes.remove(&next) else {
                continue;
            };
            if let Some(parent_id) = &node.info.parent_id {
                if let Some(parent) = state.nodes.get_mut(parent_id) {
                    parent.children.retain(|child| *child != next);
                }
            }
            pending.extend(node.children);
        }
    }

    /// Records the received share `share_id` for `user`.
    pub fn add_received_share(&self, user: &UserId, share: ReceivedShare) {
        self.write()
            .shares
            .insert((user.clone(), share.id.clone()), share);
    }

    /// Makes every call fail with [`Error::Unavailable`] while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    fn check_available(state: &State, operation: &str) -> Result<()> {
        if state.unavailable {
            return Err(Error::unavailable(operation, "gateway is unavailable"));
        }
        Ok(())
    }

    fn user_of(token: &Token) -> Result<UserId> {
        token
            .as_str()
            .strip_prefix("token:")
            .map(UserId::new)
            .ok_or_else(|| Error::Unauthorized("invalid token".to_string()))
    }

    /// Returns the path of `id` relative to its space root.
    fn path_of(state: &State, id: &ResourceId) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = id.clone();
        loop {
            let node = state
                .nodes
                .get(&current)
                .ok_or_else(|| Error::NotFound(format!("resource {current} does not exist")))?;
            match &node.info.parent_id {
                Some(parent) => {
                    segments.push(node.info.name.clone());
                    current = parent.clone();
                },
                None => break,
            }
        }
        segments.reverse();
        Ok(make_relative_path(&segments.join("/")))
    }

    /// Resolves a reference to the id of the resource it points at.
    fn resolve(state: &State, reference: &Reference) -> Result<ResourceId> {
        let mut current = reference.resource_id.clone();
        if reference.path == "." {
            return Ok(current);
        }

        for segment in reference.path.trim_start_matches("./").split('/') {
            let node = state
                .nodes
                .get(&current)
                .ok_or_else(|| Error::NotFound(format!("resource {current} does not exist")))?;
            current = node
                .children
                .iter()
                .find(|child| {
                    state
                        .nodes
                        .get(*child)
                        .is_some_and(|n| n.info.name == segment)
                })
                .cloned()
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "{} does not exist below {}",
                        reference.path, reference.resource_id
                    ))
                })?;
        }
        Ok(current)
    }
}

impl StorageGateway for InMemoryGateway {
    fn authenticate(&self, user_id: &UserId, api_key: &str) -> Result<Token> {
        Self::check_available(&self.read(), "authenticate")?;
        if api_key != self.api_key {
            return Err(Error::Unauthorized(format!(
                "machine auth rejected for {user_id}"
            )));
        }
        Ok(Token::new(format!("token:{user_id}")))
    }

    fn stat(&self, token: &Token, reference: &Reference) -> Result<ResourceInfo> {
        let state = self.read();
        Self::check_available(&state, "stat")?;
        Self::user_of(token)?;
        let id = Self::resolve(&state, reference)?;
        state
            .nodes
            .get(&id)
            .map(|node| node.info.clone())
            .ok_or_else(|| Error::NotFound(format!("resource {id} does not exist")))
    }

    fn get_path(&self, token: &Token, id: &ResourceId) -> Result<String> {
        let state = self.read();
        Self::check_available(&state, "get_path")?;
        Self::user_of(token)?;
        Self::path_of(&state, id)
    }

    fn list_storage_spaces(
        &self,
        token: &Token,
        filter: &SpaceFilter,
    ) -> Result<Vec<StorageSpace>> {
        let state = self.read();
        Self::check_available(&state, "list_storage_spaces")?;
        let user = Self::user_of(token)?;
        Ok(state
            .spaces
            .iter()
            .filter(|(space, members)| members.contains(&user) && filter.matches(space))
            .map(|(space, _)| space.clone())
            .collect())
    }

    fn list_container(&self, token: &Token, id: &ResourceId) -> Result<Vec<ResourceInfo>> {
        let state = self.read();
        Self::check_available(&state, "list_container")?;
        Self::user_of(token)?;
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("resource {id} does not exist")))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| state.nodes.get(child))
            .map(|child| child.info.clone())
            .collect())
    }

    fn set_arbitrary_metadata(
        &self,
        token: &Token,
        reference: &Reference,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.write();
        Self::check_available(&state, "set_arbitrary_metadata")?;
        Self::user_of(token)?;
        let id = Self::resolve(&state, reference)?;
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("resource {id} does not exist")))?;
        node.info
            .arbitrary_metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn get_received_share(&self, token: &Token, share_id: &str) -> Result<Option<ReceivedShare>> {
        let state = self.read();
        Self::check_available(&state, "get_received_share")?;
        let user = Self::user_of(token)?;
        Ok(state.shares.get(&(user, share_id.to_string())).cloned())
    }
}

/// Builds a file or folder [`ResourceInfo`] below `parent`.
///
/// The id shares the parent's storage and space; `path` is only used for the
/// name.
#[must_use]
pub fn child_info(
    parent: &ResourceId,
    opaque_id: &str,
    path: &str,
    resource_type: crate::models::ResourceType,
) -> ResourceInfo {
    ResourceInfo {
        id: ResourceId::new(&parent.storage_id, &parent.space_id, opaque_id),
        parent_id: Some(parent.clone()),
        name: base_name(path).to_string(),
        resource_type,
        ..ResourceInfo::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::WalkControl;
    use crate::models::{ResourceType, SpaceType};

    fn setup() -> (InMemoryGateway, Token, ResourceId) {
        let gateway = InMemoryGateway::new("secret");
        let root = ResourceId::new("st", "sp", "sp");
        gateway.add_space(
            StorageSpace {
                id: "st$sp".to_string(),
                space_type: SpaceType::Personal,
                owner: UserId::new("alice"),
                root: root.clone(),
                root_info: None,
                opaque: BTreeMap::new(),
            },
            ResourceInfo {
                id: root.clone(),
                resource_type: ResourceType::Container,
                ..ResourceInfo::default()
            },
            &[],
        );
        gateway
            .put(child_info(&root, "dir", "dir", ResourceType::Container))
            .unwrap();
        let dir = ResourceId::new("st", "sp", "dir");
        gateway
            .put(child_info(&dir, "a", "a.txt", ResourceType::File))
            .unwrap();
        gateway
            .put(child_info(&root, "b", "b.txt", ResourceType::File))
            .unwrap();

        let token = gateway.authenticate(&UserId::new("alice"), "secret").unwrap();
        (gateway, token, root)
    }

    #[test]
    fn test_authenticate_rejects_wrong_key() {
        let gateway = InMemoryGateway::new("secret");
        let err = gateway
            .authenticate(&UserId::new("alice"), "wrong")
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_stat_by_path_and_get_path() {
        let (gateway, token, root) = setup();
        let info = gateway
            .stat(&token, &Reference::new(root, "./dir/a.txt"))
            .unwrap();
        assert_eq!(info.id.opaque_id, "a");
        assert_eq!(gateway.get_path(&token, &info.id).unwrap(), "./dir/a.txt");
    }

    #[test]
    fn test_walk_visits_parents_first_and_skips_subtrees() {
        let (gateway, token, root) = setup();

        let mut visited = Vec::new();
        gateway
            .walk_tree(&token, &root, &mut |path, _| {
                visited.push(path.to_string());
                Ok(WalkControl::Continue)
            })
            .unwrap();
        assert_eq!(visited, vec![".", "./dir", "./dir/a.txt", "./b.txt"]);

        let mut visited = Vec::new();
        gateway
            .walk_tree(&token, &root, &mut |path, _| {
                visited.push(path.to_string());
                Ok(if path == "./dir" {
                    WalkControl::SkipSubtree
                } else {
                    WalkControl::Continue
                })
            })
            .unwrap();
        assert_eq!(visited, vec![".", "./dir", "./b.txt"]);
    }

    #[test]
    fn test_rename_updates_path() {
        let (gateway, token, root) = setup();
        let dir = ResourceId::new("st", "sp", "dir");
        gateway.rename(&dir, &root, "renamed").unwrap();
        let a = ResourceId::new("st", "sp", "a");
        assert_eq!(gateway.get_path(&token, &a).unwrap(), "./renamed/a.txt");
    }

    #[test]
    fn test_unavailable() {
        let (gateway, token, root) = setup();
        gateway.set_unavailable(true);
        let err = gateway.stat(&token, &Reference::to_id(root)).unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }
}
