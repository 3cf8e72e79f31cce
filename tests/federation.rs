//! Federated search over personal, project and shared spaces.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use secrecy::SecretString;
use spacesearch::gateway::child_info;
use spacesearch::models::{
    Document, Entity, Match, OPAQUE_GRANT_OPAQUE_ID, OPAQUE_GRANT_SPACE_ID,
    OPAQUE_GRANT_STORAGE_ID, OPAQUE_TRASHED, ReceivedShare, Reference, Resource, ResourceId,
    ResourceInfo, ResourcePermissions, ResourceType, SHARE_STORAGE_SPACE_ID, SearchIndexRequest,
    SearchIndexResponse, SearchRequest, SpaceFilter, SpaceType, StorageSpace, Token, UserContext,
    UserId,
    effective_limit, is_within, sort_by_score,
};
use spacesearch::storage::MemoryBackend;
use spacesearch::{Error, IndexBackend, InMemoryGateway, Result, SearchService, StorageGateway};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const API_KEY: &str = "machine-secret";

fn user() -> UserContext {
    UserContext::new(UserId::new("marie"), Token::new("token:marie"))
}

fn space(id: &str, space_type: SpaceType, owner: &str) -> StorageSpace {
    let (storage, space) = id.split_once('$').unwrap();
    StorageSpace {
        id: id.to_string(),
        space_type,
        owner: UserId::new(owner),
        root: ResourceId::new(storage, space, space),
        root_info: None,
        opaque: BTreeMap::new(),
    }
}

fn root_info(root: &ResourceId) -> ResourceInfo {
    ResourceInfo {
        id: root.clone(),
        resource_type: ResourceType::Container,
        ..ResourceInfo::default()
    }
}

/// Index returning canned matches per space root and recording every request.
#[derive(Default)]
struct StubIndex {
    hits: Vec<(ResourceId, String, f32)>,
    requests: Mutex<Vec<SearchIndexRequest>>,
}

impl StubIndex {
    fn with_hit(mut self, root: &ResourceId, path: &str, score: f32) -> Self {
        self.hits.push((root.clone(), path.to_string(), score));
        self
    }

    fn searched_roots(&self) -> Vec<ResourceId> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.reference.as_ref().map(|r| r.resource_id.clone()))
            .collect()
    }
}

impl IndexBackend for StubIndex {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let scope = request.reference.as_ref();
        let mut matches: Vec<Match> = self
            .hits
            .iter()
            .filter(|(root, path, _)| {
                scope.is_none_or(|s| s.resource_id == *root && is_within(path, &s.path))
            })
            .map(|(root, path, score)| {
                let resource = Resource::new(
                    ResourceId::new(&root.storage_id, &root.space_id, path.as_str()),
                    root.clone(),
                    None,
                    path,
                    ResourceType::File,
                    Document::default(),
                );
                Match {
                    score: *score,
                    entity: Entity::from_resource(&resource),
                }
            })
            .collect();

        let total_matches = i32::try_from(matches.len()).unwrap();
        sort_by_score(&mut matches);
        if let Some(limit) = effective_limit(request.page_size) {
            matches.truncate(limit);
        }
        Ok(SearchIndexResponse {
            matches,
            total_matches,
        })
    }

    fn upsert(&self, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    fn move_resource(&self, _: &ResourceId, _: &ResourceId, _: &str) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _id: &ResourceId) -> Result<()> {
        Ok(())
    }

    fn restore(&self, _id: &ResourceId) -> Result<()> {
        Ok(())
    }

    fn purge(&self, _id: &ResourceId) -> Result<bool> {
        Ok(false)
    }

    fn get(&self, _id: &ResourceId) -> Result<Option<Resource>> {
        Ok(None)
    }

    fn doc_count(&self) -> Result<u64> {
        Ok(0)
    }
}

/// Two personal spaces visible to marie.
fn two_spaces() -> (Arc<InMemoryGateway>, ResourceId, ResourceId) {
    let gateway = Arc::new(InMemoryGateway::new(API_KEY));
    let a = space("st$a", SpaceType::Personal, "marie");
    let b = space("st$b", SpaceType::Project, "einstein");
    let (root_a, root_b) = (a.root.clone(), b.root.clone());
    gateway.add_space(a, root_info(&root_a), &[]);
    gateway.add_space(b, root_info(&root_b), &[UserId::new("marie")]);
    (gateway, root_a, root_b)
}

fn service(gateway: Arc<InMemoryGateway>, index: Arc<dyn IndexBackend>) -> SearchService {
    SearchService::new(gateway, index, SecretString::from(API_KEY))
}

fn scores(matches: &[Match]) -> Vec<f32> {
    matches.iter().map(|m| m.score).collect()
}

#[test]
fn merges_ranks_and_caps_results() {
    let (gateway, root_a, root_b) = two_spaces();
    let index = Arc::new(
        StubIndex::default()
            .with_hit(&root_a, "./high.txt", 2.0)
            .with_hit(&root_a, "./low.txt", 0.01)
            .with_hit(&root_b, "./mid.txt", 1.0),
    );
    let service = service(gateway, index);

    let response = service
        .search(&user(), &SearchRequest::new("txt").with_page_size(2))
        .unwrap();
    assert_eq!(scores(&response.matches), vec![2.0, 1.0]);
    assert_eq!(response.total_matches, 3);

    let response = service.search(&user(), &SearchRequest::new("txt")).unwrap();
    assert_eq!(scores(&response.matches), vec![2.0, 1.0, 0.01]);
    assert_eq!(response.total_matches, 3);
}

#[test]
fn sequential_fanout_gives_the_same_results() {
    let (gateway, root_a, root_b) = two_spaces();
    let index = Arc::new(
        StubIndex::default()
            .with_hit(&root_a, "./high.txt", 2.0)
            .with_hit(&root_b, "./mid.txt", 1.0),
    );
    let service = service(gateway, index).with_fanout_workers(1);

    let response = service.search(&user(), &SearchRequest::new("txt")).unwrap();
    assert_eq!(scores(&response.matches), vec![2.0, 1.0]);
}

#[test]
fn plain_queries_become_name_substring_matches() {
    let (gateway, _, _) = two_spaces();
    let index = Arc::new(StubIndex::default());
    let service = service(gateway, index.clone());

    service
        .search(&user(), &SearchRequest::new("Annual Report"))
        .unwrap();

    let requests = index.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.query == r"Name:*annual\ report*"));
}

#[test]
fn empty_query_is_rejected() {
    let (gateway, _, _) = two_spaces();
    let service = service(gateway, Arc::new(StubIndex::default()));

    let err = service.search(&user(), &SearchRequest::new("")).unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let err = service
        .search(&user(), &SearchRequest::new("   "))
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[test]
fn trashed_spaces_are_skipped() {
    let (gateway, root_a, _) = two_spaces();
    let mut trashed = space("st$trash", SpaceType::Project, "marie");
    trashed
        .opaque
        .insert(OPAQUE_TRASHED.to_string(), OPAQUE_TRASHED.to_string());
    let trashed_root = trashed.root.clone();
    gateway.add_space(trashed, root_info(&trashed_root), &[]);

    let index = Arc::new(StubIndex::default().with_hit(&trashed_root, "./gone.txt", 5.0));
    let service = service(gateway, index.clone());

    let response = service.search(&user(), &SearchRequest::new("txt")).unwrap();
    assert!(response.matches.is_empty());
    let searched = index.searched_roots();
    assert!(searched.contains(&root_a));
    assert!(!searched.contains(&trashed_root));
}

#[test]
fn reference_limits_search_to_one_space_and_excludes_the_scope_folder() {
    let (gateway, root_a, root_b) = two_spaces();
    let index = Arc::new(
        StubIndex::default()
            .with_hit(&root_a, "./docs", 3.0)
            .with_hit(&root_a, "./docs/a.txt", 1.0)
            .with_hit(&root_a, "./other.txt", 1.0)
            .with_hit(&root_b, "./docs/b.txt", 1.0),
    );
    let service = service(gateway, index.clone());

    let request =
        SearchRequest::new("txt").with_reference(Reference::new(root_a.clone(), "./docs"));
    let response = service.search(&user(), &request).unwrap();

    let paths: Vec<&str> = response
        .matches
        .iter()
        .map(|m| m.entity.reference.path.as_str())
        .collect();
    assert_eq!(paths, vec!["./docs/a.txt"]);
    assert_eq!(index.searched_roots(), vec![root_a]);
}

#[test]
fn gateway_failures_propagate() {
    let (gateway, _, _) = two_spaces();
    gateway.set_unavailable(true);
    let service = service(gateway, Arc::new(StubIndex::default()));

    let err = service.search(&user(), &SearchRequest::new("x")).unwrap_err();
    assert!(matches!(err, Error::Unavailable { .. }));
}

/// The owner's space holds `./grant/path/to/Shared.pdf`; `./grant/path` is
/// shared with marie and mounted in her share jail as `share-1`.
struct SharedFixture {
    gateway: Arc<InMemoryGateway>,
    index: Arc<MemoryBackend>,
    grant_root: ResourceId,
    mount_root: ResourceId,
}

fn shared_fixture() -> SharedFixture {
    let gateway = Arc::new(InMemoryGateway::new(API_KEY));
    let owner = space("st$owner", SpaceType::Personal, "einstein");
    let owner_root = owner.root.clone();
    gateway.add_space(owner, root_info(&owner_root), &[]);

    let grant_dir = ResourceId::new("st", "owner", "grant");
    let grant_root = ResourceId::new("st", "owner", "grantnode");
    let to_dir = ResourceId::new("st", "owner", "to");
    gateway
        .put(child_info(&owner_root, "grant", "grant", ResourceType::Container))
        .unwrap();
    gateway
        .put(child_info(&grant_dir, "grantnode", "path", ResourceType::Container))
        .unwrap();
    gateway
        .put(child_info(&grant_root, "to", "to", ResourceType::Container))
        .unwrap();
    gateway
        .put(child_info(&to_dir, "shared", "Shared.pdf", ResourceType::File))
        .unwrap();

    let mut grant = space("st$owner", SpaceType::Grant, "einstein");
    grant.id = "st$owner!grantnode".to_string();
    grant.root = grant_root.clone();
    grant.root_info = Some(ResourceInfo {
        permission_set: ResourcePermissions::viewer(),
        ..root_info(&grant_root)
    });
    gateway.add_space_alias(grant, &[UserId::new("marie")]);

    let mount_root = ResourceId::new("st", SHARE_STORAGE_SPACE_ID, "share-1");
    let mut mountpoint = space("st$share", SpaceType::Mountpoint, "marie");
    mountpoint.id = format!("st${SHARE_STORAGE_SPACE_ID}!share-1");
    mountpoint.root = mount_root.clone();
    mountpoint.opaque.extend([
        (OPAQUE_GRANT_STORAGE_ID.to_string(), "st".to_string()),
        (OPAQUE_GRANT_SPACE_ID.to_string(), "owner".to_string()),
        (OPAQUE_GRANT_OPAQUE_ID.to_string(), "grantnode".to_string()),
    ]);
    gateway.add_space_alias(mountpoint, &[]);

    let index = Arc::new(MemoryBackend::new().unwrap());
    for (opaque, path) in [
        ("shared", "./grant/path/to/Shared.pdf"),
        ("private", "./private/Shared notes.pdf"),
    ] {
        index
            .upsert(&Resource::new(
                ResourceId::new("st", "owner", opaque),
                owner_root.clone(),
                None,
                path,
                ResourceType::File,
                Document {
                    name: path.rsplit('/').next().unwrap().to_string(),
                    ..Document::default()
                },
            ))
            .unwrap();
    }

    SharedFixture {
        gateway,
        index,
        grant_root,
        mount_root,
    }
}

#[test]
fn grant_matches_are_reported_under_the_mountpoint() {
    let fixture = shared_fixture();
    let service = service(fixture.gateway, fixture.index);

    let response = service.search(&user(), &SearchRequest::new("shared")).unwrap();

    assert_eq!(response.total_matches, 1);
    let entity = &response.matches[0].entity;
    assert_eq!(entity.reference.resource_id, fixture.mount_root);
    assert_eq!(entity.reference.path, "./to/Shared.pdf");
    assert_eq!(entity.share_root_name.as_deref(), Some("/path"));
    assert_eq!(entity.remote_item_id.as_ref(), Some(&fixture.grant_root));
    assert_eq!(entity.permissions, "SR");
}

#[test]
fn hidden_shares_are_skipped() {
    let fixture = shared_fixture();
    fixture.gateway.add_received_share(
        &UserId::new("marie"),
        ReceivedShare {
            id: "share-1".to_string(),
            hidden: true,
        },
    );
    let service = service(fixture.gateway, fixture.index);

    let response = service.search(&user(), &SearchRequest::new("shared")).unwrap();
    assert!(response.matches.is_empty());
    assert_eq!(response.total_matches, 0);
}

/// Delegates to an in-memory gateway but cannot load received shares.
struct ShareLookupFails(Arc<InMemoryGateway>);

impl StorageGateway for ShareLookupFails {
    fn authenticate(&self, user_id: &UserId, api_key: &str) -> Result<Token> {
        self.0.authenticate(user_id, api_key)
    }

    fn stat(&self, token: &Token, reference: &Reference) -> Result<ResourceInfo> {
        self.0.stat(token, reference)
    }

    fn get_path(&self, token: &Token, id: &ResourceId) -> Result<String> {
        self.0.get_path(token, id)
    }

    fn list_storage_spaces(
        &self,
        token: &Token,
        filter: &SpaceFilter,
    ) -> Result<Vec<StorageSpace>> {
        self.0.list_storage_spaces(token, filter)
    }

    fn list_container(&self, token: &Token, id: &ResourceId) -> Result<Vec<ResourceInfo>> {
        self.0.list_container(token, id)
    }

    fn set_arbitrary_metadata(
        &self,
        token: &Token,
        reference: &Reference,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.0.set_arbitrary_metadata(token, reference, metadata)
    }

    fn get_received_share(&self, _token: &Token, _share_id: &str) -> Result<Option<ReceivedShare>> {
        Err(Error::unavailable("get_received_share", "share manager is down"))
    }
}

#[test]
fn share_lookup_failures_keep_the_grant_visible() {
    let fixture = shared_fixture();
    let gateway = Arc::new(ShareLookupFails(fixture.gateway));
    let service = SearchService::new(gateway, fixture.index, SecretString::from(API_KEY));

    let response = service.search(&user(), &SearchRequest::new("shared")).unwrap();

    assert_eq!(response.total_matches, 1);
    let entity = &response.matches[0].entity;
    assert_eq!(entity.reference.resource_id, fixture.mount_root);
    assert_eq!(entity.reference.path, "./to/Shared.pdf");
}

#[test]
fn grants_without_a_mountpoint_are_skipped() {
    let gateway = Arc::new(InMemoryGateway::new(API_KEY));
    let mut grant = space("st$owner", SpaceType::Grant, "einstein");
    grant.root = ResourceId::new("st", "owner", "orphan");
    gateway.add_space_alias(grant, &[UserId::new("marie")]);
    let index = Arc::new(StubIndex::default());
    let service = service(gateway, index.clone());

    let response = service.search(&user(), &SearchRequest::new("x")).unwrap();
    assert!(response.matches.is_empty());
    assert!(index.requests.lock().unwrap().is_empty());
}

#[test]
fn scope_token_resolves_to_a_folder() {
    let fixture = shared_fixture();
    // einstein searches his own space, scoped to the grant folder by id
    let einstein = UserContext::new(UserId::new("einstein"), Token::new("token:einstein"));
    let service = service(fixture.gateway, fixture.index);

    let request = SearchRequest::new(format!("shared scope:{}", fixture.grant_root));
    let response = service.search(&einstein, &request).unwrap();

    let paths: Vec<&str> = response
        .matches
        .iter()
        .map(|m| m.entity.reference.path.as_str())
        .collect();
    assert_eq!(paths, vec!["./grant/path/to/Shared.pdf"]);
}
