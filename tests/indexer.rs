//! Space walks, the mtime watermark and single-item index updates.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use spacesearch::gateway::child_info;
use spacesearch::models::{
    Document, Image, Reference, Resource, ResourceId, ResourceInfo, ResourceType,
    SearchIndexRequest, SearchIndexResponse, SpaceId, SpaceType, StorageSpace, Token, UserId,
};
use spacesearch::services::IndexStats;
use spacesearch::storage::MemoryBackend;
use spacesearch::{
    BasicExtractor, Error, Extractor, InMemoryGateway, IndexBackend, Indexer, Result,
    StorageGateway,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const API_KEY: &str = "machine-secret";

/// Counts upserts before handing them to a memory index.
struct CountingIndex {
    inner: MemoryBackend,
    upserts: AtomicUsize,
}

impl CountingIndex {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new().unwrap(),
            upserts: AtomicUsize::new(0),
        }
    }

    fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl IndexBackend for CountingIndex {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn search(&self, request: &SearchIndexRequest) -> Result<SearchIndexResponse> {
        self.inner.search(request)
    }

    fn upsert(&self, resource: &Resource) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(resource)
    }

    fn move_resource(&self, id: &ResourceId, parent_id: &ResourceId, new_path: &str) -> Result<()> {
        self.inner.move_resource(id, parent_id, new_path)
    }

    fn delete(&self, id: &ResourceId) -> Result<()> {
        self.inner.delete(id)
    }

    fn restore(&self, id: &ResourceId) -> Result<()> {
        self.inner.restore(id)
    }

    fn purge(&self, id: &ResourceId) -> Result<bool> {
        self.inner.purge(id)
    }

    fn get(&self, id: &ResourceId) -> Result<Option<Resource>> {
        self.inner.get(id)
    }

    fn doc_count(&self) -> Result<u64> {
        self.inner.doc_count()
    }
}

/// Extractor that always fails.
struct BrokenExtractor;

impl Extractor for BrokenExtractor {
    fn extract(&self, _token: &Token, _info: &ResourceInfo) -> Result<Document> {
        Err(Error::operation("extract", "corrupt file"))
    }
}

/// Extractor that reports every file as a 640px wide image.
struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn extract(&self, token: &Token, info: &ResourceInfo) -> Result<Document> {
        let mut document = BasicExtractor::new().extract(token, info)?;
        if info.resource_type == ResourceType::File {
            let mut image = Image::default();
            image.set("width", "640")?;
            document.image = Some(image);
        }
        Ok(document)
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap()
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn space_id() -> SpaceId {
    SpaceId::new("st", "sp")
}

fn id(opaque: &str) -> ResourceId {
    ResourceId::new("st", "sp", opaque)
}

fn with_mtime(info: ResourceInfo, mtime: DateTime<Utc>) -> ResourceInfo {
    ResourceInfo {
        mtime: Some(mtime),
        size: 10,
        ..info
    }
}

/// `./docs`, `./docs/a.txt` and `./b.txt` below a root with `root_mtime`.
fn gateway(root_mtime: Option<DateTime<Utc>>) -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new(API_KEY));
    let root = space_id().root();
    gateway.add_space(
        StorageSpace {
            id: space_id().to_string(),
            space_type: SpaceType::Personal,
            owner: alice(),
            root: root.clone(),
            root_info: None,
            opaque: BTreeMap::new(),
        },
        ResourceInfo {
            id: root.clone(),
            resource_type: ResourceType::Container,
            mtime: root_mtime,
            ..ResourceInfo::default()
        },
        &[],
    );

    gateway
        .put(with_mtime(
            child_info(&root, "docs", "docs", ResourceType::Container),
            at(1),
        ))
        .unwrap();
    gateway
        .put(with_mtime(
            child_info(&id("docs"), "a", "a.txt", ResourceType::File),
            at(1),
        ))
        .unwrap();
    gateway
        .put(with_mtime(
            child_info(&root, "b", "b.txt", ResourceType::File),
            at(1),
        ))
        .unwrap();
    gateway
}

fn indexer(
    gateway: &Arc<InMemoryGateway>,
    index: Arc<dyn IndexBackend>,
    extractor: Arc<dyn Extractor>,
) -> Indexer {
    Indexer::new(
        Arc::clone(gateway) as Arc<dyn StorageGateway>,
        index,
        extractor,
        SecretString::from(API_KEY),
    )
}

fn path_of(index: &dyn IndexBackend, opaque: &str) -> String {
    index.get(&id(opaque)).unwrap().unwrap().path
}

#[test]
fn first_walk_indexes_everything() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(CountingIndex::new());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));

    let stats = indexer.index_space(&space_id(), &alice()).unwrap();

    assert_eq!(
        stats,
        IndexStats {
            visited: 4,
            upserted: 4,
            skipped: 0
        }
    );
    assert_eq!(index.doc_count().unwrap(), 4);
    assert_eq!(path_of(index.as_ref(), "a"), "./docs/a.txt");
    assert_eq!(path_of(index.as_ref(), "sp"), ".");
    let a = index.get(&id("a")).unwrap().unwrap();
    assert_eq!(a.root_id, space_id().root());
    assert_eq!(a.parent_id, Some(id("docs")));
}

#[test]
fn unchanged_space_is_not_rewritten() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(CountingIndex::new());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));

    indexer.index_space(&space_id(), &alice()).unwrap();
    let before = index.upserts();
    let stats = indexer.index_space(&space_id(), &alice()).unwrap();

    assert_eq!(index.upserts(), before);
    assert_eq!(stats.upserted, 0);
    // the unchanged root prunes the whole tree
    assert_eq!(stats.visited, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn changed_resources_are_reindexed() {
    let gateway = gateway(None);
    let index = Arc::new(CountingIndex::new());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));
    indexer.index_space(&space_id(), &alice()).unwrap();

    gateway
        .put(with_mtime(
            child_info(&space_id().root(), "docs", "docs", ResourceType::Container),
            at(2),
        ))
        .unwrap();
    gateway
        .put(ResourceInfo {
            arbitrary_metadata: BTreeMap::from([("tags".to_string(), "urgent".to_string())]),
            ..with_mtime(
                child_info(&id("docs"), "a", "a.txt", ResourceType::File),
                at(2),
            )
        })
        .unwrap();

    let stats = indexer.index_space(&space_id(), &alice()).unwrap();

    // root (no mtime), docs and a.txt; b.txt is unchanged
    assert_eq!(stats.upserted, 3);
    assert_eq!(stats.skipped, 1);
    let tagged = index
        .search(&SearchIndexRequest::new("Tags:urgent"))
        .unwrap();
    assert_eq!(tagged.total_matches, 1);
    assert_eq!(tagged.matches[0].entity.id, id("a"));
}

#[test]
fn extraction_failures_fall_back_to_structural_metadata() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BrokenExtractor));

    let stats = indexer.index_space(&space_id(), &alice()).unwrap();

    assert_eq!(stats.upserted, 4);
    let b = index.get(&id("b")).unwrap().unwrap();
    assert_eq!(b.name(), "b.txt");
    assert_eq!(b.document.size, 10);
}

#[test]
fn media_metadata_is_written_back() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = indexer(&gateway, index, Arc::new(ImageExtractor));

    indexer.index_space(&space_id(), &alice()).unwrap();

    let token = gateway.authenticate(&alice(), API_KEY).unwrap();
    let info = gateway
        .stat(&token, &Reference::new(space_id().root(), "./b.txt"))
        .unwrap();
    assert!(
        info.arbitrary_metadata
            .contains_key("libre.graph.image.width")
    );
}

#[test]
fn incomplete_space_id_is_rejected() {
    let gateway = gateway(Some(at(1)));
    let indexer = indexer(
        &gateway,
        Arc::new(MemoryBackend::new().unwrap()),
        Arc::new(BasicExtractor::new()),
    );

    let err = indexer
        .index_space(&SpaceId::new("", "sp"), &alice())
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[test]
fn wrong_machine_key_aborts_the_walk() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = Indexer::new(
        gateway,
        index.clone(),
        Arc::new(BasicExtractor::new()),
        SecretString::from("wrong"),
    );

    let err = indexer.index_space(&space_id(), &alice()).unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(index.doc_count().unwrap(), 0);
}

#[test]
fn move_item_follows_the_gateway() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));
    indexer.index_space(&space_id(), &alice()).unwrap();

    gateway
        .rename(&id("docs"), &space_id().root(), "papers")
        .unwrap();
    indexer
        .move_item(&Reference::new(space_id().root(), "./papers"), &alice())
        .unwrap();

    assert_eq!(path_of(index.as_ref(), "docs"), "./papers");
    assert_eq!(path_of(index.as_ref(), "a"), "./papers/a.txt");
}

#[test]
fn moving_the_space_root_is_rejected() {
    let gateway = gateway(Some(at(1)));
    let indexer = indexer(
        &gateway,
        Arc::new(MemoryBackend::new().unwrap()),
        Arc::new(BasicExtractor::new()),
    );

    let err = indexer
        .move_item(&Reference::to_id(space_id().root()), &alice())
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[test]
fn trash_and_restore_cascade() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));
    indexer.index_space(&space_id(), &alice()).unwrap();

    indexer.trash_item(&id("docs")).unwrap();
    assert!(index.get(&id("a")).unwrap().unwrap().deleted);

    indexer
        .restore_item(&Reference::new(space_id().root(), "./docs"), &alice())
        .unwrap();
    assert!(!index.get(&id("a")).unwrap().unwrap().deleted);
}

#[test]
fn upsert_item_indexes_a_single_resource() {
    let gateway = gateway(Some(at(1)));
    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = indexer(&gateway, index.clone(), Arc::new(BasicExtractor::new()));

    let resource = indexer
        .upsert_item(&Reference::new(space_id().root(), "./docs/a.txt"), &alice())
        .unwrap();

    assert_eq!(resource.path, "./docs/a.txt");
    assert_eq!(index.doc_count().unwrap(), 1);
}

#[test]
fn trashing_an_unknown_item_is_not_found() {
    let gateway = gateway(Some(at(1)));
    let indexer = indexer(
        &gateway,
        Arc::new(MemoryBackend::new().unwrap()),
        Arc::new(BasicExtractor::new()),
    );

    assert!(indexer.trash_item(&id("nope")).unwrap_err().is_not_found());
}
