//! Change events flowing from the queue into the index.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use spacesearch::events::EventQueue;
use spacesearch::gateway::child_info;
use spacesearch::models::{
    ChangeEvent, EventMeta, Reference, ResourceId, ResourceInfo, ResourceType, SpaceId, SpaceType,
    StorageSpace, UserId,
};
use spacesearch::storage::MemoryBackend;
use spacesearch::{BasicExtractor, ChangeDispatcher, InMemoryGateway, IndexBackend, Indexer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const API_KEY: &str = "machine-secret";

fn alice() -> UserId {
    UserId::new("alice")
}

fn space_id() -> SpaceId {
    SpaceId::new("st", "sp")
}

fn id(opaque: &str) -> ResourceId {
    ResourceId::new("st", "sp", opaque)
}

fn file(parent: &ResourceId, opaque: &str, name: &str, resource_type: ResourceType) -> ResourceInfo {
    ResourceInfo {
        mtime: Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()),
        ..child_info(parent, opaque, name, resource_type)
    }
}

struct Harness {
    gateway: Arc<InMemoryGateway>,
    index: Arc<MemoryBackend>,
    queue: EventQueue,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

/// A space with `./docs/a.txt` and `./b.txt`, indexed, with a dispatcher attached.
fn harness() -> Harness {
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
            ..ResourceInfo::default()
        },
        &[],
    );
    gateway
        .put(file(&root, "docs", "docs", ResourceType::Container))
        .unwrap();
    gateway
        .put(file(&id("docs"), "a", "a.txt", ResourceType::File))
        .unwrap();
    gateway
        .put(file(&root, "b", "b.txt", ResourceType::File))
        .unwrap();

    let index = Arc::new(MemoryBackend::new().unwrap());
    let indexer = Arc::new(Indexer::new(
        gateway.clone(),
        index.clone(),
        Arc::new(BasicExtractor::new()),
        SecretString::from(API_KEY),
    ));
    indexer.index_space(&space_id(), &alice()).unwrap();

    let dispatcher = Arc::new(
        ChangeDispatcher::with_reindex(indexer, Duration::from_millis(50), Duration::ZERO)
            .unwrap(),
    );
    let queue = EventQueue::new(16);
    let workers = dispatcher.start(&queue, 2);

    Harness {
        gateway,
        index,
        queue,
        workers,
    }
}

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn deleted(index: &MemoryBackend, opaque: &str) -> Option<bool> {
    index.get(&id(opaque)).unwrap().map(|r| r.deleted)
}

fn at(path: &str) -> Reference {
    Reference::new(space_id().root(), path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trash_and_restore_reach_the_index() {
    let h = harness();

    h.gateway.remove(&id("docs"));
    h.queue
        .publish(ChangeEvent::ItemTrashed {
            meta: EventMeta::new(),
            id: id("docs"),
            reference: at("./docs"),
            executant: alice(),
        })
        .unwrap();
    assert!(eventually(|| deleted(&h.index, "a") == Some(true)).await);
    assert_eq!(deleted(&h.index, "docs"), Some(true));
    assert_eq!(deleted(&h.index, "b"), Some(false));

    h.gateway
        .put(file(&space_id().root(), "docs", "docs", ResourceType::Container))
        .unwrap();
    h.gateway
        .put(file(&id("docs"), "a", "a.txt", ResourceType::File))
        .unwrap();
    h.queue
        .publish(ChangeEvent::ItemRestored {
            meta: EventMeta::new(),
            reference: at("./docs"),
            executant: alice(),
        })
        .unwrap();
    assert!(eventually(|| deleted(&h.index, "a") == Some(false)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn moves_reach_the_index() {
    let h = harness();

    h.gateway
        .rename(&id("docs"), &space_id().root(), "archive")
        .unwrap();
    h.queue
        .publish(ChangeEvent::ItemMoved {
            meta: EventMeta::new(),
            reference: at("./archive"),
            executant: alice(),
        })
        .unwrap();

    assert!(
        eventually(|| {
            h.index
                .get(&id("a"))
                .unwrap()
                .is_some_and(|r| r.path == "./archive/a.txt")
        })
        .await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uploads_trigger_a_space_reindex() {
    let h = harness();

    h.gateway
        .put(file(&space_id().root(), "c", "c.txt", ResourceType::File))
        .unwrap();
    h.queue
        .publish(ChangeEvent::FileUploaded {
            meta: EventMeta::new(),
            reference: at("./c.txt"),
            executant: alice(),
        })
        .unwrap();

    assert!(eventually(|| h.index.get(&id("c")).unwrap().is_some()).await);
    assert_eq!(h.index.get(&id("c")).unwrap().unwrap().path, "./c.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_events_do_not_stop_the_workers() {
    let h = harness();

    h.queue
        .publish(ChangeEvent::ItemTrashed {
            meta: EventMeta::new(),
            id: id("never-indexed"),
            reference: at("./never-indexed"),
            executant: alice(),
        })
        .unwrap();
    h.queue
        .publish(ChangeEvent::ItemMoved {
            meta: EventMeta::new(),
            reference: at("./missing"),
            executant: alice(),
        })
        .unwrap();

    h.gateway.remove(&id("b"));
    h.queue
        .publish(ChangeEvent::ItemTrashed {
            meta: EventMeta::new(),
            id: id("b"),
            reference: at("./b.txt"),
            executant: alice(),
        })
        .unwrap();

    assert!(eventually(|| deleted(&h.index, "b") == Some(true)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workers_stop_when_the_queue_closes() {
    let Harness { queue, workers, .. } = harness();

    drop(queue);
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
