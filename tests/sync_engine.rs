//! End-to-end sync cycles against the in-memory store.

use docsync::memory::StoreOp;
use docsync::{
    CheckpointStore, CollectionDescriptor, CollectionOutcome, Document, DocumentRef, FetchMode,
    FieldValue, FileCheckpointStore, MemoryCheckpointStore, MemoryDocumentStore, Payload,
    SyncConfig, SyncEngine,
};
use serde_json::json;
use std::sync::Arc;

fn title(text: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("title".into(), FieldValue::Scalar(json!(text)));
    payload
}

fn config() -> SyncConfig {
    SyncConfig {
        retry_delay_ms: 1,
        ..SyncConfig::default()
    }
}

fn descriptors() -> Vec<CollectionDescriptor> {
    vec![
        CollectionDescriptor::new("posts", "posts_by_ts"),
        CollectionDescriptor::new("users", "users_by_ts"),
    ]
}

fn store() -> MemoryDocumentStore {
    let store = MemoryDocumentStore::new(2);
    store.create_collection("posts", "posts_by_ts");
    store.create_collection("users", "users_by_ts");
    store
}

fn ids(report: &docsync::SyncReport, collection: &str) -> Vec<String> {
    report
        .get_snapshot(collection)
        .expect("snapshot")
        .documents
        .keys()
        .cloned()
        .collect()
}

#[tokio::test]
async fn full_then_delta_with_delete_and_create() {
    let store = store();
    store.put_at("posts", Document::new("A", 1, title("a")));
    store.put_at("posts", Document::new("B", 2, title("b")));
    let checkpoints = MemoryCheckpointStore::new();
    let engine = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(checkpoints.clone()),
        config(),
    );
    let posts = [CollectionDescriptor::new("posts", "posts_by_ts")];

    let first = engine.sync(&posts).await.unwrap();
    assert_eq!(ids(&first, "posts"), vec!["A", "B"]);
    assert_eq!(first.get_snapshot("posts").unwrap().watermark, Some(2));

    store.remove_at("posts", "B", 3);
    store.put_at("posts", Document::new("C", 3, title("c")));

    let second = engine.sync(&posts).await.unwrap();
    assert_eq!(ids(&second, "posts"), vec!["A", "C"]);
    assert_eq!(second.get_snapshot("posts").unwrap().watermark, Some(3));

    let stored = checkpoints.load("posts").await.unwrap().unwrap();
    assert_eq!(stored.watermark, Some(3));
    assert_eq!(
        stored.snapshot.keys().cloned().collect::<Vec<_>>(),
        vec!["A", "C"]
    );
}

#[tokio::test]
async fn failing_collection_does_not_block_others() {
    let store = store();
    store.put_at("posts", Document::new("P", 1, title("p")));
    store.put_at("users", Document::new("U", 1, title("u")));
    let checkpoints = MemoryCheckpointStore::new();
    let engine = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(checkpoints.clone()),
        config(),
    );

    // Establish checkpoints for both.
    engine.sync(&descriptors()).await.unwrap();
    let users_before = checkpoints.load("users").await.unwrap();

    store.put_at("posts", Document::new("P2", 5, title("p2")));
    store.put_at("users", Document::new("U2", 5, title("u2")));
    store.fail_always("users");
    store.clear_operations();

    let report = engine.sync(&descriptors()).await.unwrap();

    assert_eq!(ids(&report, "posts"), vec!["P", "P2"]);
    assert!(report.get_snapshot("users").is_none());
    assert_eq!(report.failures().len(), 1);
    match report.outcome("users") {
        Some(CollectionOutcome::Failed { stale, .. }) => {
            let stale = stale.as_ref().expect("stale snapshot");
            assert_eq!(stale.watermark, Some(1));
            assert!(stale.documents.contains_key("U"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Users checkpoint untouched, posts advanced.
    assert_eq!(checkpoints.load("users").await.unwrap(), users_before);
    assert_eq!(
        checkpoints.load("posts").await.unwrap().unwrap().watermark,
        Some(5)
    );

    // Only the failing collection was retried.
    let posts_feed_requests = store
        .operations()
        .iter()
        .filter(|op| matches!(op, StoreOp::ChangeFeedPage { collection, .. } if collection == "posts"))
        .count();
    assert_eq!(posts_feed_requests, 1);
}

#[tokio::test]
async fn unchanged_cycle_makes_no_resolves_and_no_writes() {
    let store = store();
    for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        store.put_at("posts", Document::new(*id, i as i64 + 1, title(id)));
    }
    let checkpoints = MemoryCheckpointStore::new();
    let engine = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(checkpoints.clone()),
        config(),
    );
    let posts = [CollectionDescriptor::new("posts", "posts_by_ts")];

    let first = engine.sync(&posts).await.unwrap();
    store.clear_operations();
    let second = engine.sync(&posts).await.unwrap();

    assert_eq!(first.get_snapshot("posts"), second.get_snapshot("posts"));
    assert_eq!(checkpoints.writes().len(), 1);
    let ops = store.operations();
    assert!(!ops.iter().any(|op| matches!(op, StoreOp::Resolve { .. })));
    assert!(!ops.iter().any(|op| matches!(op, StoreOp::DocumentsPage { .. })));
}

#[tokio::test]
async fn cross_references_reach_the_consumer() {
    let store = store();
    store.put_at("users", Document::new("u1", 1, title("ada")));
    let mut post = title("hello");
    post.insert(
        "author".into(),
        FieldValue::Reference(DocumentRef::new("users", "u1")),
    );
    store.put_at("posts", Document::new("p1", 2, post));

    let engine = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(MemoryCheckpointStore::new()),
        config(),
    );
    let report = engine.sync(&descriptors()).await.unwrap();

    let posts = report.get_snapshot("posts").unwrap();
    let users = report.get_snapshot("users").unwrap();
    let reference = &posts.documents["p1"].cross_references[0];
    assert_eq!(reference.field, "author");
    assert_eq!(reference.target_node_id, users.documents["u1"].node_id);
}

#[tokio::test]
async fn file_checkpoints_survive_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    store.put_at("posts", Document::new("A", 1, title("a")));
    let posts = [CollectionDescriptor::new("posts", "posts_by_ts")];

    let first = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(),
    );
    first.sync(&posts).await.unwrap();
    drop(first);

    store.put_at("posts", Document::new("B", 2, title("b")));
    let restarted = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(),
    );
    let report = restarted.sync(&posts).await.unwrap();

    assert!(matches!(
        report.outcome("posts"),
        Some(CollectionOutcome::Synced {
            mode: FetchMode::Delta,
            checkpoint_written: true,
            ..
        })
    ));
    assert_eq!(ids(&report, "posts"), vec!["A", "B"]);
}

#[tokio::test]
async fn corrupt_file_checkpoint_is_refetched_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = FileCheckpointStore::new(dir.path());
    std::fs::write(checkpoints.path_for("posts"), "][").unwrap();

    let store = store();
    store.put_at("posts", Document::new("A", 1, title("a")));
    let engine = SyncEngine::new(Arc::new(store.clone()), Arc::new(checkpoints.clone()), config());

    let report = engine
        .sync(&[CollectionDescriptor::new("posts", "posts_by_ts")])
        .await
        .unwrap();
    assert!(matches!(
        report.outcome("posts"),
        Some(CollectionOutcome::Synced {
            mode: FetchMode::Full,
            ..
        })
    ));
    assert_eq!(
        checkpoints.load("posts").await.unwrap().unwrap().watermark,
        Some(1)
    );
}
