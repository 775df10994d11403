//! File backend: durability, locking and on-disk layout.

use graphdoc_storage::{
    Document, DocumentStore, FileStore, Filter, StorageError, EDGE_COLLECTION, NODE_COLLECTION,
};
use graphdoc_testkit::prelude::*;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn documents_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = FileStore::open(temp.path(), true).unwrap();
        scenarios::city_graph(&store).await.unwrap();
    }

    let store = FileStore::open(temp.path(), false).unwrap();
    let nodes = store.find(NODE_COLLECTION, &Filter::all()).await.unwrap();
    assert_eq!(nodes.len(), scenarios::CITIES.len());
    assert_eq!(
        store.collections().await.unwrap(),
        [EDGE_COLLECTION, NODE_COLLECTION]
    );
}

#[tokio::test]
async fn one_json_object_per_collection() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path(), true).unwrap();
    store.save(NODE_COLLECTION, sample_node("a")).await.unwrap();
    store.save(NODE_COLLECTION, sample_node("b")).await.unwrap();

    let raw = fs::read(temp.path().join("node.json")).unwrap();
    let container: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    let keys: Vec<&String> = container.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["a", "b"]);
    assert!(!temp.path().join("node.json.tmp").exists());
}

#[test]
fn second_store_on_same_directory_is_locked_out() {
    let temp = TempDir::new().unwrap();
    let _first = FileStore::open(temp.path(), true).unwrap();

    let err = FileStore::open(temp.path(), true).unwrap_err();
    assert!(matches!(err, StorageError::Locked { .. }), "{err}");
}

#[test]
fn lock_is_released_on_drop() {
    let temp = TempDir::new().unwrap();
    drop(FileStore::open(temp.path(), true).unwrap());
    assert!(FileStore::open(temp.path(), true).is_ok());
}

#[test]
fn missing_directory_without_auto_create() {
    let temp = TempDir::new().unwrap();
    let err = FileStore::open(&temp.path().join("absent"), false).unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)), "{err}");
    assert!(!temp.path().join("absent").exists());
}

#[tokio::test]
async fn corrupted_container_is_reported_not_overwritten() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path(), true).unwrap();
    fs::write(temp.path().join("node.json"), b"{ not json").unwrap();

    let err = store.get(NODE_COLLECTION, "a").await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupted(_)), "{err}");

    let err = store
        .save(NODE_COLLECTION, Document::with_id("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Corrupted(_)), "{err}");
    assert_eq!(fs::read(temp.path().join("node.json")).unwrap(), b"{ not json");
}

#[tokio::test]
async fn collections_are_independent_files() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::open(temp.path(), true).unwrap();
    store.save("walker", sample_node("w")).await.unwrap();
    store.save("object", sample_node("o")).await.unwrap();

    store.delete("walker", "w").await.unwrap();
    assert!(store.get("object", "o").await.unwrap().is_some());
    assert_eq!(store.collections().await.unwrap(), ["object", "walker"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_saves_leave_a_valid_container() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(temp.path(), true).unwrap());
    let original = city("n1", "Chicago", 2_700_000, "IL");
    store.save(NODE_COLLECTION, original.clone()).await.unwrap();

    // Saves queued on the node lock, abandoned wherever they happen to be.
    let queued: Vec<Document> = (0..16)
        .map(|i| city("n1", &format!("Chicago {i}"), i, "IL"))
        .collect();
    let handles: Vec<_> = queued
        .iter()
        .cloned()
        .map(|doc| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(NODE_COLLECTION, doc).await })
        })
        .collect();
    tokio::task::yield_now().await;
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    // Dropped after its first poll, once the write may already be under way.
    let late = city("n1", "Late", 1, "IL");
    let _ = tokio::time::timeout(Duration::ZERO, store.save(NODE_COLLECTION, late.clone())).await;

    let current = store.get(NODE_COLLECTION, "n1").await.unwrap().unwrap();
    assert!(
        current == original || current == late || queued.contains(&current),
        "unexpected document {current:?}"
    );

    let raw = fs::read(temp.path().join("node.json")).unwrap();
    let container: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(container.as_object().unwrap().len(), 1);
    assert!(!temp.path().join("node.json.tmp").exists());

    drop(store);
    let reopened = FileStore::open(temp.path(), false).unwrap();
    assert_eq!(
        reopened.get(NODE_COLLECTION, "n1").await.unwrap(),
        Some(current)
    );
}
