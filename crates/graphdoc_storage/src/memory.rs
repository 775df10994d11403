//! In-memory document store for testing.

use crate::dir::Container;
use crate::document::{validate_collection, validate_id, Document, EDGE_COLLECTION, NODE_COLLECTION};
use crate::error::StorageResult;
use crate::file::sweep_orphans;
use crate::query::Filter;
use crate::store::DocumentStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

/// An in-memory document store.
///
/// This store keeps every collection in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// It has the same semantics as [`super::FileStore`] minus durability. No
/// lock is held across a suspension point, so every operation is atomic with
/// respect to the others.
///
/// # Example
///
/// ```rust
/// use graphdoc_storage::{DocumentStore, MemoryStore, Document};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.save("node", Document::node("n1", "City", json!({}))).await.unwrap();
/// assert!(store.get("node", "n1").await.unwrap().is_some());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Container>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of collections holding at least one document.
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Removes every document from every collection.
    pub fn clear(&self) {
        self.collections.write().clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        validate_collection(collection)?;
        let id = document.ensure_id()?;

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document.clone().into_value());
        Ok(document)
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;

        let collections = self.collections.read();
        collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .map(|value| Document::from_stored(collection, id, value))
            .transpose()
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        validate_collection(collection)?;
        validate_id(id)?;

        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.shift_remove(id);
        }
        Ok(())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        validate_collection(collection)?;

        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for (id, value) in docs {
            let doc = Document::from_stored(collection, id, value.clone())?;
            if filter.matches(&doc) {
                found.push(doc);
            }
        }
        Ok(found)
    }

    async fn cleanup_orphans(&self) -> StorageResult<usize> {
        let mut collections = self.collections.write();
        let nodes = collections.get(NODE_COLLECTION).cloned().unwrap_or_default();
        let Some(edges) = collections.get_mut(EDGE_COLLECTION) else {
            return Ok(0);
        };

        let sweep = sweep_orphans(&nodes, std::mem::take(edges));
        *edges = sweep.kept;
        if sweep.skipped > 0 {
            warn!(skipped = sweep.skipped, "skipped malformed edges during orphan cleanup");
        }
        Ok(sweep.removed)
    }
}
