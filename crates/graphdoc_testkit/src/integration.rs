//! Store verification harness.
//!
//! Tracks what a store should contain and checks every read against it.
//! Works with any backend; on versioned backends the tracked copy is the
//! document returned by `save`, so later saves carry the right `_version`.

use graphdoc_storage::{Document, DocumentStore, Filter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A test harness for verifying store contents.
pub struct StoreHarness {
    /// The store under test.
    pub store: Arc<dyn DocumentStore>,
    /// Expected documents by `(collection, id)`.
    expected: BTreeMap<(String, String), Document>,
}

impl StoreHarness {
    /// Creates a harness around `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            expected: BTreeMap::new(),
        }
    }

    /// Saves a document and tracks the persisted representation.
    ///
    /// If the document is already tracked, its stored `_version` is carried
    /// over so the save is not rejected as stale.
    pub async fn save(&mut self, collection: &str, mut document: Document) -> Document {
        let id = document.id().map(str::to_string);
        if let Some(previous) = id
            .as_ref()
            .and_then(|id| self.expected.get(&(collection.to_string(), id.clone())))
        {
            if let Some(version) = previous.version() {
                document.set_version(version);
            }
        }

        let saved = self
            .store
            .save(collection, document)
            .await
            .expect("Failed to save document");
        let id = saved.id().expect("Saved document has no id").to_string();
        self.expected
            .insert((collection.to_string(), id), saved.clone());
        saved
    }

    /// Gets a document and verifies it matches the tracked value.
    pub async fn get_and_verify(&self, collection: &str, id: &str) -> Option<Document> {
        let actual = self
            .store
            .get(collection, id)
            .await
            .expect("Failed to get document");
        let expected = self.expected.get(&(collection.to_string(), id.to_string()));
        assert_eq!(
            actual.as_ref(),
            expected,
            "Document mismatch for {}/{} on {}",
            collection,
            id,
            self.store.backend_name()
        );
        actual
    }

    /// Deletes a document and updates tracking.
    pub async fn delete(&mut self, collection: &str, id: &str) {
        self.store
            .delete(collection, id)
            .await
            .expect("Failed to delete document");
        self.expected
            .remove(&(collection.to_string(), id.to_string()));
    }

    /// Verifies every tracked document and the size of each collection.
    pub async fn verify_all(&self) {
        for (collection, id) in self.expected.keys() {
            self.get_and_verify(collection, id).await;
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (collection, _) in self.expected.keys() {
            *counts.entry(collection.as_str()).or_default() += 1;
        }
        for (collection, expected) in counts {
            let actual = self
                .store
                .count(collection, &Filter::all())
                .await
                .expect("Failed to count documents");
            assert_eq!(
                actual,
                expected,
                "Document count mismatch for {} on {}",
                collection,
                self.store.backend_name()
            );
        }
    }

    /// Returns the number of tracked documents.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_node, TestStore};

    #[tokio::test]
    async fn test_harness_tracks_every_backend() {
        for test_store in TestStore::all().await {
            let mut harness = StoreHarness::new(test_store.handle());

            harness.save("node", sample_node("a")).await;
            harness.save("node", sample_node("b")).await;
            harness.save("node", sample_node("a")).await;
            harness.delete("node", "b").await;

            harness.verify_all().await;
            assert_eq!(harness.tracked_count(), 1);
        }
    }
}
