//! Document store trait definition.

use crate::document::Document;
use crate::error::{StorageError, StorageResult};
use crate::query::Filter;
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::debug;

/// An asynchronous document store.
///
/// Every backend (file, memory, networked) implements this trait with the same
/// semantics, so callers only ever hold an `Arc<dyn DocumentStore>`.
///
/// # Invariants
///
/// - `save` returns the persisted representation, including an assigned id
///   and, on versioned backends, the new `_version`
/// - `get` returns `Ok(None)` for an absent document, never an error
/// - `delete` is idempotent
/// - `find` with [`Filter::all`] returns every document in the collection,
///   in insertion order unless the backend documents something stronger
/// - `cleanup_orphans` removes every edge whose `source` or `target` no
///   longer resolves to a node and returns how many it removed
///
/// # Implementors
///
/// - [`super::FileStore`] - one JSON container per collection
/// - [`super::MemoryStore`] - volatile, for tests and ephemeral use
/// - [`super::NetworkStore`] - external document database with optimistic versions
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the registry name of this backend.
    fn backend_name(&self) -> &'static str;

    /// Returns true if `save` performs optimistic version checks.
    fn supports_versioning(&self) -> bool {
        false
    }

    /// Prepares the store for use.
    ///
    /// The factory awaits this before handing a store out.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the medium cannot be prepared.
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Inserts or fully replaces a document, assigning an id if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The collection name or id is invalid (validation)
    /// - The medium is unavailable (I/O)
    /// - The backend is versioned and the supplied `_version` is stale
    async fn save(&self, collection: &str, document: Document) -> StorageResult<Document>;

    /// Returns the document with the given id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or id is invalid or the medium fails.
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Removes the document with the given id if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or id is invalid or the medium fails.
    /// Deleting an absent id is not an error.
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()>;

    /// Returns every document in the collection matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection name is invalid or the medium fails.
    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>>;

    /// Removes edges whose endpoints no longer exist in the node collection.
    ///
    /// Malformed edges (missing `source` or `target`) are skipped, not removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the medium fails.
    async fn cleanup_orphans(&self) -> StorageResult<usize>;

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`DocumentStore::find`].
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    /// Returns how many documents match `filter`.
    ///
    /// # Errors
    ///
    /// See [`DocumentStore::find`].
    async fn count(&self, collection: &str, filter: &Filter) -> StorageResult<usize> {
        Ok(self.find(collection, filter).await?.len())
    }
}

/// Reads a document, applies `mutate`, and writes it back, retrying on
/// version conflicts.
///
/// Each attempt re-reads the latest stored document and reapplies `mutate`
/// to it, so a concurrent writer's changes are never silently overwritten.
/// On unversioned backends the first attempt always succeeds.
///
/// Returns `Ok(None)` if the document does not exist.
///
/// # Errors
///
/// Returns the last [`StorageError::VersionConflict`] once `max_attempts`
/// attempts have conflicted, or any other error immediately.
pub async fn modify_with_retry<S, F>(
    store: &S,
    collection: &str,
    id: &str,
    max_attempts: u32,
    mut mutate: F,
) -> StorageResult<Option<Document>>
where
    S: DocumentStore + ?Sized,
    F: FnMut(&mut Document) + Send,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(mut doc) = store.get(collection, id).await? else {
            return Ok(None);
        };
        mutate(&mut doc);
        match store.save(collection, doc).await {
            Ok(saved) => return Ok(Some(saved)),
            Err(err @ StorageError::VersionConflict { .. }) if attempt < attempts => {
                debug!(collection, id, attempt, error = %err, "retrying after version conflict");
            }
            Err(err) => return Err(err),
        }
    }
}
