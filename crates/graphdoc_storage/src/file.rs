//! File-based document store.

use crate::dir::{Container, StorageDir};
use crate::document::{validate_collection, validate_id, Document, EDGE_COLLECTION, NODE_COLLECTION};
use crate::error::{StorageError, StorageResult};
use crate::lock::{CollectionGuard, CollectionLocks};
use crate::query::Filter;
use crate::store::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A document store keeping each collection in one JSON file.
///
/// Every mutation runs the same sequence under the collection's exclusive
/// lock: read the container, apply the change in memory, write a temporary
/// file, rename it over the container. A crash at any point leaves either the
/// old or the new container, never a partial one.
///
/// # Concurrency
///
/// Reads take the same exclusive lock as writes, so all access to one
/// collection is serialized. That is the backend's throughput ceiling; it is
/// not a correctness issue. Different collections proceed independently.
///
/// File I/O runs on tokio's blocking pool. The lock guard travels with the
/// blocking task, so a caller that gives up waiting does not release the lock
/// before the rename has either happened or been skipped.
///
/// # Example
///
/// ```no_run
/// use graphdoc_storage::{DocumentStore, FileStore, Document, Filter};
/// use serde_json::json;
/// use std::path::Path;
///
/// # async fn demo() -> graphdoc_storage::StorageResult<()> {
/// let store = FileStore::open(Path::new("data"), true)?;
/// let city = Document::node("n1", "City", json!({"name": "Chicago"}));
/// store.save("node", city).await?;
/// let found = store.find("node", &Filter::compile(&json!({"name": "City"}))?).await?;
/// assert_eq!(found.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: Arc<StorageDir>,
    locks: CollectionLocks,
}

impl FileStore {
    /// Opens a file store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing and `auto_create` is
    /// false, cannot be created, or is locked by another store.
    pub fn open(path: &Path, auto_create: bool) -> StorageResult<Self> {
        let dir = StorageDir::open(path, auto_create)?;
        info!(path = %path.display(), "opened file store");
        Ok(Self {
            dir: Arc::new(dir),
            locks: CollectionLocks::new(),
        })
    }

    /// Returns the storage root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Lists the collections persisted under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn collections(&self) -> StorageResult<Vec<String>> {
        let dir = Arc::clone(&self.dir);
        run_blocking(move || dir.collections()).await
    }

    /// Runs `op` against the directory while holding one collection's lock.
    async fn with_collection<T, F>(&self, collection: &str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&StorageDir) -> StorageResult<T> + Send + 'static,
    {
        let guard = self.locks.acquire(collection).await;
        self.locked(vec![guard], op).await
    }

    async fn locked<T, F>(&self, guards: Vec<CollectionGuard>, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&StorageDir) -> StorageResult<T> + Send + 'static,
    {
        let dir = Arc::clone(&self.dir);
        run_blocking(move || {
            // Locals drop in reverse order: the directory is released
            // before the collection locks.
            let _guards = guards;
            let dir = dir;
            op(&dir)
        })
        .await
    }
}

/// Runs blocking storage work on tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(op: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
}

#[async_trait]
impl DocumentStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn save(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        validate_collection(collection)?;
        let id = document.ensure_id()?;

        let name = collection.to_string();
        self.with_collection(collection, move |dir| {
            let mut container = dir.read_container(&name)?;
            container.insert(id.clone(), document.clone().into_value());
            dir.write_container(&name, &container)?;
            debug!(collection = %name, %id, "saved document");
            Ok(document)
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;

        let (name, id) = (collection.to_string(), id.to_string());
        self.with_collection(collection, move |dir| {
            let mut container = dir.read_container(&name)?;
            container
                .shift_remove(&id)
                .map(|value| Document::from_stored(&name, &id, value))
                .transpose()
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        validate_collection(collection)?;
        validate_id(id)?;

        let (name, id) = (collection.to_string(), id.to_string());
        self.with_collection(collection, move |dir| {
            let mut container = dir.read_container(&name)?;
            if container.shift_remove(&id).is_some() {
                dir.write_container(&name, &container)?;
                debug!(collection = %name, %id, "deleted document");
            }
            Ok(())
        })
        .await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        validate_collection(collection)?;

        let name = collection.to_string();
        let filter = filter.clone();
        self.with_collection(collection, move |dir| {
            let container = dir.read_container(&name)?;
            let mut found = Vec::new();
            for (id, value) in container {
                let doc = Document::from_stored(&name, &id, value)?;
                if filter.matches(&doc) {
                    found.push(doc);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn cleanup_orphans(&self) -> StorageResult<usize> {
        // Both locks are held for the whole sweep, so a node saved
        // concurrently is either visible here or written after we finish.
        let guards = self
            .locks
            .acquire_many(&[NODE_COLLECTION, EDGE_COLLECTION])
            .await;

        self.locked(guards, |dir| {
            let nodes = dir.read_container(NODE_COLLECTION)?;
            let edges = dir.read_container(EDGE_COLLECTION)?;
            let sweep = sweep_orphans(&nodes, edges);

            if sweep.skipped > 0 {
                warn!(skipped = sweep.skipped, "skipped malformed edges during orphan cleanup");
            }
            if sweep.removed > 0 {
                dir.write_container(EDGE_COLLECTION, &sweep.kept)?;
                info!(removed = sweep.removed, "removed orphaned edges");
            }
            Ok(sweep.removed)
        })
        .await
    }
}

pub(crate) struct OrphanSweep {
    pub(crate) kept: Container,
    pub(crate) removed: usize,
    pub(crate) skipped: usize,
}

/// Partitions an edge container into edges to keep and orphans to drop.
///
/// Edges without a string `source` and `target` are kept and counted as
/// skipped.
pub(crate) fn sweep_orphans(nodes: &Container, edges: Container) -> OrphanSweep {
    let mut sweep = OrphanSweep {
        kept: Container::new(),
        removed: 0,
        skipped: 0,
    };

    for (id, edge) in edges {
        let endpoints = edge
            .get("source")
            .and_then(Value::as_str)
            .zip(edge.get("target").and_then(Value::as_str));

        match endpoints {
            Some((source, target)) if !nodes.contains_key(source) || !nodes.contains_key(target) => {
                debug!(edge = %id, source, target, "dropping orphaned edge");
                sweep.removed += 1;
            }
            Some(_) => {
                sweep.kept.insert(id, edge);
            }
            None => {
                sweep.skipped += 1;
                sweep.kept.insert(id, edge);
            }
        }
    }
    sweep
}
