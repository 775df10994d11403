//! Document store backed by an external document database.

use super::{BoxFuture, ConnectionPool, Connector, RemoteConnection, RemoteError, RemoteResult};
use crate::config::RetryConfig;
use crate::document::{
    validate_collection, validate_id, Document, EDGE_COLLECTION, ID_FIELD, NODE_COLLECTION,
    WELL_KNOWN_COLLECTIONS,
};
use crate::error::{StorageError, StorageResult};
use crate::query::Filter;
use crate::store::DocumentStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A document store talking to an external document database through a
/// bounded connection pool.
///
/// # Versioning
///
/// Every stored document carries a `_version` starting at 1. A save is a
/// compare-and-swap:
///
/// - a document without `_version` is inserted and must not exist yet
/// - a document with `_version` replaces the stored one only if the stored
///   version is the same; the new stored version is one higher
///
/// Anything else fails with [`StorageError::VersionConflict`]. Re-read, apply
/// the change again and save the result; [`crate::modify_with_retry`] does
/// exactly that.
///
/// # Retries
///
/// Transient remote failures are retried with exponential backoff up to
/// [`RetryConfig::max_attempts`] attempts. The connection that failed is
/// discarded. Once attempts run out the error surfaces as
/// [`StorageError::Unavailable`].
///
/// # Queries
///
/// Filter entries whose comparators the remote supports are pushed down;
/// the rest are applied to the returned documents with the local matcher.
#[derive(Debug)]
pub struct NetworkStore {
    pool: ConnectionPool,
    retry: RetryConfig,
    indexed: Mutex<HashSet<String>>,
}

impl NetworkStore {
    /// Creates a store over `connector` with at most `pool_size` connections.
    pub fn new(connector: Arc<dyn Connector>, pool_size: usize, retry: RetryConfig) -> Self {
        Self {
            pool: ConnectionPool::new(connector, pool_size),
            retry,
            indexed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Returns the retry policy.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs `op` on a pooled connection, retrying transient failures.
    async fn run<T, F>(&self, name: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: for<'c> Fn(&'c mut Box<dyn RemoteConnection>) -> BoxFuture<'c, RemoteResult<T>>
            + Send
            + Sync,
    {
        self.run_counted(name, op).await.map(|(value, _)| value)
    }

    /// Like [`Self::run`], also returning how many attempts it took.
    async fn run_counted<T, F>(&self, name: &'static str, op: F) -> StorageResult<(T, u32)>
    where
        T: Send + 'static,
        F: for<'c> Fn(&'c mut Box<dyn RemoteConnection>) -> BoxFuture<'c, RemoteResult<T>>
            + Send
            + Sync,
    {
        let mut attempt = 0;
        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            let result = match self.pool.acquire().await {
                Ok(mut lease) => {
                    let result = op(lease.connection()).await;
                    if result.is_ok() {
                        self.pool.release(lease);
                    }
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok((value, attempt)),
                Err(RemoteError::Transient(message)) if attempt < self.retry.max_attempts => {
                    warn!(
                        op = name,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %message,
                        "transient remote failure, retrying"
                    );
                }
                Err(RemoteError::Transient(message)) => {
                    return Err(StorageError::Unavailable(format!(
                        "{name} failed after {attempt} attempts: {message}"
                    )));
                }
                Err(RemoteError::Fatal(message)) => {
                    return Err(StorageError::Unavailable(format!("{name} failed: {message}")));
                }
            }
        }
    }

    async fn ensure_index(&self, collection: &str) -> StorageResult<()> {
        if self.indexed.lock().contains(collection) {
            return Ok(());
        }
        self.run("ensure_index", |conn| {
            let collection = collection.to_string();
            Box::pin(async move { conn.ensure_index(&collection, ID_FIELD).await })
        })
        .await?;
        self.indexed.lock().insert(collection.to_string());
        debug!(collection, "ensured id index");
        Ok(())
    }

    async fn fetch(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.run("find_one", |conn| {
            let (collection, id) = (collection.to_string(), id.to_string());
            Box::pin(async move { conn.find_one(&collection, &id).await })
        })
        .await
    }

    fn conflict(
        collection: &str,
        id: &str,
        expected: Option<u64>,
        actual: Option<u64>,
    ) -> StorageError {
        StorageError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
            expected,
            actual,
        }
    }
}

#[async_trait]
impl DocumentStore for NetworkStore {
    fn backend_name(&self) -> &'static str {
        "network"
    }

    fn supports_versioning(&self) -> bool {
        true
    }

    async fn initialize(&self) -> StorageResult<()> {
        for collection in WELL_KNOWN_COLLECTIONS {
            self.ensure_index(collection).await?;
        }
        info!(endpoint = %self.pool.endpoint(), "network store ready");
        Ok(())
    }

    async fn save(&self, collection: &str, mut document: Document) -> StorageResult<Document> {
        validate_collection(collection)?;
        let id = document.ensure_id()?;
        self.ensure_index(collection).await?;

        let expected = document.checked_version()?;
        let next = match expected {
            None => 1,
            Some(version) => version.checked_add(1).ok_or_else(|| {
                StorageError::validation(format!(
                    "{collection}/{id} is at the highest representable version"
                ))
            })?,
        };
        document.set_version(next);

        let (applied, attempts) = self
            .run_counted("save", |conn| {
                let (collection, id, document) =
                    (collection.to_string(), id.clone(), document.clone());
                Box::pin(async move {
                    let applied = match expected {
                        None => conn.insert_one(&collection, &document).await?,
                        Some(version) => {
                            conn.replace_one(&collection, &id, version, &document)
                                .await?
                        }
                    };
                    Ok::<_, RemoteError>(applied)
                })
            })
            .await?;

        if !applied {
            let stored = self.fetch(collection, &id).await?;
            // A retried write reports not-applied when an earlier attempt
            // landed and only its reply was lost.
            if attempts > 1 && stored.as_ref() == Some(&document) {
                debug!(collection, %id, version = next, "earlier attempt already saved document");
                return Ok(document);
            }
            let actual = stored.and_then(|d| d.version());
            return Err(Self::conflict(collection, &id, expected, actual));
        }
        debug!(collection, %id, version = next, "saved document");
        Ok(document)
    }

    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;
        self.fetch(collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        validate_collection(collection)?;
        validate_id(id)?;

        let removed = self
            .run("delete_one", |conn| {
                let (collection, id) = (collection.to_string(), id.to_string());
                Box::pin(async move { conn.delete_one(&collection, &id).await })
            })
            .await?;
        if removed {
            debug!(collection, id, "deleted document");
        }
        Ok(())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        validate_collection(collection)?;

        self.run("find", |conn| {
            let collection = collection.to_string();
            let filter = filter.clone();
            Box::pin(async move {
                let (native, residual) = filter.split(|c| conn.supports(c));
                let docs = conn.find(&collection, &native).await?;
                let matched: Vec<Document> =
                    docs.into_iter().filter(|d| residual.matches(d)).collect();
                Ok::<_, RemoteError>(matched)
            })
        })
        .await
    }

    async fn cleanup_orphans(&self) -> StorageResult<usize> {
        let edges = self.find(EDGE_COLLECTION, &Filter::all()).await?;
        let mut removed = 0;
        let mut skipped = 0;

        for edge in edges {
            let (Some(id), Some(source), Some(target)) = (edge.id(), edge.source(), edge.target())
            else {
                skipped += 1;
                continue;
            };

            // Endpoints are checked right before the delete so a node
            // saved since the scan keeps its edge.
            let intact = self.fetch(NODE_COLLECTION, source).await?.is_some()
                && self.fetch(NODE_COLLECTION, target).await?.is_some();
            if intact {
                continue;
            }

            debug!(edge = %id, source, target, "dropping orphaned edge");
            self.delete(EDGE_COLLECTION, id).await?;
            removed += 1;
        }

        if skipped > 0 {
            warn!(skipped, "skipped malformed edges during orphan cleanup");
        }
        if removed > 0 {
            info!(removed, "removed orphaned edges");
        }
        Ok(removed)
    }
}
