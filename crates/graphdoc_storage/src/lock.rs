//! Per-collection exclusive locks.
//!
//! Each collection name maps to one async mutex. Guards are owned so they can
//! move into a blocking task and stay held until the file work is finished,
//! even if the caller that requested the lock is cancelled meanwhile.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// An owned exclusive lock on one collection.
pub type CollectionGuard = OwnedMutexGuard<()>;

/// Lazily created exclusive locks, one per collection.
#[derive(Debug, Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, collection: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(collection.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Acquires the lock for one collection.
    pub async fn acquire(&self, collection: &str) -> CollectionGuard {
        self.handle(collection).lock_owned().await
    }

    /// Acquires the locks for several collections.
    ///
    /// Locks are taken in lexicographic order of collection name, whatever
    /// order the names are passed in, so two callers locking overlapping sets
    /// cannot deadlock. Duplicate names are locked once.
    pub async fn acquire_many(&self, collections: &[&str]) -> Vec<CollectionGuard> {
        let mut names: Vec<&str> = collections.to_vec();
        names.sort_unstable();
        names.dedup();

        let mut guards = Vec::with_capacity(names.len());
        for name in names {
            guards.push(self.acquire(name).await);
        }
        guards
    }

    /// Returns how many collections have a lock allocated.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no lock has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_collection_is_exclusive() {
        let locks = CollectionLocks::new();
        let guard = locks.acquire("node").await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire("node")).await;
        assert!(second.is_err());

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire("node")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_collections_are_independent() {
        let locks = CollectionLocks::new();
        let _node = locks.acquire("node").await;
        let edge = tokio::time::timeout(Duration::from_millis(50), locks.acquire("edge")).await;
        assert!(edge.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn acquire_many_dedups() {
        let locks = CollectionLocks::new();
        let guards = locks.acquire_many(&["node", "edge", "node"]).await;
        assert_eq!(guards.len(), 2);
    }

    #[tokio::test]
    async fn opposite_orders_do_not_deadlock() {
        let locks = Arc::new(CollectionLocks::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let locks = Arc::clone(&locks);
            tasks.push(tokio::spawn(async move {
                let order: [&str; 2] = if i % 2 == 0 {
                    ["node", "edge"]
                } else {
                    ["edge", "node"]
                };
                let _guards = locks.acquire_many(&order).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = async {
            for task in tasks {
                task.await.unwrap();
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(5), all).await.is_ok());
    }
}
