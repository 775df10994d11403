//! Test fixtures and store helpers.
//!
//! Provides convenience functions for opening stores against throwaway
//! storage and for populating common scenarios.

use graphdoc_storage::{
    Direction, Document, DocumentStore, FileStore, LoopbackServer, MemoryStore, NetworkStore,
    RetryConfig,
};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;

/// Retry attempts used by test network stores.
pub const TEST_RETRY_ATTEMPTS: u32 = 3;

/// Pool size used by test network stores.
pub const TEST_POOL_SIZE: usize = 4;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<dyn DocumentStore>,
    /// The loopback server behind a network store.
    server: Option<LoopbackServer>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            server: None,
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store =
            FileStore::open(&temp_dir.path().join("data"), true).expect("Failed to open file store");

        Self {
            store: Arc::new(store),
            server: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a new network test store backed by a private loopback server.
    pub async fn network() -> Self {
        let server = LoopbackServer::new();
        let store = NetworkStore::new(
            Arc::new(server.clone()),
            TEST_POOL_SIZE,
            fast_retry(TEST_RETRY_ATTEMPTS),
        );
        store
            .initialize()
            .await
            .expect("Failed to initialize network store");

        Self {
            store: Arc::new(store),
            server: Some(server),
            _temp_dir: None,
        }
    }

    /// Creates one store per backend.
    pub async fn all() -> Vec<Self> {
        vec![Self::memory(), Self::file(), Self::network().await]
    }

    /// Returns the backend name.
    pub fn name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Returns the loopback server if this is a network store.
    pub fn server(&self) -> Option<&LoopbackServer> {
        self.server.as_ref()
    }

    /// Returns the storage directory if file-based, None otherwise.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a shareable handle to the store.
    pub fn handle(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }
}

impl std::ops::Deref for TestStore {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

/// A retry policy with millisecond delays, for tests.
pub fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig::new(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
        .with_jitter(false)
}

/// Installs a tracing subscriber honoring `RUST_LOG`, once per process.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Creates a plain node document.
pub fn sample_node(id: &str) -> Document {
    Document::node(id, "Sample", json!({"label": id}))
}

/// Creates a city node with `name`, `population` and `state` in its context.
pub fn city(id: &str, name: &str, population: u64, state: &str) -> Document {
    Document::node(
        id,
        "City",
        json!({"name": name, "population": population, "state": state}),
    )
}

/// Creates a bidirectional road edge.
pub fn road(id: &str, source: &str, target: &str) -> Document {
    Document::edge(id, "Road", source, target, Direction::Both)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use graphdoc_storage::{StorageResult, EDGE_COLLECTION, NODE_COLLECTION};

    /// Cities saved by [`city_graph`]: `(id, name, population, state)`.
    pub const CITIES: [(&str, &str, u64, &str); 4] = [
        ("chicago", "Chicago", 2_700_000, "IL"),
        ("springfield", "Springfield", 114_000, "IL"),
        ("nyc", "New York", 8_300_000, "NY"),
        ("la", "Los Angeles", 3_800_000, "CA"),
    ];

    /// Saves the [`CITIES`] as nodes plus two roads between them.
    pub async fn city_graph(store: &dyn DocumentStore) -> StorageResult<()> {
        for (id, name, population, state) in CITIES {
            store
                .save(NODE_COLLECTION, city(id, name, population, state))
                .await?;
        }
        store
            .save(EDGE_COLLECTION, road("r1", "chicago", "springfield"))
            .await?;
        store.save(EDGE_COLLECTION, road("r2", "chicago", "nyc")).await?;
        Ok(())
    }

    /// Saves `count` sample nodes with ids `prefix-0 .. prefix-{count-1}`.
    pub async fn populated(
        store: &dyn DocumentStore,
        collection: &str,
        prefix: &str,
        count: usize,
    ) -> StorageResult<Vec<Document>> {
        let mut saved = Vec::with_capacity(count);
        for i in 0..count {
            saved.push(store.save(collection, sample_node(&format!("{prefix}-{i}"))).await?);
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_backends_open() {
        let names: Vec<_> = TestStore::all().await.iter().map(TestStore::name).collect();
        assert_eq!(names, ["memory", "file", "network"]);
    }

    #[tokio::test]
    async fn test_city_graph_scenario() {
        let store = TestStore::memory();
        scenarios::city_graph(&*store).await.unwrap();
        assert!(store.get("node", "chicago").await.unwrap().is_some());
        assert!(store.get("edge", "r2").await.unwrap().is_some());
    }

    #[test]
    fn test_file_store_has_path() {
        let store = TestStore::file();
        assert!(store.path().is_some());
        assert!(TestStore::memory().path().is_none());
    }
}
