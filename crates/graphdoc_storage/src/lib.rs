//! # GraphDoc Storage
//!
//! Asynchronous, pluggable document persistence for GraphDoc.
//!
//! Graph elements (nodes, edges, walkers) and plain objects are stored as
//! JSON documents in named collections. Every backend implements the same
//! [`DocumentStore`] contract, so the graph layer never knows which medium
//! it is talking to.
//!
//! ## Design Principles
//!
//! - Documents are opaque JSON objects with a string `id`
//! - Collection and id names are validated before any medium is touched
//! - One filter language ([`Filter`]) is shared by every backend
//! - Stores are `Send + Sync` and used through `Arc<dyn DocumentStore>`
//!
//! ## Available Backends
//!
//! - [`FileStore`] - one JSON file per collection, atomic replace on write
//! - [`MemoryStore`] - for tests and ephemeral storage
//! - [`NetworkStore`] - external document database with pooling, retries and
//!   optimistic versioning
//!
//! Backends are created by name through the [`registry`].
//!
//! ## Example
//!
//! ```rust
//! use graphdoc_storage::{registry, Direction, Document, Filter, StoreConfig};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> graphdoc_storage::StorageResult<()> {
//! let store = registry::resolve("memory", StoreConfig::new()).await?;
//!
//! store.save("node", Document::node("a", "City", json!({"name": "Chicago"}))).await?;
//! store.save("edge", Document::edge("e1", "road", "a", "b", Direction::Both)).await?;
//!
//! let cities = store.find("node", &Filter::compile(&json!({"name": "City"}))?).await?;
//! assert_eq!(cities.len(), 1);
//!
//! // Node "b" was never saved
//! assert_eq!(store.cleanup_orphans().await?, 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod dir;
mod document;
mod error;
mod file;
mod lock;
mod memory;
mod query;
pub mod registry;
pub mod remote;
mod store;

pub use config::{
    RetryConfig, StoreConfig, DEFAULT_POOL_SIZE, DEFAULT_RETRY_ATTEMPTS, ENV_AUTO_CREATE,
    ENV_BACKEND, ENV_LOCATION, ENV_POOL_SIZE, ENV_RETRY_ATTEMPTS,
};
pub use document::{
    new_id, validate_collection, validate_id, Direction, Document, CONTEXT_FIELD, DATA_FIELD,
    DIRECTION_FIELD, EDGE_COLLECTION, ID_FIELD, NAME_FIELD, NODE_COLLECTION, OBJECT_COLLECTION,
    SOURCE_FIELD, TARGET_FIELD, VERSION_FIELD, WALKER_COLLECTION, WELL_KNOWN_COLLECTIONS,
};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use query::{resolve_path, Comparator, Filter, FilterEntry, Predicate};
pub use registry::BackendRegistry;
pub use remote::{Connector, LoopbackServer, NetworkStore, RemoteConnection, RemoteError};
pub use store::{modify_with_retry, DocumentStore};
