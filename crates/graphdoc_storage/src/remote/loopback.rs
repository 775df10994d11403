//! In-process document database reachable as a remote endpoint.

use super::{Connector, RemoteConnection, RemoteError, RemoteResult};
use crate::dir::Container;
use crate::document::{Document, VERSION_FIELD};
use crate::query::{Comparator, Filter};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

/// An in-process document database.
///
/// Behaves like an external database from the store's point of view: state
/// lives behind connections, single-document writes are atomic and
/// conditional, and only equality and set membership are evaluated natively.
/// Transient failures can be injected to exercise retry paths.
///
/// Clones share the same state. [`LoopbackServer::named`] returns a
/// process-wide instance per name, which is what `loopback://<name>` URIs
/// connect to.
///
/// # Example
///
/// ```rust
/// use graphdoc_storage::{LoopbackServer, NetworkStore, RetryConfig};
/// use std::sync::Arc;
///
/// let server = LoopbackServer::new();
/// let store = NetworkStore::new(Arc::new(server.clone()), 4, RetryConfig::default());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoopbackServer {
    name: Option<String>,
    state: Arc<Mutex<ServerState>>,
}

#[derive(Debug, Default)]
struct ServerState {
    collections: HashMap<String, Container>,
    indexes: BTreeSet<(String, String)>,
    failures_pending: u32,
    connections_opened: usize,
}

impl ServerState {
    /// Consumes one injected failure if any are pending.
    fn check_failure(&mut self) -> RemoteResult<()> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(RemoteError::transient("injected failure"));
        }
        Ok(())
    }
}

fn named_servers() -> &'static Mutex<HashMap<String, LoopbackServer>> {
    static SERVERS: OnceLock<Mutex<HashMap<String, LoopbackServer>>> = OnceLock::new();
    SERVERS.get_or_init(|| Mutex::new(HashMap::new()))
}

impl LoopbackServer {
    /// Creates an empty, anonymous server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide server registered under `name`, creating it
    /// on first use.
    pub fn named(name: &str) -> Self {
        named_servers()
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Self {
                name: Some(name.to_string()),
                state: Arc::default(),
            })
            .clone()
    }

    /// Makes the next `count` operations (connects included) fail with a
    /// transient error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    /// Returns the number of connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().connections_opened
    }

    /// Returns the `(collection, field)` pairs that have an index.
    pub fn indexes(&self) -> Vec<(String, String)> {
        self.state.lock().indexes.iter().cloned().collect()
    }

    /// Returns true if `collection` has an index on `field`.
    pub fn has_index(&self, collection: &str, field: &str) -> bool {
        self.state
            .lock()
            .indexes
            .contains(&(collection.to_string(), field.to_string()))
    }

    /// Returns the number of documents stored in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, Container::len)
    }
}

#[async_trait]
impl Connector for LoopbackServer {
    async fn connect(&self) -> RemoteResult<Box<dyn RemoteConnection>> {
        let mut state = self.state.lock();
        state.check_failure()?;
        state.connections_opened += 1;
        Ok(Box::new(LoopbackConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("loopback://{name}"),
            None => "loopback".to_string(),
        }
    }
}

struct LoopbackConnection {
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackConnection {
    fn with_state<T>(&self, op: impl FnOnce(&mut ServerState) -> T) -> RemoteResult<T> {
        let mut state = self.state.lock();
        state.check_failure()?;
        Ok(op(&mut state))
    }
}

fn stored_version(value: &Value) -> Option<u64> {
    value.get(VERSION_FIELD).and_then(Value::as_u64)
}

#[async_trait]
impl RemoteConnection for LoopbackConnection {
    fn supports(&self, comparator: Comparator) -> bool {
        matches!(comparator, Comparator::Equals | Comparator::InSet)
    }

    async fn ensure_index(&mut self, collection: &str, field: &str) -> RemoteResult<()> {
        self.with_state(|state| {
            state
                .indexes
                .insert((collection.to_string(), field.to_string()));
        })
    }

    async fn find_one(&mut self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        self.with_state(|state| {
            state
                .collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .and_then(|value| Document::from_value(value.clone()).ok())
        })
    }

    async fn insert_one(&mut self, collection: &str, document: &Document) -> RemoteResult<bool> {
        let Some(id) = document.id() else {
            return Err(RemoteError::fatal("insert without an id"));
        };
        self.with_state(|state| {
            let docs = state.collections.entry(collection.to_string()).or_default();
            if docs.contains_key(id) {
                return false;
            }
            docs.insert(id.to_string(), document.clone().into_value());
            true
        })
    }

    async fn replace_one(
        &mut self,
        collection: &str,
        id: &str,
        expected_version: u64,
        document: &Document,
    ) -> RemoteResult<bool> {
        self.with_state(|state| {
            let Some(slot) = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
            else {
                return false;
            };
            if stored_version(slot) != Some(expected_version) {
                return false;
            }
            *slot = document.clone().into_value();
            true
        })
    }

    async fn delete_one(&mut self, collection: &str, id: &str) -> RemoteResult<bool> {
        self.with_state(|state| {
            state
                .collections
                .get_mut(collection)
                .is_some_and(|docs| docs.shift_remove(id).is_some())
        })
    }

    async fn find(&mut self, collection: &str, filter: &Filter) -> RemoteResult<Vec<Document>> {
        self.with_state(|state| {
            state
                .collections
                .get(collection)
                .map(|docs| {
                    docs.values()
                        .filter_map(|value| Document::from_value(value.clone()).ok())
                        .filter(|doc| filter.matches(doc))
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}
