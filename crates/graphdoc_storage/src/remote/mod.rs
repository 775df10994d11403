//! Networked backend and its connection layer.
//!
//! The external document database is abstracted behind two traits, so the
//! store logic (pooling, retries, version checks) is independent of the wire:
//!
//! - [`Connector`] opens connections
//! - [`RemoteConnection`] performs single-document operations and native
//!   queries on one connection
//!
//! [`LoopbackServer`] is an in-process implementation of both, reachable
//! through `loopback://<name>` URIs. Other schemes can be added with
//! [`register_scheme`].

mod loopback;
mod network;
mod pool;
mod scheme;

pub use loopback::LoopbackServer;
pub use network::NetworkStore;
pub use pool::{ConnectionPool, Lease};
pub use scheme::{connector_for_uri, register_scheme, ConnectorFactory};

use crate::document::Document;
use crate::query::{Comparator, Filter};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Result type for wire-level operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A boxed, sendable future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Timeout, dropped connection, or another failure worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// A failure that will not go away by retrying.
    #[error("remote failure: {0}")]
    Fatal(String),
}

impl RemoteError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Opens connections to an external document database.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Opens a new connection.
    async fn connect(&self) -> RemoteResult<Box<dyn RemoteConnection>>;

    /// Returns a human-readable description of the endpoint.
    fn describe(&self) -> String;
}

/// One connection to an external document database.
///
/// Operations are single-document and atomic on the remote side. Writes are
/// conditional so the caller can build compare-and-swap on top of them.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Returns true if `find` can evaluate `comparator` natively.
    fn supports(&self, comparator: Comparator) -> bool;

    /// Creates an index on `field` in `collection` if it does not exist.
    async fn ensure_index(&mut self, collection: &str, field: &str) -> RemoteResult<()>;

    /// Returns the document with the given id.
    async fn find_one(&mut self, collection: &str, id: &str) -> RemoteResult<Option<Document>>;

    /// Inserts a document unless one with the same id exists.
    ///
    /// Returns false if the id was already taken.
    async fn insert_one(&mut self, collection: &str, document: &Document) -> RemoteResult<bool>;

    /// Replaces a document only if its stored `_version` equals
    /// `expected_version`.
    ///
    /// Returns false if nothing was replaced.
    async fn replace_one(
        &mut self,
        collection: &str,
        id: &str,
        expected_version: u64,
        document: &Document,
    ) -> RemoteResult<bool>;

    /// Deletes a document. Returns false if it did not exist.
    async fn delete_one(&mut self, collection: &str, id: &str) -> RemoteResult<bool>;

    /// Returns the documents matching `filter`, in insertion order.
    ///
    /// Callers only pass filters whose comparators are all [`supported`].
    ///
    /// [`supported`]: RemoteConnection::supports
    async fn find(&mut self, collection: &str, filter: &Filter) -> RemoteResult<Vec<Document>>;
}
