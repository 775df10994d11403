//! Bounded connection pool.

use super::{Connector, RemoteConnection, RemoteError, RemoteResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A connection checked out of a [`ConnectionPool`].
///
/// Hand it back with [`ConnectionPool::release`] once the operation
/// succeeded. Dropping it instead discards the connection, which is what
/// happens on errors and when the caller is cancelled mid-operation, so a
/// connection in an unknown state is never reused.
pub struct Lease {
    conn: Box<dyn RemoteConnection>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    /// Borrows the underlying connection.
    pub fn connection(&mut self) -> &mut Box<dyn RemoteConnection> {
        &mut self.conn
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").finish_non_exhaustive()
    }
}

/// A pool of at most `max_size` live connections.
///
/// Idle connections are reused before new ones are opened. Callers beyond
/// `max_size` wait for a lease to be released or dropped.
#[derive(Clone)]
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: Arc<Mutex<Vec<Box<dyn RemoteConnection>>>>,
    permits: Arc<Semaphore>,
    max_size: usize,
}

impl ConnectionPool {
    /// Creates an empty pool. A `max_size` of zero is treated as one.
    pub fn new(connector: Arc<dyn Connector>, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            connector,
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_size))),
            permits: Arc::new(Semaphore::new(max_size)),
            max_size,
        }
    }

    /// Checks out a connection, opening one if none is idle.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if a new connection cannot be opened.
    pub async fn acquire(&self) -> RemoteResult<Lease> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RemoteError::fatal("connection pool closed"))?;

        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.connector.connect().await?,
        };

        Ok(Lease {
            conn,
            _permit: permit,
        })
    }

    /// Returns a healthy connection to the idle set.
    pub fn release(&self, lease: Lease) {
        let Lease { conn, _permit } = lease;
        self.idle.lock().push(conn);
    }

    /// Returns the maximum number of live connections.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns the number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.max_size - self.permits.available_permits()
    }

    /// Returns the connector's endpoint description.
    pub fn endpoint(&self) -> String {
        self.connector.describe()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.connector.describe())
            .field("max_size", &self.max_size)
            .field("idle", &self.idle_count())
            .finish()
    }
}
