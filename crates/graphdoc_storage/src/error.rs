//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// The variants fall into four families:
///
/// - validation: the request itself is malformed and is never retried
/// - I/O: the medium is unavailable or failed; the caller may retry
/// - version conflict: the caller must re-read and retry with the new version
/// - factory: backend resolution failed and the resolve call is fatal
#[derive(Debug, Error)]
pub enum StorageError {
    /// A collection name, document id, document shape or filter is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage medium could not be reached or gave up after retries.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Another store instance holds the directory lock.
    #[error("storage locked: another store has exclusive access to {}", .path.display())]
    Locked {
        /// The locked storage root.
        path: PathBuf,
    },

    /// A persisted container could not be decoded.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The stored version did not match the version supplied by the writer.
    #[error(
        "version conflict on {collection}/{id}: expected {}, found {}",
        fmt_version(.expected),
        fmt_version(.actual)
    )]
    VersionConflict {
        /// Collection of the conflicting document.
        collection: String,
        /// Id of the conflicting document.
        id: String,
        /// Version supplied with the write (`None` for a fresh document).
        expected: Option<u64>,
        /// Version currently stored (`None` if the document is absent).
        actual: Option<u64>,
    },

    /// No constructor is registered under the requested backend name.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Factory configuration is missing a required parameter or is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn fmt_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

impl StorageError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if the request was malformed.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }

    /// Returns true if this error belongs to the I/O family.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_)
                | StorageError::Unavailable(_)
                | StorageError::Locked { .. }
                | StorageError::Corrupted(_)
        )
    }

    /// Returns true for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }

    /// Returns true if the caller may retry the same request.
    ///
    /// Version conflicts are retryable only after re-reading the document,
    /// so they are not reported here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_) | StorageError::Unavailable(_) | StorageError::Locked { .. }
        )
    }
}
