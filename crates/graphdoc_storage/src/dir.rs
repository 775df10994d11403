//! Storage directory management for the file backend.
//!
//! ```text
//! <root>/
//! ├─ LOCK              # Advisory lock held by the owning store
//! ├─ node.json         # One container per collection
//! ├─ edge.json
//! └─ <name>.json.tmp   # Transient, only during an atomic replace
//! ```
//!
//! A container is a JSON object mapping document id to document, in
//! insertion order. All methods here are blocking; the file backend calls
//! them from tokio's blocking pool.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const CONTAINER_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// A collection container: document id to document.
pub type Container = Map<String, Value>;

/// Owns a storage root directory and its advisory lock.
///
/// Only one `StorageDir` can hold a given root at a time, across processes
/// and within one process.
#[derive(Debug)]
pub struct StorageDir {
    path: PathBuf,
    _lock_file: File,
}

impl StorageDir {
    /// Opens a storage root, creating it if `auto_create` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `auto_create` is false
    /// - The path exists but is not a directory
    /// - Another store holds the lock (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path, auto_create: bool) -> StorageResult<Self> {
        if !path.exists() {
            if auto_create {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Unavailable(format!(
                    "storage directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "storage path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the container path for a collection.
    #[must_use]
    pub fn container_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.{CONTAINER_EXT}"))
    }

    fn temp_path(&self, collection: &str) -> PathBuf {
        self.path
            .join(format!("{collection}.{CONTAINER_EXT}{TEMP_SUFFIX}"))
    }

    /// Loads a collection container.
    ///
    /// A missing or empty file is an empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the file is not a JSON object,
    /// or an I/O error if it cannot be read.
    pub fn read_container(&self, collection: &str) -> StorageResult<Container> {
        let path = self.container_path(collection);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Container::new()),
            Err(e) => return Err(e.into()),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Container::new());
        }

        serde_json::from_slice(&data).map_err(|e| {
            StorageError::Corrupted(format!("{}: {e}", path.display()))
        })
    }

    /// Replaces a collection container atomically.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to a temporary file next to the container
    /// 2. Sync the temporary file to disk
    /// 3. Rename it over the container
    /// 4. Fsync the directory so the rename itself is durable
    ///
    /// Until step 3 completes the previous container is untouched.
    pub fn write_container(&self, collection: &str, container: &Container) -> StorageResult<()> {
        let temp_path = self.temp_path(collection);
        let data = serde_json::to_vec(container).map_err(io::Error::from)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.container_path(collection))?;
        self.sync_directory()?;
        Ok(())
    }

    /// Lists the collections that have a container on disk.
    pub fn collections(&self) -> StorageResult<Vec<String>> {
        let suffix = format!(".{CONTAINER_EXT}");
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(&suffix))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}
