//! Backend registry and factory.
//!
//! Backends are registered by name and built from a [`StoreConfig`]. The
//! built-ins are:
//!
//! | name      | location                  | notes                         |
//! |-----------|---------------------------|-------------------------------|
//! | `file`    | storage directory         | honors `auto_create`          |
//! | `memory`  | ignored                   | volatile                      |
//! | `network` | connection URI (required) | honors `pool_size`, retries   |
//!
//! Explicit configuration wins over `GRAPHDOC_*` environment variables.
//! Every resolved store has been initialized before it is returned.
//!
//! A process-wide registry backs the free functions [`register`],
//! [`resolve`], [`list_registered`] and [`reset`]. [`BackendRegistry`] can
//! also be used on its own where global state is unwanted.

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::file::{run_blocking, FileStore};
use crate::memory::MemoryStore;
use crate::remote::{connector_for_uri, NetworkStore};
use crate::store::DocumentStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Builds a store from its configuration.
pub type StoreConstructor =
    Arc<dyn Fn(&StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> + Send + Sync>;

/// Name of the built-in file backend.
pub const FILE_BACKEND: &str = "file";
/// Name of the built-in memory backend.
pub const MEMORY_BACKEND: &str = "memory";
/// Name of the built-in networked backend.
pub const NETWORK_BACKEND: &str = "network";

/// A name to constructor mapping.
#[derive(Clone)]
pub struct BackendRegistry {
    constructors: HashMap<String, StoreConstructor>,
}

impl BackendRegistry {
    /// Creates a registry with no backends.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in backends.
    pub fn with_builtins() -> Self {
        let mut constructors: HashMap<String, StoreConstructor> = HashMap::new();
        constructors.insert(FILE_BACKEND.to_string(), Arc::new(build_file));
        constructors.insert(MEMORY_BACKEND.to_string(), Arc::new(build_memory));
        constructors.insert(NETWORK_BACKEND.to_string(), Arc::new(build_network));
        Self { constructors }
    }

    /// Registers `constructor` under `name`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is empty or blank.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> StorageResult<()>
    where
        F: Fn(&StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(StorageError::validation("backend name must not be empty"));
        }
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
        Ok(())
    }

    /// Removes a backend. Returns false if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.constructors.remove(name).is_some()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn list_registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    fn constructor(&self, name: &str) -> StorageResult<StoreConstructor> {
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(name.to_string()))
    }

    /// Builds and initializes the backend registered under `name`.
    ///
    /// Unset fields of `config` are taken from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownBackend`] for an unregistered name,
    /// [`StorageError::Configuration`] for missing or inconsistent options,
    /// or whatever initialization reports.
    pub async fn resolve(
        &self,
        name: &str,
        config: StoreConfig,
    ) -> StorageResult<Arc<dyn DocumentStore>> {
        let constructor = self.constructor(name)?;
        build(name, &constructor, config.merge(StoreConfig::from_env()?)).await
    }

    /// Like [`BackendRegistry::resolve`], reading the environment through
    /// `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`BackendRegistry::resolve`].
    pub async fn resolve_with_env<F>(
        &self,
        name: &str,
        config: StoreConfig,
        lookup: F,
    ) -> StorageResult<Arc<dyn DocumentStore>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let constructor = self.constructor(name)?;
        build(name, &constructor, config.merge(StoreConfig::from_lookup(lookup)?)).await
    }

    /// Builds the backend named by the configuration's `backend` field,
    /// falling back to `GRAPHDOC_BACKEND`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no backend is named, otherwise see
    /// [`BackendRegistry::resolve`].
    pub async fn open(&self, config: StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
        let config = config.merge(StoreConfig::from_env()?);
        let name = backend_name(&config)?;
        let constructor = self.constructor(&name)?;
        build(&name, &constructor, config).await
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list_registered())
            .finish()
    }
}

fn backend_name(config: &StoreConfig) -> StorageResult<String> {
    config.backend.clone().ok_or_else(|| {
        StorageError::configuration(format!(
            "no backend named (set it explicitly or via {})",
            crate::config::ENV_BACKEND
        ))
    })
}

async fn build(
    name: &str,
    constructor: &StoreConstructor,
    config: StoreConfig,
) -> StorageResult<Arc<dyn DocumentStore>> {
    // Constructors may touch the filesystem.
    let store = {
        let (constructor, config) = (Arc::clone(constructor), config.clone());
        run_blocking(move || constructor(&config)).await?
    };
    store.initialize().await?;
    info!(
        backend = name,
        kind = store.backend_name(),
        location = config.location.as_deref().unwrap_or("-"),
        "resolved storage backend"
    );
    Ok(store)
}

fn build_file(config: &StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    let location = config.require_location(FILE_BACKEND)?;
    if location.contains("://") {
        return Err(StorageError::configuration(format!(
            "file backend location {location:?} looks like a connection URI"
        )));
    }
    let store = FileStore::open(Path::new(location), config.effective_auto_create())?;
    Ok(Arc::new(store))
}

fn build_memory(_config: &StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    Ok(Arc::new(MemoryStore::new()))
}

fn build_network(config: &StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    let uri = config.require_location(NETWORK_BACKEND)?;
    if config.pool_size == Some(0) {
        return Err(StorageError::configuration("pool_size must be at least 1"));
    }
    if config.retry_attempts == Some(0) {
        return Err(StorageError::configuration("retry_attempts must be at least 1"));
    }
    let connector = connector_for_uri(uri)?;
    Ok(Arc::new(NetworkStore::new(
        connector,
        config.effective_pool_size(),
        config.retry_config(),
    )))
}

fn global() -> &'static RwLock<BackendRegistry> {
    static GLOBAL: OnceLock<RwLock<BackendRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(BackendRegistry::with_builtins()))
}

/// Registers a backend in the process-wide registry.
///
/// # Errors
///
/// See [`BackendRegistry::register`].
pub fn register<F>(name: &str, constructor: F) -> StorageResult<()>
where
    F: Fn(&StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> + Send + Sync + 'static,
{
    global().write().register(name, constructor)
}

/// Builds and initializes a backend from the process-wide registry.
///
/// # Example
///
/// ```rust
/// use graphdoc_storage::{registry, Document, StoreConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> graphdoc_storage::StorageResult<()> {
/// let store = registry::resolve("memory", StoreConfig::new()).await?;
/// store.save("node", Document::with_id("n1")).await?;
/// assert!(store.get("node", "n1").await?.is_some());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// See [`BackendRegistry::resolve`].
pub async fn resolve(name: &str, config: StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    let constructor = global().read().constructor(name)?;
    build(name, &constructor, config.merge(StoreConfig::from_env()?)).await
}

/// Like [`resolve`], reading the environment through `lookup`.
///
/// # Errors
///
/// See [`BackendRegistry::resolve`].
pub async fn resolve_with_env<F>(
    name: &str,
    config: StoreConfig,
    lookup: F,
) -> StorageResult<Arc<dyn DocumentStore>>
where
    F: Fn(&str) -> Option<String>,
{
    let constructor = global().read().constructor(name)?;
    build(name, &constructor, config.merge(StoreConfig::from_lookup(lookup)?)).await
}

/// Builds the backend named by the configuration or `GRAPHDOC_BACKEND`.
///
/// # Errors
///
/// See [`BackendRegistry::open`].
pub async fn open(config: StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    let config = config.merge(StoreConfig::from_env()?);
    let name = backend_name(&config)?;
    let constructor = global().read().constructor(&name)?;
    build(&name, &constructor, config).await
}

/// Returns the names in the process-wide registry, sorted.
pub fn list_registered() -> Vec<String> {
    global().read().list_registered()
}

/// Restores the process-wide registry to the built-ins only.
pub fn reset() {
    *global().write() = BackendRegistry::with_builtins();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, ID_FIELD};
    use crate::remote::LoopbackServer;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn builtins_are_listed() {
        let registry = BackendRegistry::with_builtins();
        assert_eq!(registry.list_registered(), ["file", "memory", "network"]);
        assert!(BackendRegistry::empty().list_registered().is_empty());
    }

    #[test]
    fn rejects_empty_names() {
        let mut registry = BackendRegistry::empty();
        let err = registry.register(" ", build_memory).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn unknown_backend() {
        let registry = BackendRegistry::with_builtins();
        let err = registry
            .resolve_with_env("cassandra", StoreConfig::new(), no_env)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownBackend(name) if name == "cassandra"));
    }

    #[tokio::test]
    async fn network_requires_uri() {
        let registry = BackendRegistry::with_builtins();
        let err = registry
            .resolve_with_env(NETWORK_BACKEND, StoreConfig::new(), no_env)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn network_rejects_inconsistent_options() {
        let registry = BackendRegistry::with_builtins();
        for config in [
            StoreConfig::new().location("loopback://registry-zero").pool_size(0),
            StoreConfig::new().location("loopback://registry-zero").retry_attempts(0),
            StoreConfig::new().location("gopher://host"),
        ] {
            let err = registry
                .resolve_with_env(NETWORK_BACKEND, config, no_env)
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::Configuration(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn network_is_initialized() {
        let registry = BackendRegistry::with_builtins();
        let store = registry
            .resolve_with_env(
                NETWORK_BACKEND,
                StoreConfig::new().location("loopback://registry-init"),
                no_env,
            )
            .await
            .unwrap();
        assert!(store.supports_versioning());
        assert!(LoopbackServer::named("registry-init").has_index("edge", ID_FIELD));
    }

    #[tokio::test]
    async fn file_location_from_env() {
        let temp = tempdir().unwrap();
        let location = temp.path().join("data").display().to_string();
        let registry = BackendRegistry::with_builtins();

        let store = registry
            .resolve_with_env(FILE_BACKEND, StoreConfig::new(), |key| {
                (key == crate::config::ENV_LOCATION).then(|| location.clone())
            })
            .await
            .unwrap();
        store.save("node", Document::with_id("n1")).await.unwrap();
        assert!(temp.path().join("data").join("node.json").exists());
    }

    #[tokio::test]
    async fn explicit_config_beats_env() {
        let temp = tempdir().unwrap();
        let registry = BackendRegistry::with_builtins();

        let err = registry
            .resolve_with_env(
                FILE_BACKEND,
                StoreConfig::new()
                    .location(temp.path().join("missing").display().to_string())
                    .auto_create(false),
                |key| (key == crate::config::ENV_AUTO_CREATE).then(|| "true".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)), "{err}");
    }

    #[tokio::test]
    async fn file_rejects_uri_location() {
        let registry = BackendRegistry::with_builtins();
        let err = registry
            .resolve_with_env(
                FILE_BACKEND,
                StoreConfig::new().location("loopback://oops"),
                no_env,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn custom_backend() {
        let mut registry = BackendRegistry::empty();
        registry
            .register("scratch", |_config: &StoreConfig| {
                Ok(Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>)
            })
            .unwrap();
        let store = registry
            .resolve_with_env("scratch", StoreConfig::new(), no_env)
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(registry.unregister("scratch"));
        assert!(!registry.contains("scratch"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn constructors_run_off_the_executor_thread() {
        let executor = std::thread::current().id();
        let seen = Arc::new(parking_lot::Mutex::new(None));

        let mut registry = BackendRegistry::empty();
        let record = Arc::clone(&seen);
        registry
            .register("thread-check", move |_config: &StoreConfig| {
                *record.lock() = Some(std::thread::current().id());
                Ok(Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>)
            })
            .unwrap();
        registry
            .resolve_with_env("thread-check", StoreConfig::new(), no_env)
            .await
            .unwrap();

        let constructed_on = seen.lock().take().unwrap();
        assert_ne!(constructed_on, executor);

        let dir = tempdir().unwrap();
        let root = dir.path().join("created");
        let store = BackendRegistry::with_builtins()
            .resolve_with_env(
                FILE_BACKEND,
                StoreConfig::new().location(root.display().to_string()),
                no_env,
            )
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "file");
        assert!(root.is_dir());
    }
}
