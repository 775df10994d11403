//! Process-wide backend registry.

use graphdoc_storage::{
    registry, Document, DocumentStore, MemoryStore, StorageError, StoreConfig, ENV_BACKEND,
    ENV_LOCATION, ENV_POOL_SIZE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

// Registration and reset share one test so parallel tests never observe a
// half-reset registry.
#[tokio::test]
async fn register_resolve_and_reset() {
    registry::register("scratch", |_config: &StoreConfig| {
        Ok(Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>)
    })
    .unwrap();
    assert!(registry::list_registered().contains(&"scratch".to_string()));

    let store = registry::resolve_with_env("scratch", StoreConfig::new(), no_env)
        .await
        .unwrap();
    store.save("node", Document::with_id("n1")).await.unwrap();

    registry::reset();
    assert_eq!(registry::list_registered(), ["file", "memory", "network"]);
    let err = registry::resolve_with_env("scratch", StoreConfig::new(), no_env)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownBackend(_)), "{err}");
}

#[test]
fn register_rejects_empty_name() {
    let err = registry::register("", |_config: &StoreConfig| {
        Ok(Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>)
    })
    .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn unknown_backend_is_reported_by_name() {
    let err = registry::resolve_with_env("sqlite", StoreConfig::new(), no_env)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown backend: sqlite");
}

#[tokio::test]
async fn network_without_uri_is_a_configuration_error() {
    let err = registry::resolve_with_env("network", StoreConfig::new(), no_env)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)), "{err}");
}

#[tokio::test]
async fn environment_fills_gaps() {
    let err = registry::resolve_with_env(
        "network",
        StoreConfig::new(),
        env(&[(ENV_LOCATION, "loopback://registry-env"), (ENV_POOL_SIZE, "many")]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)), "{err}");

    let store = registry::resolve_with_env(
        "network",
        StoreConfig::new(),
        env(&[(ENV_LOCATION, "loopback://registry-env"), (ENV_POOL_SIZE, "2")]),
    )
    .await
    .unwrap();
    assert_eq!(store.backend_name(), "network");
}

#[tokio::test]
async fn explicit_location_wins_over_environment() {
    let explicit = TempDir::new().unwrap();
    let from_env = TempDir::new().unwrap();

    let env_location = from_env.path().display().to_string();

    let store = registry::resolve_with_env(
        "file",
        StoreConfig::new().location(explicit.path().display().to_string()),
        env(&[(ENV_LOCATION, env_location.as_str())]),
    )
    .await
    .unwrap();
    store.save("node", Document::with_id("n1")).await.unwrap();

    assert!(explicit.path().join("node.json").exists());
    assert!(!from_env.path().join("node.json").exists());
}

#[tokio::test]
async fn file_without_location_is_a_configuration_error() {
    let err = registry::resolve_with_env("file", StoreConfig::new(), no_env)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)), "{err}");
}

#[tokio::test]
async fn open_uses_configured_backend_name() {
    let store = registry::open(StoreConfig::new().backend("memory"))
        .await
        .unwrap();
    assert_eq!(store.backend_name(), "memory");

    let named_by_env = registry::BackendRegistry::with_builtins()
        .resolve_with_env("memory", StoreConfig::new(), env(&[(ENV_BACKEND, "file")]))
        .await
        .unwrap();
    assert_eq!(named_by_env.backend_name(), "memory");
}
