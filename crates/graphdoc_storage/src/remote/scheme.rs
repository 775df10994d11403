//! URI scheme to connector mapping.

use super::{Connector, LoopbackServer};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Builds a connector from the part of a URI after `scheme://`.
pub type ConnectorFactory = Arc<dyn Fn(&str) -> StorageResult<Arc<dyn Connector>> + Send + Sync>;

fn schemes() -> &'static RwLock<HashMap<String, ConnectorFactory>> {
    static SCHEMES: OnceLock<RwLock<HashMap<String, ConnectorFactory>>> = OnceLock::new();
    SCHEMES.get_or_init(|| {
        let mut map: HashMap<String, ConnectorFactory> = HashMap::new();
        map.insert("loopback".to_string(), Arc::new(loopback_connector));
        RwLock::new(map)
    })
}

fn loopback_connector(rest: &str) -> StorageResult<Arc<dyn Connector>> {
    let name = rest.trim_end_matches('/');
    if name.is_empty() {
        return Err(StorageError::configuration(
            "loopback URI needs a server name: loopback://<name>",
        ));
    }
    Ok(Arc::new(LoopbackServer::named(name)))
}

/// Registers a connector factory for `scheme`, replacing any existing one.
///
/// # Errors
///
/// Returns a validation error if the scheme is empty or contains characters
/// other than ASCII alphanumerics, `+`, `-` and `.`.
pub fn register_scheme<F>(scheme: &str, factory: F) -> StorageResult<()>
where
    F: Fn(&str) -> StorageResult<Arc<dyn Connector>> + Send + Sync + 'static,
{
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(StorageError::validation(format!(
            "invalid URI scheme {scheme:?}"
        )));
    }
    schemes()
        .write()
        .insert(scheme.to_ascii_lowercase(), Arc::new(factory));
    Ok(())
}

/// Returns a connector for a `scheme://...` connection URI.
///
/// # Errors
///
/// Returns a configuration error if the URI has no scheme or the scheme is
/// not registered, or whatever the scheme's factory reports.
pub fn connector_for_uri(uri: &str) -> StorageResult<Arc<dyn Connector>> {
    let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
        StorageError::configuration(format!(
            "connection URI {uri:?} must look like scheme://address"
        ))
    })?;

    let factory = schemes()
        .read()
        .get(&scheme.to_ascii_lowercase())
        .cloned()
        .ok_or_else(|| {
            StorageError::configuration(format!("unsupported connection URI scheme {scheme:?}"))
        })?;
    factory(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_uri_resolves_named_server() {
        let connector = connector_for_uri("loopback://scheme-test").unwrap();
        assert_eq!(connector.describe(), "loopback://scheme-test");
    }

    #[test]
    fn rejects_malformed_uris() {
        for uri in ["no-scheme", "loopback://", "ftp://host/db"] {
            let err = connector_for_uri(uri).unwrap_err();
            assert!(matches!(err, StorageError::Configuration(_)), "{uri}: {err}");
        }
    }

    #[test]
    fn registered_scheme_is_used() {
        register_scheme("scheme-test-db", |rest| {
            Ok(Arc::new(LoopbackServer::named(rest)) as Arc<dyn Connector>)
        })
        .unwrap();
        let connector = connector_for_uri("SCHEME-TEST-DB://alias").unwrap();
        assert_eq!(connector.describe(), "loopback://alias");
    }

    #[test]
    fn rejects_invalid_scheme_names() {
        assert!(register_scheme("", |_| Err(StorageError::configuration("x"))).is_err());
        assert!(register_scheme("a/b", |_| Err(StorageError::configuration("x"))).is_err());
    }
}
