//! Store and retry configuration.
//!
//! A [`StoreConfig`] can come from an explicit call, the environment, or a
//! JSON file. Sources are layered with [`StoreConfig::merge`], where the
//! receiver wins field by field; the factory layers the explicit config over
//! the environment.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable selecting the backend.
pub const ENV_BACKEND: &str = "GRAPHDOC_BACKEND";
/// Environment variable holding the storage location or connection string.
pub const ENV_LOCATION: &str = "GRAPHDOC_LOCATION";
/// Environment variable holding the connection pool size.
pub const ENV_POOL_SIZE: &str = "GRAPHDOC_POOL_SIZE";
/// Environment variable controlling creation of a missing location.
pub const ENV_AUTO_CREATE: &str = "GRAPHDOC_AUTO_CREATE";
/// Environment variable holding the transient-failure retry budget.
pub const ENV_RETRY_ATTEMPTS: &str = "GRAPHDOC_RETRY_ATTEMPTS";

/// Default maximum number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Default number of attempts for transient failures.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Configuration accepted by the backend factory.
///
/// Every field is optional so that partial sources can be layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Registered backend name.
    pub backend: Option<String>,
    /// Directory (file backend) or connection URI (networked backend).
    pub location: Option<String>,
    /// Maximum concurrent connections (networked backend).
    pub pool_size: Option<usize>,
    /// Create the storage location if it is missing.
    pub auto_create: Option<bool>,
    /// Attempts for transient network failures, including the first.
    pub retry_attempts: Option<u32>,
}

impl StoreConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend name.
    #[must_use]
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Sets the storage location or connection string.
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the connection pool size.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets whether a missing location is created.
    #[must_use]
    pub fn auto_create(mut self, value: bool) -> Self {
        self.auto_create = Some(value);
        self
    }

    /// Sets the transient-failure retry budget.
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Fills every unset field from `fallback`.
    #[must_use]
    pub fn merge(self, fallback: StoreConfig) -> Self {
        Self {
            backend: self.backend.or(fallback.backend),
            location: self.location.or(fallback.location),
            pool_size: self.pool_size.or(fallback.pool_size),
            auto_create: self.auto_create.or(fallback.auto_create),
            retry_attempts: self.retry_attempts.or(fallback.retry_attempts),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is set but unparseable.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an environment lookup function.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a value is set but unparseable.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            backend: get(ENV_BACKEND),
            location: get(ENV_LOCATION),
            pool_size: get(ENV_POOL_SIZE)
                .map(|v| parse_number(ENV_POOL_SIZE, &v))
                .transpose()?,
            auto_create: get(ENV_AUTO_CREATE)
                .map(|v| parse_bool(ENV_AUTO_CREATE, &v))
                .transpose()?,
            retry_attempts: get(ENV_RETRY_ATTEMPTS)
                .map(|v| parse_number(ENV_RETRY_ATTEMPTS, &v))
                .transpose()?,
        })
    }

    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it is not a valid configuration object.
    pub fn from_json_file(path: &Path) -> StorageResult<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| {
            StorageError::configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Returns the configured pool size or the default.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    /// Returns the configured auto-create flag or the default (`true`).
    pub fn effective_auto_create(&self) -> bool {
        self.auto_create.unwrap_or(true)
    }

    /// Returns the retry policy implied by this configuration.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS))
    }

    /// Returns the location, or a configuration error naming the backend.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no location is set.
    pub fn require_location(&self, backend: &str) -> StorageResult<&str> {
        self.location.as_deref().ok_or_else(|| {
            StorageError::configuration(format!(
                "backend {backend:?} requires a location (set it explicitly or via {ENV_LOCATION})"
            ))
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> StorageResult<T> {
    value.trim().parse().map_err(|_| {
        StorageError::configuration(format!("{key} must be a non-negative integer, got {value:?}"))
    })
}

fn parse_bool(key: &str, value: &str) -> StorageResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StorageError::configuration(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .backend("file")
            .location("/tmp/data")
            .auto_create(false)
            .pool_size(4);

        assert_eq!(config.backend.as_deref(), Some("file"));
        assert_eq!(config.location.as_deref(), Some("/tmp/data"));
        assert!(!config.effective_auto_create());
        assert_eq!(config.effective_pool_size(), 4);
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(config.effective_auto_create());
        assert_eq!(config.effective_pool_size(), DEFAULT_POOL_SIZE);
        assert_eq!(config.retry_config().max_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert!(config.require_location("file").unwrap_err().to_string().contains("file"));
    }

    #[test]
    fn explicit_wins_over_fallback() {
        let explicit = StoreConfig::new().location("explicit").pool_size(2);
        let env = StoreConfig::new()
            .location("env")
            .pool_size(9)
            .auto_create(false);

        let merged = explicit.merge(env);
        assert_eq!(merged.location.as_deref(), Some("explicit"));
        assert_eq!(merged.pool_size, Some(2));
        assert_eq!(merged.auto_create, Some(false));
    }

    #[test]
    fn from_lookup_parses_values() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "network"),
            (ENV_LOCATION, "loopback://main"),
            (ENV_POOL_SIZE, " 8 "),
            (ENV_AUTO_CREATE, "no"),
            (ENV_RETRY_ATTEMPTS, "5"),
        ]))
        .unwrap();

        assert_eq!(config.backend.as_deref(), Some("network"));
        assert_eq!(config.location.as_deref(), Some("loopback://main"));
        assert_eq!(config.pool_size, Some(8));
        assert_eq!(config.auto_create, Some(false));
        assert_eq!(config.retry_attempts, Some(5));
    }

    #[test]
    fn from_lookup_ignores_empty_values() {
        let config = StoreConfig::from_lookup(lookup(&[(ENV_LOCATION, "  ")])).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_POOL_SIZE, "many")])).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_AUTO_CREATE, "maybe")])).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn from_json_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(&path, br#"{"backend": "file", "location": "data", "auto_create": true}"#)
            .unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend.as_deref(), Some("file"));
        assert_eq!(config.auto_create, Some(true));

        std::fs::write(&path, br#"{"colour": "blue"}"#).unwrap();
        assert!(matches!(
            StoreConfig::from_json_file(&path),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
