//! Stress tests for GraphDoc stores.
//!
//! These helpers drive a store from many tasks at once. Run them on a
//! multi-threaded runtime to get real parallelism.

use graphdoc_storage::{modify_with_retry, Document, DocumentStore, StorageError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations rejected with a version conflict.
    pub conflicted_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, conflicted: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + conflicted + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            conflicted_ops: conflicted,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Conflicted: {}", self.conflicted_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per task.
    pub operations: usize,
    /// Number of concurrent tasks.
    pub tasks: usize,
    /// Number of distinct documents.
    pub document_count: usize,
    /// Collection to write into.
    pub collection: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 250,
            tasks: 8,
            document_count: 64,
            collection: "stress".to_string(),
        }
    }
}

impl StressConfig {
    /// Creates a configuration for quick runs.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 25,
            tasks: 4,
            document_count: 16,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    conflicted: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record<T>(&self, result: Result<T, StorageError>) {
        let counter = match result {
            Ok(_) => &self.successful,
            Err(StorageError::VersionConflict { .. }) => &self.conflicted,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.conflicted.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

async fn run_tasks<F, Fut>(config: &StressConfig, counters: &Arc<Counters>, task: F)
where
    F: Fn(usize) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let handles: Vec<_> = (0..config.tasks).map(|t| tokio::spawn(task(t))).collect();
    for handle in handles {
        if handle.await.is_err() {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Saves fresh documents from every task, each task using its own ids.
///
/// No two tasks touch the same document, so every backend should report
/// zero conflicts and zero failures.
pub async fn stress_concurrent_saves(
    store: Arc<dyn DocumentStore>,
    config: &StressConfig,
) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    run_tasks(config, &counters, |t| {
        let store = Arc::clone(&store);
        let counters = Arc::clone(&counters);
        let (operations, collection) = (config.operations, config.collection.clone());
        async move {
            for i in 0..operations {
                let doc = Document::node(format!("t{t}-{i}"), "Stress", json!({"task": t, "op": i}));
                counters.record(store.save(&collection, doc).await);
            }
        }
    })
    .await;

    counters.finish(start)
}

/// Mixes saves, reads and deletes over a shared id space.
///
/// Saves go through [`modify_with_retry`] for existing documents so the run
/// also works against versioned backends. Conflicts are counted, not failed.
pub async fn stress_mixed_operations(
    store: Arc<dyn DocumentStore>,
    config: &StressConfig,
) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    run_tasks(config, &counters, |t| {
        let store = Arc::clone(&store);
        let counters = Arc::clone(&counters);
        let (operations, documents, collection) = (
            config.operations,
            config.document_count.max(1),
            config.collection.clone(),
        );
        async move {
            for i in 0..operations {
                let id = format!("doc-{}", (t * 31 + i) % documents);
                let result = match i % 3 {
                    0 => match store.get(&collection, &id).await {
                        Ok(Some(_)) => modify_with_retry(&*store, &collection, &id, 3, |doc| {
                            doc.insert("touched_by", json!(t));
                        })
                        .await
                        .map(|_| ()),
                        Ok(None) => store
                            .save(&collection, Document::with_id(id.clone()))
                            .await
                            .map(|_| ()),
                        Err(e) => Err(e),
                    },
                    1 => store.get(&collection, &id).await.map(|_| ()),
                    _ => store.delete(&collection, &id).await,
                };
                counters.record(result);
            }
        }
    })
    .await;

    counters.finish(start)
}

/// Increments a counter field from every task with [`modify_with_retry`].
///
/// Returns the run result and the final counter value. On a versioned
/// backend the final value equals the number of successful operations.
pub async fn stress_counter_increments(
    store: Arc<dyn DocumentStore>,
    config: &StressConfig,
    max_attempts: u32,
) -> (StressTestResult, i64) {
    let collection = config.collection.clone();
    let mut seed = Document::with_id("counter");
    seed.insert("hits", json!(0));
    let existing = store
        .get(&collection, "counter")
        .await
        .expect("Failed to read counter document");
    if existing.is_none() {
        store
            .save(&collection, seed)
            .await
            .expect("Failed to seed counter document");
    }

    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    run_tasks(config, &counters, |_| {
        let store = Arc::clone(&store);
        let counters = Arc::clone(&counters);
        let (operations, collection) = (config.operations, collection.clone());
        async move {
            for _ in 0..operations {
                let result = modify_with_retry(&*store, &collection, "counter", max_attempts, |doc| {
                    let hits = doc.get("hits").and_then(|v| v.as_i64()).unwrap_or(0);
                    doc.insert("hits", json!(hits + 1));
                })
                .await;
                match result {
                    // The counter vanished: nothing was incremented.
                    Ok(None) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    other => counters.record(other),
                }
            }
        }
    })
    .await;

    let hits = store
        .get(&collection, "counter")
        .await
        .ok()
        .flatten()
        .and_then(|doc| doc.get("hits").and_then(|v| v.as_i64()))
        .unwrap_or(0);
    (counters.finish(start), hits)
}
