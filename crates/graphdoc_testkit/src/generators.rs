//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random documents, names and operation
//! sequences that respect the store's validation rules.

use graphdoc_storage::Document;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid document ids.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}")
        .expect("Invalid regex")
        .prop_filter("Collection name must not be empty", |s| !s.is_empty())
}

/// Strategy for generating JSON leaf values.
///
/// Floats are excluded so that values survive a text round trip unchanged.
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for generating nested JSON values up to three levels deep.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_leaf_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Strategy for generating a document with an id and arbitrary fields.
///
/// Generated field names never start with `_`, so they cannot collide with
/// store-managed fields such as `_version`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        document_id_strategy(),
        prop::collection::btree_map("[a-z][a-z0-9]{0,7}", json_value_strategy(), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut map: Map<String, Value> = fields.into_iter().collect();
            map.insert("id".to_string(), Value::String(id));
            Document::from(map)
        })
}

/// A single store operation.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Save a document
    Save {
        /// Document to save
        document: Document,
    },
    /// Delete a document
    Delete {
        /// Document id
        id: String,
    },
    /// Get a document
    Get {
        /// Document id
        id: String,
    },
}

/// Strategy for generating store operations over a small id space.
///
/// Ids are drawn from `k0`..`k7` so that operations frequently hit the same
/// document.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    let id = (0..8u8).prop_map(|n| format!("k{n}"));
    prop_oneof![
        3 => (id.clone(), json_value_strategy()).prop_map(|(id, value)| {
            let mut document = Document::with_id(id);
            document.insert("value", value);
            StoreOperation::Save { document }
        }),
        1 => id.clone().prop_map(|id| StoreOperation::Delete { id }),
        2 => id.prop_map(|id| StoreOperation::Get { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
