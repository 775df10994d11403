//! Document model shared by every backend.
//!
//! A [`Document`] is a JSON object carrying at least a string `id`. By
//! convention it also carries a `name` (the logical entity type) and a
//! `context` object holding entity-specific fields, optionally with a nested
//! `_data` object for unstructured extension fields. Edge documents add
//! `source`, `target` and `direction`.
//!
//! No schema is enforced: only `id` and `_version` are interpreted by the
//! storage layer.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding the document id.
pub const ID_FIELD: &str = "id";
/// Field holding the logical entity type.
pub const NAME_FIELD: &str = "name";
/// Field holding entity-specific attributes.
pub const CONTEXT_FIELD: &str = "context";
/// Field nested inside `context` holding unstructured extension attributes.
pub const DATA_FIELD: &str = "_data";
/// Field holding the optimistic-concurrency version.
pub const VERSION_FIELD: &str = "_version";
/// Edge field holding the source node id.
pub const SOURCE_FIELD: &str = "source";
/// Edge field holding the target node id.
pub const TARGET_FIELD: &str = "target";
/// Edge field holding the traversal direction.
pub const DIRECTION_FIELD: &str = "direction";

/// Collection holding node documents.
pub const NODE_COLLECTION: &str = "node";
/// Collection holding edge documents.
pub const EDGE_COLLECTION: &str = "edge";
/// Collection holding walker documents.
pub const WALKER_COLLECTION: &str = "walker";
/// Collection holding generic object documents.
pub const OBJECT_COLLECTION: &str = "object";

/// The collections every deployment is expected to have.
pub const WELL_KNOWN_COLLECTIONS: [&str; 4] = [
    NODE_COLLECTION,
    EDGE_COLLECTION,
    WALKER_COLLECTION,
    OBJECT_COLLECTION,
];

const MAX_NAME_LEN: usize = 255;

/// Traversal direction of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traversable from either endpoint.
    Both,
    /// Points into the source node.
    In,
    /// Points out of the source node.
    Out,
}

impl Direction {
    /// Returns the persisted spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Both => "both",
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    /// Parses the persisted spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "both" => Some(Direction::Both),
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted record: a JSON object keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set_id(id);
        doc
    }

    /// Creates a node-style document with `name` and `context`.
    #[must_use]
    pub fn node(id: impl Into<String>, name: impl Into<String>, context: Value) -> Self {
        let mut doc = Self::with_id(id);
        doc.insert(NAME_FIELD, Value::String(name.into()));
        doc.insert(CONTEXT_FIELD, context);
        doc
    }

    /// Creates an edge document connecting `source` to `target`.
    #[must_use]
    pub fn edge(
        id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let mut doc = Self::node(id, name, Value::Object(Map::new()));
        doc.insert(SOURCE_FIELD, Value::String(source.into()));
        doc.insert(TARGET_FIELD, Value::String(target.into()));
        doc.insert(DIRECTION_FIELD, Value::String(direction.as_str().into()));
        doc
    }

    /// Converts a JSON value into a document.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not an object.
    pub fn from_value(value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StorageError::validation(format!(
                "document must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Returns the document id, if it is a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Sets the document id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Returns the logical entity type.
    pub fn name(&self) -> Option<&str> {
        self.0.get(NAME_FIELD).and_then(Value::as_str)
    }

    /// Returns the `context` object.
    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.0.get(CONTEXT_FIELD).and_then(Value::as_object)
    }

    /// Returns the `context._data` extension object.
    pub fn context_data(&self) -> Option<&Map<String, Value>> {
        self.context()
            .and_then(|ctx| ctx.get(DATA_FIELD))
            .and_then(Value::as_object)
    }

    /// Returns the stored version, if any.
    pub fn version(&self) -> Option<u64> {
        self.0.get(VERSION_FIELD).and_then(Value::as_u64)
    }

    /// Sets the stored version.
    pub fn set_version(&mut self, version: u64) {
        self.0
            .insert(VERSION_FIELD.to_string(), Value::from(version));
    }

    /// Returns the edge source node id.
    pub fn source(&self) -> Option<&str> {
        self.0.get(SOURCE_FIELD).and_then(Value::as_str)
    }

    /// Returns the edge target node id.
    pub fn target(&self) -> Option<&str> {
        self.0.get(TARGET_FIELD).and_then(Value::as_str)
    }

    /// Returns the edge direction.
    pub fn direction(&self) -> Option<Direction> {
        self.0
            .get(DIRECTION_FIELD)
            .and_then(Value::as_str)
            .and_then(Direction::parse)
    }

    /// Returns a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Inserts a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the document, returning the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Consumes the document, returning it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Converts a persisted container entry back into a document.
    pub(crate) fn from_stored(collection: &str, id: &str, value: Value) -> StorageResult<Self> {
        Self::from_value(value).map_err(|_| {
            StorageError::Corrupted(format!("{collection}/{id} is not a JSON object"))
        })
    }

    /// Validates the `id` field and returns it, or `None` if it is missing.
    ///
    /// A `null` id counts as missing.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is present but not a valid name.
    pub(crate) fn checked_id(&self) -> StorageResult<Option<&str>> {
        match self.0.get(ID_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => {
                validate_id(id)?;
                Ok(Some(id.as_str()))
            }
            Some(other) => Err(StorageError::validation(format!(
                "document id must be a string, got {}",
                json_type(other)
            ))),
        }
    }

    /// Returns the `_version` field, or `None` if it is missing or `null`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the field is present but not an
    /// unsigned integer.
    pub(crate) fn checked_version(&self) -> StorageResult<Option<u64>> {
        match self.0.get(VERSION_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                StorageError::validation(format!(
                    "document version must be an unsigned integer, got {value}"
                ))
            }),
        }
    }

    /// Returns the validated id, assigning a fresh one if absent.
    pub(crate) fn ensure_id(&mut self) -> StorageResult<String> {
        if let Some(id) = self.checked_id()? {
            return Ok(id.to_string());
        }
        let id = new_id();
        self.set_id(id.clone());
        Ok(id)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = StorageError;

    fn try_from(value: Value) -> StorageResult<Self> {
        Self::from_value(value)
    }
}

/// Generates a new globally-unique document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a document id.
///
/// # Errors
///
/// Returns a validation error if the id is empty, too long, `.`/`..`, or
/// contains a path separator or control character.
pub fn validate_id(id: &str) -> StorageResult<()> {
    check_common("document id", id)
}

/// Validates a collection name.
///
/// Collection names become file names, so they are restricted to ASCII
/// alphanumerics, `_`, `-` and a non-leading `.`.
///
/// # Errors
///
/// Returns a validation error if the name breaks any of these rules.
pub fn validate_collection(name: &str) -> StorageResult<()> {
    check_common("collection name", name)?;
    if name.starts_with('.') {
        return Err(StorageError::validation(format!(
            "collection name {name:?} must not start with '.'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(StorageError::validation(format!(
            "collection name {name:?} contains disallowed character {c:?}"
        )));
    }
    Ok(())
}

fn check_common(what: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::validation(format!("{what} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(StorageError::validation(format!(
            "{what} exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if value == "." || value == ".." {
        return Err(StorageError::validation(format!(
            "{what} {value:?} is reserved"
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\') || c.is_control())
    {
        return Err(StorageError::validation(format!(
            "{what} {value:?} contains disallowed character {c:?}"
        )));
    }
    Ok(())
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
