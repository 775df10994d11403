//! Filter compilation and matching.
//!
//! A filter is a JSON object mapping a dot-separated field path to either an
//! expected value or a comparator object:
//!
//! ```text
//! {
//!     "name": "City",
//!     "context.population": { "greater-than": 1000000 },
//!     "context.state": { "in-set": ["IL", "NY"] }
//! }
//! ```
//!
//! Every object operand is a comparator object; compare against an object
//! literal with `{"equals": {...}}`.
//!
//! Entries are ANDed. A path that does not resolve fails its entry; it is
//! never an error. Malformed filters are rejected by [`Filter::compile`]
//! before any document is looked at.

use crate::document::{json_type, Document};
use crate::error::{StorageError, StorageResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A comparison supported by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// Equal to the operand.
    Equals,
    /// Strictly greater than the operand.
    GreaterThan,
    /// Strictly less than the operand.
    LessThan,
    /// Equal to one of the operand's elements.
    InSet,
}

impl Comparator {
    /// Parses a comparator key.
    ///
    /// Both the long spellings and the `$`-prefixed short spellings are
    /// accepted.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "equals" | "$eq" => Some(Comparator::Equals),
            "greater-than" | "$gt" => Some(Comparator::GreaterThan),
            "less-than" | "$lt" => Some(Comparator::LessThan),
            "in-set" | "$in" => Some(Comparator::InSet),
            _ => None,
        }
    }

    /// Returns the canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Equals => "equals",
            Comparator::GreaterThan => "greater-than",
            Comparator::LessThan => "less-than",
            Comparator::InSet => "in-set",
        }
    }
}

/// A single comparison against a resolved field value.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    comparator: Comparator,
    operand: Value,
}

impl Predicate {
    /// Returns the comparator.
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Returns the operand.
    pub fn operand(&self) -> &Value {
        &self.operand
    }

    fn evaluate(&self, value: &Value) -> bool {
        match self.comparator {
            Comparator::Equals => values_equal(value, &self.operand),
            Comparator::GreaterThan => compare(value, &self.operand) == Some(Ordering::Greater),
            Comparator::LessThan => compare(value, &self.operand) == Some(Ordering::Less),
            Comparator::InSet => match &self.operand {
                Value::Array(items) => items.iter().any(|item| values_equal(value, item)),
                _ => false,
            },
        }
    }
}

/// One compiled filter entry: a field path and the predicates it must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    path: String,
    segments: Vec<String>,
    predicates: Vec<Predicate>,
}

impl FilterEntry {
    /// Returns the dot-separated path as written.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path split into segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the predicates, all of which must hold.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    fn matches(&self, doc: &Map<String, Value>) -> bool {
        match resolve_path(doc, &self.segments) {
            Some(value) => self.predicates.iter().all(|p| p.evaluate(value)),
            None => false,
        }
    }
}

/// A compiled, immutable filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<FilterEntry>,
}

impl Filter {
    /// Returns the empty filter, which matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Compiles a filter from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the filter is not an object, a path is
    /// empty or has an empty segment, a comparator key is unknown, or an
    /// `in-set` operand is not an array.
    pub fn compile(filter: &Value) -> StorageResult<Self> {
        let map = match filter {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::all()),
            other => {
                return Err(StorageError::validation(format!(
                    "filter must be a JSON object, got {}",
                    json_type(other)
                )))
            }
        };

        let mut entries = Vec::with_capacity(map.len());
        for (path, expected) in map {
            entries.push(compile_entry(path, expected)?);
        }
        Ok(Self { entries })
    }

    /// Returns true if this filter matches every document.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the compiled entries.
    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Returns true if the document satisfies every entry.
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_map(doc.as_map())
    }

    /// Returns true if the JSON object satisfies every entry.
    pub fn matches_map(&self, doc: &Map<String, Value>) -> bool {
        self.entries.iter().all(|entry| entry.matches(doc))
    }

    /// Splits the filter into a part a remote engine evaluates natively and
    /// a residual evaluated locally.
    ///
    /// An entry goes to the native side only if every one of its comparators
    /// is supported. Both halves together are equivalent to `self`.
    pub fn split(&self, supported: impl Fn(Comparator) -> bool) -> (Filter, Filter) {
        let (native, residual): (Vec<FilterEntry>, Vec<FilterEntry>) = self
            .entries
            .iter()
            .cloned()
            .partition(|entry| entry.predicates.iter().all(|p| supported(p.comparator)));
        (Filter { entries: native }, Filter { entries: residual })
    }
}

fn compile_entry(path: &str, expected: &Value) -> StorageResult<FilterEntry> {
    if path.is_empty() {
        return Err(StorageError::validation("filter path must not be empty"));
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(StorageError::validation(format!(
            "filter path {path:?} has an empty segment"
        )));
    }

    let predicates = match expected {
        Value::Object(ops) => compile_comparators(path, ops)?,
        literal => vec![Predicate {
            comparator: Comparator::Equals,
            operand: literal.clone(),
        }],
    };

    Ok(FilterEntry {
        path: path.to_string(),
        segments,
        predicates,
    })
}

fn compile_comparators(path: &str, ops: &Map<String, Value>) -> StorageResult<Vec<Predicate>> {
    if ops.is_empty() {
        return Err(StorageError::validation(format!(
            "comparator object on path {path:?} is empty"
        )));
    }
    let mut predicates = Vec::with_capacity(ops.len());
    for (key, operand) in ops {
        let comparator = Comparator::parse(key).ok_or_else(|| {
            StorageError::validation(format!("unknown comparator {key:?} on path {path:?}"))
        })?;
        if comparator == Comparator::InSet && !operand.is_array() {
            return Err(StorageError::validation(format!(
                "in-set operand on path {path:?} must be an array, got {}",
                json_type(operand)
            )));
        }
        predicates.push(Predicate {
            comparator,
            operand: operand.clone(),
        });
    }
    Ok(predicates)
}

/// Resolves a path by descending through nested objects.
///
/// Returns `None` as soon as a segment is missing or an intermediate value is
/// not an object.
pub fn resolve_path<'a, S: AsRef<str>>(
    doc: &'a Map<String, Value>,
    segments: &[S],
) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let value = doc.get(first.as_ref())?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(inner) => resolve_path(inner, rest),
        _ => None,
    }
}

/// JSON equality with numbers compared by value, so `1 == 1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return Some(a.cmp(&b));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn chicago() -> Document {
        Document::from_value(json!({
            "id": "n1",
            "name": "City",
            "context": {
                "name": "Chicago",
                "population": 2_700_000,
                "state": "IL",
                "_data": {"founded": 1833}
            }
        }))
        .unwrap()
    }

    fn filter(value: Value) -> Filter {
        Filter::compile(&value).unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&chicago()));
        assert!(filter(json!({})).matches(&Document::new()));
        assert!(filter(Value::Null).is_empty());
    }

    #[test]
    fn equality_on_nested_path() {
        assert!(filter(json!({"context.name": "Chicago"})).matches(&chicago()));
        assert!(!filter(json!({"context.name": "Boston"})).matches(&chicago()));
        assert!(filter(json!({"context._data.founded": 1833})).matches(&chicago()));
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        assert!(filter(json!({"context._data.founded": 1833.0})).matches(&chicago()));
    }

    #[test]
    fn greater_and_less_than() {
        let doc = chicago();
        assert!(filter(json!({"context.population": {"greater-than": 1_000_000}})).matches(&doc));
        assert!(!filter(json!({"context.population": {"greater-than": 5_000_000}})).matches(&doc));
        assert!(filter(json!({"context.population": {"$lt": 3_000_000}})).matches(&doc));
        assert!(!filter(json!({
            "context.population": {"greater-than": 1, "less-than": 2_700_000}
        }))
        .matches(&doc));
    }

    #[test]
    fn string_ordering() {
        assert!(filter(json!({"context.name": {"greater-than": "Boston"}})).matches(&chicago()));
        assert!(!filter(json!({"context.name": {"less-than": "Boston"}})).matches(&chicago()));
    }

    #[test]
    fn mixed_types_never_order() {
        assert!(!filter(json!({"context.name": {"greater-than": 5}})).matches(&chicago()));
        assert!(!filter(json!({"context.population": {"less-than": "z"}})).matches(&chicago()));
    }

    #[test]
    fn in_set() {
        assert!(filter(json!({"context.state": {"in-set": ["NY", "IL"]}})).matches(&chicago()));
        assert!(!filter(json!({"context.state": {"$in": ["NY", "CA"]}})).matches(&chicago()));
    }

    #[test]
    fn missing_path_fails_entry() {
        assert!(!filter(json!({"context.mayor": "x"})).matches(&chicago()));
        assert!(!filter(json!({"context.name.first": "C"})).matches(&chicago()));
        assert!(!filter(json!({"nothing.here": {"greater-than": 0}})).matches(&chicago()));
    }

    #[test]
    fn entries_are_anded() {
        let doc = chicago();
        assert!(filter(json!({"name": "City", "context.state": "IL"})).matches(&doc));
        assert!(!filter(json!({"name": "City", "context.state": "NY"})).matches(&doc));
    }

    #[test]
    fn object_equality_goes_through_equals() {
        let doc = Document::from_value(json!({"id": "x", "context": {"loc": {"lat": 1, "lng": 2}}}))
            .unwrap();
        assert!(filter(json!({"context.loc": {"equals": {"lat": 1, "lng": 2}}})).matches(&doc));
        assert!(!filter(json!({"context.loc": {"$eq": {"lat": 1}}})).matches(&doc));
    }

    #[test]
    fn unknown_comparator_fails_at_compile() {
        for bad in [
            json!({"context.population": {"greater_than": 1_000_000}}),
            json!({"context.population": {"between": [1, 2]}}),
            json!({"context.loc": {"lat": 1, "lng": 2}}),
            json!({"context.loc": {}}),
        ] {
            let err = Filter::compile(&bad).unwrap_err();
            assert!(err.is_validation(), "{bad}: {err}");
        }

        let err = Filter::compile(&json!({"context.population": {"$regex": "x"}})).unwrap_err();
        assert!(err.is_validation());

        let err = Filter::compile(&json!({"p": {"greater-than": 1, "near": 2}})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn malformed_filters_rejected() {
        assert!(Filter::compile(&json!([1])).unwrap_err().is_validation());
        assert!(Filter::compile(&json!({"": 1})).unwrap_err().is_validation());
        assert!(Filter::compile(&json!({"a..b": 1})).unwrap_err().is_validation());
        assert!(Filter::compile(&json!({"a": {"in-set": 3}}))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn split_partitions_by_support() {
        let f = filter(json!({
            "name": "City",
            "context.population": {"greater-than": 10},
            "context.state": {"in-set": ["IL"]}
        }));
        let (native, residual) =
            f.split(|c| matches!(c, Comparator::Equals | Comparator::InSet));
        assert_eq!(native.entries().len(), 2);
        assert_eq!(residual.entries().len(), 1);
        assert_eq!(residual.entries()[0].path(), "context.population");

        let doc = chicago();
        assert_eq!(
            f.matches(&doc),
            native.matches(&doc) && residual.matches(&doc)
        );
    }

    #[test]
    fn resolve_path_descends() {
        let doc = chicago();
        assert_eq!(
            resolve_path(doc.as_map(), &["context", "state"]),
            Some(&json!("IL"))
        );
        assert_eq!(resolve_path::<&str>(doc.as_map(), &[]), None);
    }

    proptest! {
        #[test]
        fn equality_filter_matches_own_value(key in "[a-z]{1,8}", n in any::<i64>()) {
            let doc = Document::from_value(json!({"id": "p", "context": {key.clone(): n}})).unwrap();
            let path = format!("context.{key}");
            let equal = filter(json!({path.clone(): n})).matches(&doc);
            let greater = filter(json!({path.clone(): {"greater-than": n}})).matches(&doc);
            let less = filter(json!({path: {"less-than": n}})).matches(&doc);
            prop_assert!(equal);
            prop_assert!(!greater);
            prop_assert!(!less);
        }
    }
}
