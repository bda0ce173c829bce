//! Structural fingerprint ("skeleton") of a query filter.
//!
//! A skeleton lists the keys present in a document but none of its values,
//! so `{"name": "bob"}` and `{"name": "alice"}` share the skeleton `{name}`.
//! Keys are always emitted in lexicographic order.
//!
//! Filters arrive as MongoDB extended JSON. Type wrappers such as
//! `{"$oid": "..."}` or `{"$date": 0}` are leaves, exactly like a plain
//! string or number. Wrappers for types that cannot be fingerprinted are
//! rejected instead of being silently dropped.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while computing a skeleton.
#[derive(Debug, Error)]
pub enum SkeletonError {
    /// The document holds a value whose type has no shape semantics.
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),

    /// The serialized query could not be parsed.
    #[error("query is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Extended JSON leaf wrappers: the marker key plus the keys allowed beside it.
const LEAF_WRAPPERS: &[(&str, &[&str])] = &[
    ("$oid", &[]),
    ("$date", &[]),
    ("$binary", &["$type"]),
    ("$regex", &["$options"]),
    ("$code", &["$scope"]),
    ("$ref", &["$id", "$db"]),
    ("$timestamp", &[]),
    ("$numberLong", &[]),
    ("$numberInt", &[]),
    ("$numberDouble", &[]),
];

/// Extended JSON wrappers for types a skeleton cannot represent.
const UNSUPPORTED_WRAPPERS: &[&str] = &[
    "$minKey",
    "$maxKey",
    "$undefined",
    "$symbol",
    "$dbPointer",
    "$numberDecimal",
];

/// Compute the skeleton of a document.
///
/// A top-level leaf has an empty skeleton.
pub fn skeleton(document: &Value) -> Result<String, SkeletonError> {
    Ok(shape_of(document)?.unwrap_or_default())
}

/// Parse a serialized filter and compute its skeleton.
pub fn skeleton_str(query: &str) -> Result<String, SkeletonError> {
    let document: Value = serde_json::from_str(query)?;
    skeleton(&document)
}

/// `None` means "leaf": the value contributes no text of its own.
fn shape_of(value: &Value) -> Result<Option<String>, SkeletonError> {
    match value {
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                if let Some(sub) = shape_of(item)? {
                    parts.push(sub);
                }
            }
            Ok(Some(format!("[{}]", parts.join(","))))
        }
        Value::Object(map) => {
            if is_leaf_wrapper(map)? {
                return Ok(None);
            }

            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut parts = Vec::with_capacity(keys.len());
            for key in keys {
                match shape_of(&map[key.as_str()])? {
                    Some(sub) => parts.push(format!("{}:{}", key, sub)),
                    None => parts.push(key.clone()),
                }
            }
            Ok(Some(format!("{{{}}}", parts.join(","))))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(None),
    }
}

fn is_leaf_wrapper(map: &Map<String, Value>) -> Result<bool, SkeletonError> {
    for marker in UNSUPPORTED_WRAPPERS {
        if map.len() == 1 && map.contains_key(*marker) {
            return Err(SkeletonError::UnsupportedValueType(marker.to_string()));
        }
    }

    Ok(LEAF_WRAPPERS.iter().any(|(marker, companions)| {
        map.contains_key(*marker)
            && map
                .keys()
                .all(|k| k == marker || companions.contains(&k.as_str()))
    }))
}
