//! Storage-safe key escaping.
//!
//! Document stores reject field names starting with `$`. Execution plans
//! are full of them (`$gt` bounds, `$and` filters), so before a plan is
//! persisted every such key is escaped by prefixing it with `_`, and
//! `desanitize` strips that prefix again when a stored plan is read back.
//!
//! `sanitize` is idempotent: its output never holds a `$`-prefixed key.
//! Round-tripping is exact for any input without `_$`-prefixed keys.

use serde_json::{Map, Value};

/// The reserved operator prefix.
pub const OPERATOR_PREFIX: char = '$';

/// Prefix added in front of escaped keys.
pub const ESCAPE_PREFIX: char = '_';

/// Return a copy of `value` with every `$`-prefixed key escaped.
pub fn sanitize(value: &Value) -> Value {
    rewrite_keys(value, &|key| {
        if key.starts_with(OPERATOR_PREFIX) {
            Some(format!("{}{}", ESCAPE_PREFIX, key))
        } else {
            None
        }
    })
}

/// Undo [`sanitize`].
pub fn desanitize(value: &Value) -> Value {
    rewrite_keys(value, &|key| {
        key.strip_prefix(ESCAPE_PREFIX)
            .filter(|rest| rest.starts_with(OPERATOR_PREFIX))
            .map(str::to_string)
    })
}

fn rewrite_keys(value: &Value, rename: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, sub) in map {
                let key = rename(key).unwrap_or_else(|| key.clone());
                out.insert(key, rewrite_keys(sub, rename));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_keys(v, rename)).collect()),
        other => other.clone(),
    }
}
