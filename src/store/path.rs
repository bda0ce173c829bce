//! Dotted field paths (`queries.0.count`, `queries.$.count`).

use serde_json::{Map, Value};

use super::{Document, StoreError, StoreResult};

/// The positional segment, replaced by the index of the matched array element.
pub const POSITIONAL: &str = "$";

/// Split a path and substitute the positional segment.
pub fn resolve(path: &str, position: Option<usize>) -> StoreResult<Vec<String>> {
    if path.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    path.split('.')
        .map(|segment| match segment {
            "" => Err(StoreError::InvalidPath(path.to_string())),
            POSITIONAL => position
                .map(|i| i.to_string())
                .ok_or_else(|| StoreError::InvalidPath(format!("{} (no array element matched)", path))),
            other => Ok(other.to_string()),
        })
        .collect()
}

/// Look up a dotted path.
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable slot for a resolved path, creating intermediate objects.
///
/// The final slot is created as `null` when missing.
pub fn slot_mut<'a>(doc: &'a mut Document, segments: &[String]) -> StoreResult<&'a mut Value> {
    let joined = || segments.join(".");
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| StoreError::InvalidPath(String::new()))?;

    let mut current = doc.entry(first.clone()).or_insert(Value::Null);
    for segment in rest {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| StoreError::InvalidPath(joined()))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| StoreError::InvalidPath(joined()))?
            }
            _ => return Err(StoreError::InvalidPath(joined())),
        };
    }
    Ok(current)
}

/// Remove the value at a resolved path. Returns whether anything was removed.
pub fn remove(doc: &mut Document, segments: &[String]) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    if parents.is_empty() {
        return doc.remove(last).is_some();
    }

    let mut current = match doc.get_mut(&parents[0]) {
        Some(v) => v,
        None => return false,
    };
    for segment in &parents[1..] {
        current = match current {
            Value::Object(map) => match map.get_mut(segment) {
                Some(v) => v,
                None => return false,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(v) => v,
                None => return false,
            },
            _ => return false,
        };
    }
    match current {
        Value::Object(map) => map.remove(last).is_some(),
        _ => false,
    }
}
