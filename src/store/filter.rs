//! Typed query filters.
//!
//! # Responsibilities
//! - Express the conditions the sinks and the query engine need
//! - Parse MongoDB-style JSON filters (`{"sold": {"$gt": 100}}`)
//! - Report which array element matched, for positional updates
//!
//! # Design Decisions
//! - Clauses combine with AND semantics
//! - Equality against an array field matches any element (MongoDB semantics)
//! - Ordering comparisons only between numbers, strings, or booleans

use std::cmp::Ordering;

use serde_json::Value;

use super::path;
use super::{Document, StoreError, StoreResult};

/// A single condition applied to one field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Exists(bool),
    /// The field is an array with an object element whose `field` equals `value`.
    ElemEq { field: String, value: Value },
    /// No object element of the array has `field` equal to `value`.
    NoElemEq { field: String, value: Value },
}

/// Outcome of a successful match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Match {
    /// Index of the element matched by the first `ElemEq` clause.
    pub position: Option<usize>,
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    /// An empty filter (matches every document).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push((path.into(), condition));
        self
    }

    pub fn eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Condition::Eq(value.into()))
    }

    pub fn ne(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Condition::Ne(value.into()))
    }

    pub fn exists(self, path: impl Into<String>, present: bool) -> Self {
        self.with(path, Condition::Exists(present))
    }

    pub fn elem_eq(
        self,
        array: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.with(
            array,
            Condition::ElemEq {
                field: field.into(),
                value: value.into(),
            },
        )
    }

    pub fn no_elem_eq(
        self,
        array: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.with(
            array,
            Condition::NoElemEq {
                field: field.into(),
                value: value.into(),
            },
        )
    }

    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    /// Top-level field names referenced by the filter, in clause order.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for (path, _) in &self.clauses {
            let head = path.split('.').next().unwrap_or(path);
            if !fields.contains(&head) {
                fields.push(head);
            }
        }
        fields
    }

    /// Equality clauses, used to seed a document on upsert.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().filter_map(|(path, cond)| match cond {
            Condition::Eq(v) => Some((path.as_str(), v)),
            _ => None,
        })
    }

    /// Parse a JSON query document.
    pub fn from_query(query: &Value) -> StoreResult<Self> {
        let map = match query {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::new()),
            other => {
                return Err(StoreError::UnsupportedOperator(format!(
                    "filter must be a document, got {}",
                    other
                )))
            }
        };

        let mut filter = Self::new();
        for (field, value) in map {
            if field.starts_with('$') {
                return Err(StoreError::UnsupportedOperator(field.clone()));
            }
            match value {
                Value::Object(ops) if is_operator_document(ops) => {
                    for (op, operand) in ops {
                        filter = filter.with(field.clone(), parse_operator(op, operand)?);
                    }
                }
                other => filter = filter.eq(field.clone(), other.clone()),
            }
        }
        Ok(filter)
    }

    /// Test a document, returning the match details on success.
    pub fn matches(&self, doc: &Document) -> Option<Match> {
        let mut outcome = Match::default();
        for (field_path, condition) in &self.clauses {
            let actual = path::get(doc, field_path);
            match condition {
                Condition::ElemEq { field, value } => {
                    let index = element_position(actual, field, value)?;
                    outcome.position.get_or_insert(index);
                }
                Condition::NoElemEq { field, value } => {
                    if element_position(actual, field, value).is_some() {
                        return None;
                    }
                }
                other => {
                    if !test_condition(actual, other) {
                        return None;
                    }
                }
            }
        }
        Some(outcome)
    }
}

const OPERATORS: &[&str] = &["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$exists"];

fn is_operator_document(map: &serde_json::Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| OPERATORS.contains(&k.as_str()))
}

fn parse_operator(op: &str, operand: &Value) -> StoreResult<Condition> {
    Ok(match op {
        "$eq" => Condition::Eq(operand.clone()),
        "$ne" => Condition::Ne(operand.clone()),
        "$gt" => Condition::Gt(operand.clone()),
        "$gte" => Condition::Gte(operand.clone()),
        "$lt" => Condition::Lt(operand.clone()),
        "$lte" => Condition::Lte(operand.clone()),
        "$in" => match operand {
            Value::Array(items) => Condition::In(items.clone()),
            _ => return Err(StoreError::UnsupportedOperator("$in requires an array".into())),
        },
        "$exists" => Condition::Exists(truthy(operand)),
        other => return Err(StoreError::UnsupportedOperator(other.to_string())),
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    }
}

fn element_position(actual: Option<&Value>, field: &str, value: &Value) -> Option<usize> {
    match actual {
        Some(Value::Array(items)) => items.iter().position(|item| {
            item.as_object()
                .and_then(|obj| obj.get(field))
                .map(|v| v == value)
                .unwrap_or(false)
        }),
        _ => None,
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn ordered(actual: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare(item, bound).map(accept).unwrap_or(false)),
        Some(v) => compare(v, bound).map(accept).unwrap_or(false),
        None => false,
    }
}

fn test_condition(actual: Option<&Value>, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(v) => equals(actual, v),
        Condition::Ne(v) => !equals(actual, v),
        Condition::Gt(v) => ordered(actual, v, |o| o == Ordering::Greater),
        Condition::Gte(v) => ordered(actual, v, |o| o != Ordering::Less),
        Condition::Lt(v) => ordered(actual, v, |o| o == Ordering::Less),
        Condition::Lte(v) => ordered(actual, v, |o| o != Ordering::Greater),
        Condition::In(options) => options.iter().any(|v| equals(actual, v)),
        Condition::Exists(present) => actual.is_some() == *present,
        Condition::ElemEq { .. } | Condition::NoElemEq { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_equality_and_missing() {
        let d = doc(json!({"name": "bob", "tags": ["a", "b"]}));
        assert!(Filter::new().eq("name", "bob").matches(&d).is_some());
        assert!(Filter::new().eq("tags", "b").matches(&d).is_some());
        assert!(Filter::new().eq("age", Value::Null).matches(&d).is_some());
        assert!(Filter::new().eq("name", "alice").matches(&d).is_none());
    }

    #[test]
    fn test_from_query_operators() {
        let f = Filter::from_query(&json!({"sold": {"$gt": 100, "$lte": 200}, "store": "s0"})).unwrap();
        assert!(f.matches(&doc(json!({"sold": 150, "store": "s0"}))).is_some());
        assert!(f.matches(&doc(json!({"sold": 100, "store": "s0"}))).is_none());
        assert!(f.matches(&doc(json!({"sold": 150, "store": "s1"}))).is_none());
        assert_eq!(f.fields(), vec!["sold", "store"]);
    }

    #[test]
    fn test_from_query_rejects_unknown() {
        assert!(Filter::from_query(&json!({"$where": "1"})).is_err());
        assert!(Filter::from_query(&json!({"a": {"$in": 3}})).is_err());
    }

    #[test]
    fn test_wrapper_values_are_equality() {
        let f = Filter::from_query(&json!({"_id": {"$oid": "abc"}})).unwrap();
        assert_eq!(f.clauses()[0].1, Condition::Eq(json!({"$oid": "abc"})));
    }

    #[test]
    fn test_elem_match_position() {
        let d = doc(json!({"queries": [{"query_shape": "{a}"}, {"query_shape": "{b}"}]}));
        let m = Filter::new().elem_eq("queries", "query_shape", "{b}").matches(&d).unwrap();
        assert_eq!(m.position, Some(1));
        assert!(Filter::new().no_elem_eq("queries", "query_shape", "{b}").matches(&d).is_none());
        assert!(Filter::new().no_elem_eq("queries", "query_shape", "{c}").matches(&d).is_some());
        assert!(Filter::new().no_elem_eq("absent", "query_shape", "{c}").matches(&d).is_some());
    }
}
