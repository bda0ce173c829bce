//! Typed update operators.
//!
//! Paths may contain the positional segment `$`, which targets the array
//! element matched by an `elem_eq` clause of the accompanying filter.

use serde_json::{Number, Value};

use super::path;
use super::{Document, StoreError, StoreResult};

/// A field-level modification.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    Set(Value),
    Unset,
    Inc(Number),
    Push(Value),
}

/// An ordered list of modifications applied as one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<(String, Modifier)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((path.into(), Modifier::Set(value.into())));
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push((path.into(), Modifier::Unset));
        self
    }

    pub fn inc(mut self, path: impl Into<String>, delta: impl Into<Number>) -> Self {
        self.ops.push((path.into(), Modifier::Inc(delta.into())));
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((path.into(), Modifier::Push(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, Modifier)] {
        &self.ops
    }

    /// Parse a `{"$set": {...}, "$inc": {...}}` style update document.
    pub fn from_document(update: &Value) -> StoreResult<Self> {
        let map = update.as_object().ok_or_else(|| {
            StoreError::UnsupportedOperator("update must be a document".to_string())
        })?;

        let mut parsed = Self::new();
        for (op, fields) in map {
            let fields = fields.as_object().ok_or_else(|| {
                StoreError::UnsupportedOperator(format!("{} requires a document", op))
            })?;
            for (field, operand) in fields {
                let modifier = match op.as_str() {
                    "$set" => Modifier::Set(operand.clone()),
                    "$unset" => Modifier::Unset,
                    "$inc" => match operand {
                        Value::Number(n) => Modifier::Inc(n.clone()),
                        _ => {
                            return Err(StoreError::TypeMismatch {
                                op: "$inc",
                                path: field.clone(),
                                expected: "numeric",
                            })
                        }
                    },
                    "$push" => Modifier::Push(operand.clone()),
                    other => return Err(StoreError::UnsupportedOperator(other.to_string())),
                };
                parsed.ops.push((field.clone(), modifier));
            }
        }
        Ok(parsed)
    }

    /// Apply every modification in order. Returns whether the document changed.
    pub fn apply(&self, doc: &mut Document, position: Option<usize>) -> StoreResult<bool> {
        let mut modified = false;
        for (field_path, modifier) in &self.ops {
            let segments = path::resolve(field_path, position)?;
            match modifier {
                Modifier::Set(value) => {
                    let slot = path::slot_mut(doc, &segments)?;
                    if *slot != *value {
                        *slot = value.clone();
                        modified = true;
                    }
                }
                Modifier::Unset => {
                    modified |= path::remove(doc, &segments);
                }
                Modifier::Inc(delta) => {
                    let slot = path::slot_mut(doc, &segments)?;
                    *slot = match &*slot {
                        Value::Null => Value::Number(delta.clone()),
                        Value::Number(current) => Value::Number(add(current, delta)),
                        _ => {
                            return Err(StoreError::TypeMismatch {
                                op: "$inc",
                                path: field_path.clone(),
                                expected: "numeric",
                            })
                        }
                    };
                    modified = true;
                }
                Modifier::Push(value) => {
                    let slot = path::slot_mut(doc, &segments)?;
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    match slot {
                        Value::Array(items) => items.push(value.clone()),
                        _ => {
                            return Err(StoreError::TypeMismatch {
                                op: "$push",
                                path: field_path.clone(),
                                expected: "array",
                            })
                        }
                    }
                    modified = true;
                }
            }
        }
        Ok(modified)
    }
}

fn add(current: &Number, delta: &Number) -> Number {
    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Number::from(sum);
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).unwrap_or_else(|| current.clone())
}
