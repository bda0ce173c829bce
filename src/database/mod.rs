//! Traced database handles.
//!
//! Application code talks to [`Collection`]; every call goes through the
//! connection's [`Operations`] slots, so installing instrumentation affects
//! all handles at once. The handles record their caller with
//! `#[track_caller]` for call-site attribution.

pub mod memory;

use std::panic::Location;
use std::sync::Arc;

use serde_json::Value;

use crate::instrument::{
    FindRequest, Namespace, OperationError, Operations, QueryCursor, UpdateOutcome, UpdateRequest,
};
use crate::store::Document;

pub use memory::{IndexSpec, MemoryCursor, MemoryDatabase};

/// A named database on a connection.
#[derive(Clone)]
pub struct Database {
    name: String,
    operations: Arc<Operations>,
}

impl Database {
    pub fn new(name: impl Into<String>, operations: Arc<Operations>) -> Self {
        Self {
            name: name.into(),
            operations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            namespace: Namespace::new(self.name.clone(), name),
            operations: self.operations.clone(),
        }
    }
}

/// Handle to one collection.
#[derive(Clone)]
pub struct Collection {
    namespace: Namespace,
    operations: Arc<Operations>,
}

impl Collection {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    #[track_caller]
    pub fn find(&self, filter: &Value) -> Result<Box<dyn QueryCursor>, OperationError> {
        let request = FindRequest {
            namespace: &self.namespace,
            filter,
            caller: Location::caller(),
        };
        self.operations.find().find(&request)
    }

    #[track_caller]
    pub fn find_one(&self, filter: &Value) -> Result<Option<Document>, OperationError> {
        let mut cursor = self.find(filter)?;
        Ok(cursor.next())
    }

    #[track_caller]
    pub fn update_one(&self, filter: &Value, changes: &Value) -> Result<UpdateOutcome, OperationError> {
        self.update(filter, changes, false)
    }

    #[track_caller]
    pub fn update_many(&self, filter: &Value, changes: &Value) -> Result<UpdateOutcome, OperationError> {
        self.update(filter, changes, true)
    }

    #[track_caller]
    fn update(&self, filter: &Value, changes: &Value, multi: bool) -> Result<UpdateOutcome, OperationError> {
        let request = UpdateRequest {
            namespace: &self.namespace,
            filter,
            changes,
            multi,
            caller: Location::caller(),
        };
        self.operations.update().update(&request)
    }
}
