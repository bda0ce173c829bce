//! Traced operation interfaces.
//!
//! A database driver (or the in-memory engine) implements these traits; the
//! interceptors implement them too and wrap the driver's implementation.

use std::panic::Location;

use serde_json::Value;
use thiserror::Error;

use crate::store::{Document, StoreError};

/// Target of a database call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Errors of the traced operation itself. These reach the caller unchanged.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation failed: {0}")]
    Failed(String),
}

/// Why an execution plan could not be produced.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("explain unavailable: {0}")]
    Unavailable(String),

    #[error("operation failed before a plan was chosen: {0}")]
    OperationFailed(String),
}

/// A read call.
#[derive(Debug, Clone, Copy)]
pub struct FindRequest<'a> {
    pub namespace: &'a Namespace,
    pub filter: &'a Value,
    /// Where the application made the call.
    pub caller: &'static Location<'static>,
}

/// A write call.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    pub namespace: &'a Namespace,
    pub filter: &'a Value,
    pub changes: &'a Value,
    pub multi: bool,
    pub caller: &'static Location<'static>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Something that can describe how it was executed.
pub trait Explain {
    fn explain(&self) -> Result<Value, ExplainError>;
}

/// Result handle of a read: documents plus the plan that produced them.
pub trait QueryCursor: Explain + Iterator<Item = Document> + Send {}

impl<T> QueryCursor for T where T: Explain + Iterator<Item = Document> + Send {}

pub trait FindOperation: Send + Sync {
    fn find(&self, request: &FindRequest<'_>) -> Result<Box<dyn QueryCursor>, OperationError>;
}

pub trait UpdateOperation: Send + Sync {
    fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateOutcome, OperationError>;

    /// Plan the write would use, without applying it.
    fn explain_update(&self, request: &UpdateRequest<'_>) -> Result<Value, ExplainError>;
}
