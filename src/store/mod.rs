//! Storage boundary.
//!
//! # Data Flow
//! ```text
//! Sinks / session bookkeeping / query engine
//!     → filter.rs + update.rs (typed operations)
//!     → DocumentStore trait
//!     → memory.rs (in-process implementation, JSON snapshot on disk)
//! ```
//!
//! # Design Decisions
//! - Callers never assume exclusive ownership of a record; they express
//!   intent through insert / upsert / conditional update only
//! - Uniqueness conflicts are a distinct error variant so callers can
//!   treat "already exists" as success where that is the intent
//! - Each operation is atomic per collection; there are no transactions

pub mod filter;
pub mod memory;
pub mod path;
pub mod update;

use serde_json::{Map, Value};
use thiserror::Error;

pub use filter::{Condition, Filter, Match};
pub use memory::MemoryStore;
pub use update::{Modifier, Update};

/// A stored document.
pub type Document = Map<String, Value>;

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key tuple is already taken.
    #[error("duplicate key in '{collection}': {key}")]
    DuplicateKey { collection: String, key: String },

    /// A field path is malformed or cannot be traversed.
    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    /// An operator was applied to a field of the wrong type.
    #[error("cannot apply {op} to non-{expected} field '{path}'")]
    TypeMismatch {
        op: &'static str,
        path: String,
        expected: &'static str,
    },

    /// The filter or update uses an operator this store does not implement.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for uniqueness conflicts.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an update or upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// True when an upsert inserted a new document.
    pub upserted: bool,
}

/// A generic document store.
pub trait DocumentStore: Send + Sync {
    /// Declare a unique key tuple for a collection.
    fn create_unique_index(&self, collection: &str, keys: &[&str]) -> StoreResult<()>;

    /// Insert a document, assigning an `_id` when absent.
    fn insert(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Update the first matching document.
    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult>;

    /// Update every matching document.
    fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult>;

    /// Update the first matching document, or insert one seeded from the
    /// filter's equality clauses.
    fn upsert(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<UpdateResult>;

    /// All matching documents, in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        Ok(self.find(collection, filter)?.len())
    }
}
