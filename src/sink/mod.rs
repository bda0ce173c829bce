//! Event consumers.
//!
//! # Data Flow
//! ```text
//! Collector fan-out
//!     → Payload (structured document with session, or raw bytes)
//!     → Sink::handle → filter (true = drop) → send
//!         index_profile.rs: skeleton + plan summary → three-step aggregation
//!         query_profile.rs: skeleton + sanitized plan → upsert by natural key
//!     → DocumentStore
//! ```
//!
//! # Design Decisions
//! - Sinks are synchronous; the collector runs them off the async reactor
//! - A payload missing an expected field is a sink error, never a panic,
//!   so the collector can log it and move on
//! - Sinks never hold in-process locks around store writes; several
//!   collectors may write the same records concurrently

pub mod index_profile;
pub mod plan;
pub mod query_profile;
pub mod records;

use serde_json::Value;
use thiserror::Error;

use crate::shape::SkeletonError;
use crate::store::{Document, StoreError};
use crate::transport::Event;

pub use index_profile::IndexProfileSink;
pub use plan::PlanSummary;
pub use query_profile::QueryProfileSink;
pub use records::{IndexProfile, QueryProfile, QueryUsage, SessionRecord};

/// Collections whose names start with this prefix are server internals.
pub const INTERNAL_COLLECTION_PREFIX: &str = "system.";

/// Errors raised by a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("payload has no '{0}' field")]
    MissingField(String),

    #[error("payload is not a structured document")]
    NotStructured,

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Shape(#[from] SkeletonError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A received datagram as handed to sinks.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed JSON object, tagged with the collector's session.
    Document(Document),
    /// Bytes that did not parse as a JSON object, passed through untouched.
    Raw(Vec<u8>),
}

impl Payload {
    /// Parse a datagram. Objects get `session` set (null without a session).
    pub fn decode(bytes: &[u8], session: Option<&str>) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(mut document)) => {
                let tag = session.map_or(Value::Null, |name| Value::String(name.to_string()));
                document.insert("session".to_string(), tag);
                Payload::Document(document)
            }
            _ => Payload::Raw(bytes.to_vec()),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Payload::Document(_))
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Payload::Document(document) => Some(document),
            Payload::Raw(_) => None,
        }
    }

    pub fn field(&self, key: &str) -> Result<&Value, SinkError> {
        self.as_document()
            .ok_or(SinkError::NotStructured)?
            .get(key)
            .ok_or_else(|| SinkError::MissingField(key.to_string()))
    }

    pub fn str_field(&self, key: &str) -> Result<&str, SinkError> {
        self.field(key)?
            .as_str()
            .ok_or_else(|| SinkError::MalformedEvent(format!("'{}' is not a string", key)))
    }

    /// Decode the payload as a full event.
    pub fn event(&self) -> Result<Event, SinkError> {
        let document = self.as_document().ok_or(SinkError::NotStructured)?;
        Event::from_document(document).map_err(|e| SinkError::MalformedEvent(e.to_string()))
    }

    /// Short printable form for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match self {
            Payload::Document(document) => Value::Object(document.clone()).to_string(),
            Payload::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        };
        if text.chars().count() <= max_chars {
            text
        } else {
            let cut: String = text.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

/// True when the payload targets an internal collection.
pub fn targets_internal_collection(payload: &Payload) -> Result<bool, SinkError> {
    Ok(payload
        .str_field("collection")?
        .starts_with(INTERNAL_COLLECTION_PREFIX))
}

/// An independent consumer of collected events.
pub trait Sink: Send + Sync {
    /// Identity used in logs and metrics.
    fn name(&self) -> &str;

    /// Returns true to drop the payload.
    fn filter(&self, payload: &Payload) -> Result<bool, SinkError> {
        targets_internal_collection(payload)
    }

    fn handle(&self, payload: &Payload) -> Result<(), SinkError> {
        if !self.filter(payload)? {
            self.send(payload)?;
        }
        Ok(())
    }

    fn send(&self, payload: &Payload) -> Result<(), SinkError>;
}
