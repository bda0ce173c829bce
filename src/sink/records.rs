//! Stored record schemas.
//!
//! These layouts are the contract with report tooling; field names are
//! part of the stored format.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

pub const SESSION_COLLECTION: &str = "session";
pub const INDEX_PROFILE_COLLECTION: &str = "index_profile";
pub const QUERY_PROFILE_COLLECTION: &str = "query_profile";

pub const SESSION_KEY: &[&str] = &["name"];
pub const INDEX_PROFILE_KEY: &[&str] = &["session", "collection", "index"];
pub const QUERY_PROFILE_KEY: &[&str] = &["function", "database", "collection", "session", "query"];

/// A named profiling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Usage of one index by one query shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryUsage {
    pub query_shape: String,
    pub count: u64,
    pub covered: bool,
    pub durations: Vec<u64>,
}

impl QueryUsage {
    /// Entry pushed the first time a shape is seen; counters start at zero.
    pub fn empty(query_shape: &str) -> Self {
        Self {
            query_shape: query_shape.to_string(),
            count: 0,
            covered: false,
            durations: Vec::new(),
        }
    }
}

/// Aggregated usage per (session, collection, index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexProfile {
    pub session: Option<String>,
    pub collection: String,
    pub index: String,
    #[serde(default)]
    pub queries: Vec<QueryUsage>,
}

/// One distinct query as observed, with its plan and call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryProfile {
    pub function: String,
    pub database: String,
    pub collection: String,
    pub session: Option<String>,
    /// Canonical query shape.
    pub query: String,
    /// Sanitized execution plan.
    pub explain: Value,
    pub source: String,
}

/// Serialize a record into a store document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(document) => Ok(document),
        other => Err(serde::ser::Error::custom(format!(
            "record serialized to a non-object: {}",
            other
        ))),
    }
}

/// Read a record back; unknown fields such as `_id` are ignored.
pub fn from_document<T: DeserializeOwned>(document: &Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(document.clone()))
}
