//! Sampled operation event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

/// Which kind of operation produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExplainRead,
    ExplainWrite,
}

/// One sampled database call with its query plan.
///
/// `query` holds the filter serialized as JSON text. The collector adds
/// `session` before fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub function: String,
    pub database: String,
    pub collection: String,
    pub query: String,
    pub explain: Value,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Event {
    /// Wire encoding: one JSON object.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Read an event back from a decoded datagram.
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = Event {
            kind: EventKind::ExplainRead,
            function: "find".to_string(),
            database: "shop".to_string(),
            collection: "orders".to_string(),
            query: r#"{"a":1}"#.to_string(),
            explain: json!({"cursor": "BasicCursor"}),
            source: "app.rs:10".to_string(),
            session: None,
        };

        let wire: Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(wire["type"], "explain_read");
        assert_eq!(wire["query"], r#"{"a":1}"#);
        assert!(wire.get("session").is_none());
    }

    #[test]
    fn test_null_session_reads_as_none() {
        let document = json!({
            "type": "explain_write",
            "function": "update",
            "database": "d",
            "collection": "c",
            "query": "{}",
            "explain": {},
            "session": null
        });
        let event = Event::from_document(document.as_object().unwrap()).unwrap();
        assert_eq!(event.kind, EventKind::ExplainWrite);
        assert_eq!(event.session, None);
        assert_eq!(event.source, "");
    }
}
