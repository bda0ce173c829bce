//! Per-query plan capture.
//!
//! Stores one record per (function, database, collection, session, shape)
//! holding the latest sanitized plan and call site.

use std::sync::Arc;

use serde_json::Value;

use super::records::{QueryProfile, QUERY_PROFILE_COLLECTION, QUERY_PROFILE_KEY};
use super::{Payload, Sink, SinkError};
use crate::shape::{sanitize, skeleton_str};
use crate::store::{DocumentStore, Filter, Update};

pub struct QueryProfileSink {
    store: Arc<dyn DocumentStore>,
}

impl QueryProfileSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self, SinkError> {
        store.create_unique_index(QUERY_PROFILE_COLLECTION, QUERY_PROFILE_KEY)?;
        Ok(Self { store })
    }
}

impl Sink for QueryProfileSink {
    fn name(&self) -> &str {
        "query_profile"
    }

    fn send(&self, payload: &Payload) -> Result<(), SinkError> {
        let event = payload.event()?;
        let record = QueryProfile {
            query: skeleton_str(&event.query)?,
            explain: sanitize(&event.explain),
            function: event.function,
            database: event.database,
            collection: event.collection,
            session: event.session,
            source: event.source,
        };

        let key = Filter::new()
            .eq("function", record.function.as_str())
            .eq("database", record.database.as_str())
            .eq("collection", record.collection.as_str())
            .eq("session", record.session.clone().map_or(Value::Null, Value::String))
            .eq("query", record.query.as_str());
        let changes = Update::new()
            .set("explain", record.explain)
            .set("source", record.source);

        let result = self.store.upsert(QUERY_PROFILE_COLLECTION, &key, &changes)?;
        if result.upserted {
            tracing::debug!(shape = %record.query, collection = %record.collection, "Query profile created");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::desanitize;
    use crate::sink::records;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn payload(function: &str, query: Value, source: &str) -> Payload {
        let document = json!({
            "type": "explain_read",
            "function": function,
            "database": "shop",
            "collection": "orders",
            "query": query.to_string(),
            "explain": {"cursor": "BasicCursor", "millis": 2, "filter": {"$gt": 1}},
            "source": source,
        });
        Payload::decode(document.to_string().as_bytes(), Some("s1"))
    }

    #[test]
    fn test_one_record_per_natural_key() {
        let store = Arc::new(MemoryStore::default());
        let sink = QueryProfileSink::new(store.clone()).unwrap();

        sink.handle(&payload("find", json!({"a": 1}), "app.rs:1")).unwrap();
        sink.handle(&payload("find", json!({"a": 2}), "app.rs:9")).unwrap();
        sink.handle(&payload("update", json!({"a": 2}), "app.rs:3")).unwrap();

        let stored = store.find(QUERY_PROFILE_COLLECTION, &Filter::new()).unwrap();
        assert_eq!(stored.len(), 2);

        let find: QueryProfile = records::from_document(&stored[0]).unwrap();
        assert_eq!(find.function, "find");
        assert_eq!(find.query, "{a}");
        assert_eq!(find.source, "app.rs:9");
        assert_eq!(find.session.as_deref(), Some("s1"));
    }

    #[test]
    fn test_plan_is_stored_sanitized() {
        let store = Arc::new(MemoryStore::default());
        let sink = QueryProfileSink::new(store.clone()).unwrap();
        sink.handle(&payload("find", json!({}), "")).unwrap();

        let stored = store.find(QUERY_PROFILE_COLLECTION, &Filter::new()).unwrap();
        let explain = &stored[0]["explain"];
        assert_eq!(explain["filter"], json!({"_$gt": 1}));
        assert_eq!(desanitize(explain)["filter"], json!({"$gt": 1}));
    }

    #[test]
    fn test_raw_payload_is_a_sink_error() {
        let sink = QueryProfileSink::new(Arc::new(MemoryStore::default())).unwrap();
        assert!(matches!(
            sink.handle(&Payload::Raw(b"garbage".to_vec())),
            Err(SinkError::NotStructured)
        ));
    }
}
