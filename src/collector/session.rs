//! Session records.
//!
//! A session is created when a named collector starts and closed when it
//! stops. Starting again under the same name resumes the session: the
//! duplicate is logged and `end_time` is cleared.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::sink::records::{self, SessionRecord, SESSION_COLLECTION, SESSION_KEY};
use crate::store::{DocumentStore, Filter, StoreError, Update};

pub struct SessionLog {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl SessionLog {
    /// Record the session start. Storage problems are logged, never fatal.
    pub fn begin(store: Arc<dyn DocumentStore>, name: &str) -> Self {
        let session = Self {
            store,
            name: name.to_string(),
        };
        if let Err(e) = session.create() {
            tracing::error!(session = %session.name, error = %e, "Failed to record session start");
        }
        session
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> Filter {
        Filter::new().eq("name", self.name.as_str())
    }

    fn create(&self) -> Result<(), StoreError> {
        self.store.create_unique_index(SESSION_COLLECTION, SESSION_KEY)?;

        let record = SessionRecord {
            name: self.name.clone(),
            start_time: Utc::now(),
            end_time: None,
        };
        match self.store.insert(SESSION_COLLECTION, records::to_document(&record)?) {
            Ok(()) => {
                tracing::info!(session = %self.name, "Session started");
                Ok(())
            }
            Err(e) if e.is_duplicate_key() => {
                tracing::info!(session = %self.name, "Session resumed");
                self.store
                    .update_one(SESSION_COLLECTION, &self.key(), &Update::new().unset("end_time"))?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stamp `end_time`. Runs even if the start was never recorded.
    pub fn end(&self) {
        let now = Value::String(Utc::now().to_rfc3339());
        match self
            .store
            .update_one(SESSION_COLLECTION, &self.key(), &Update::new().set("end_time", now))
        {
            Ok(result) if result.matched == 0 => {
                tracing::warn!(session = %self.name, "Session record missing at stop")
            }
            Ok(_) => tracing::info!(session = %self.name, "Session ended"),
            Err(e) => tracing::error!(session = %self.name, error = %e, "Failed to record session end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn stored(store: &MemoryStore, name: &str) -> Vec<SessionRecord> {
        store
            .find(SESSION_COLLECTION, &Filter::new().eq("name", name))
            .unwrap()
            .iter()
            .map(|d| records::from_document(d).unwrap())
            .collect()
    }

    #[test]
    fn test_begin_then_end() {
        let store = Arc::new(MemoryStore::default());
        let session = SessionLog::begin(store.clone(), "s1");
        let running = stored(&store, "s1");
        assert_eq!(running.len(), 1);
        assert!(running[0].end_time.is_none());

        session.end();
        let ended = stored(&store, "s1");
        assert!(ended[0].end_time.is_some());
        assert!(ended[0].end_time >= Some(ended[0].start_time));
    }

    #[test]
    fn test_resume_keeps_one_record() {
        let store = Arc::new(MemoryStore::default());
        SessionLog::begin(store.clone(), "s1").end();
        let first_start = stored(&store, "s1")[0].start_time;

        SessionLog::begin(store.clone(), "s1");
        let resumed = stored(&store, "s1");
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].start_time, first_start);
        assert!(resumed[0].end_time.is_none());
    }
}
