//! Index usage aggregation.
//!
//! # Write path
//! ```text
//! 1. insert {session, collection, index, queries: []}
//!        duplicate key → record already exists, continue
//! 2. push {query_shape, count: 0, covered: false, durations: []}
//!        only when no entry of `queries` has this shape
//! 3. on the entry with this shape: count += 1, covered = plan,
//!        durations += millis
//! ```
//!
//! The store has no atomic "upsert into array by key", hence three steps.
//! When two collectors race on a brand-new shape, step 3 of one event may
//! run before step 2 of the other is visible and match nothing. That
//! increment is lost; the next event for the shape lands normally.

use std::sync::Arc;

use serde_json::Value;

use super::plan::PlanSummary;
use super::records::{self, IndexProfile, QueryUsage, INDEX_PROFILE_COLLECTION, INDEX_PROFILE_KEY};
use super::{targets_internal_collection, Payload, Sink, SinkError};
use crate::shape::skeleton_str;
use crate::store::{DocumentStore, Filter, Update};

pub struct IndexProfileSink {
    store: Arc<dyn DocumentStore>,
}

impl IndexProfileSink {
    /// Declares the (session, collection, index) uniqueness constraint.
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self, SinkError> {
        store.create_unique_index(INDEX_PROFILE_COLLECTION, INDEX_PROFILE_KEY)?;
        Ok(Self { store })
    }

    fn ensure_record(&self, profile: &IndexProfile) -> Result<(), SinkError> {
        match self.store.insert(INDEX_PROFILE_COLLECTION, records::to_document(profile)?) {
            Ok(()) => {
                tracing::debug!(collection = %profile.collection, index = %profile.index, "Index profile created");
                Ok(())
            }
            Err(e) if e.is_duplicate_key() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn record_key(profile: &IndexProfile) -> Filter {
    let session = profile.session.clone().map_or(Value::Null, Value::String);
    Filter::new()
        .eq("session", session)
        .eq("collection", profile.collection.as_str())
        .eq("index", profile.index.as_str())
}

impl Sink for IndexProfileSink {
    fn name(&self) -> &str {
        "index_profile"
    }

    /// Also drops events whose plan could not be captured.
    fn filter(&self, payload: &Payload) -> Result<bool, SinkError> {
        if targets_internal_collection(payload)? {
            return Ok(true);
        }
        Ok(payload.field("explain")?.get("error").is_some())
    }

    fn send(&self, payload: &Payload) -> Result<(), SinkError> {
        let event = payload.event()?;
        let shape = skeleton_str(&event.query)?;
        let plan = PlanSummary::from_explain(&event.explain)?;

        let profile = IndexProfile {
            session: event.session,
            collection: event.collection,
            index: plan.index,
            queries: Vec::new(),
        };
        self.ensure_record(&profile)?;

        let key = record_key(&profile);
        let usage = Value::Object(records::to_document(&QueryUsage::empty(&shape))?);
        self.store.update_one(
            INDEX_PROFILE_COLLECTION,
            &key.clone().no_elem_eq("queries", "query_shape", shape.as_str()),
            &Update::new().push("queries", usage),
        )?;

        let result = self.store.update_one(
            INDEX_PROFILE_COLLECTION,
            &key.elem_eq("queries", "query_shape", shape.as_str()),
            &Update::new()
                .inc("queries.$.count", 1)
                .set("queries.$.covered", plan.covered)
                .push("queries.$.durations", plan.millis),
        )?;
        if result.matched == 0 {
            tracing::debug!(shape = %shape, index = %profile.index, "Query shape not visible yet, increment skipped");
        }
        Ok(())
    }
}
