//! Sampling wrappers around the traced operations.
//!
//! Every wrapper delegates first and samples afterwards, so the caller gets
//! exactly what the wrapped operation returned. Anything that goes wrong
//! while sampling (explain, call-site scan, push, even a panic) is caught
//! here and at most logged.

use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;

use serde_json::{json, Value};

use super::callsite;
use super::operation::{
    ExplainError, FindOperation, FindRequest, Namespace, OperationError, QueryCursor, UpdateOperation,
    UpdateOutcome, UpdateRequest,
};
use super::sampler::SamplingPolicy;
use crate::observability::metrics;
use crate::transport::{Event, EventKind, Transport};

/// Shared sampling machinery of one installation.
pub(crate) struct Probe {
    policy: Arc<SamplingPolicy>,
    transport: Arc<dyn Transport>,
}

/// What was called.
struct Call<'a> {
    kind: EventKind,
    function: &'static str,
    namespace: &'a Namespace,
    filter: &'a Value,
    caller: &'static Location<'static>,
}

impl Probe {
    pub(crate) fn new(policy: Arc<SamplingPolicy>, transport: Arc<dyn Transport>) -> Self {
        Self { policy, transport }
    }

    fn observe<F>(&self, call: Call<'_>, explain: F)
    where
        F: FnOnce() -> Result<Value, ExplainError>,
    {
        if !self.policy.should_sample() {
            return;
        }
        let function = call.function;
        if panic::catch_unwind(AssertUnwindSafe(|| self.emit(call, explain))).is_err() {
            tracing::warn!(function, "Sampling panicked, traced call unaffected");
        }
    }

    fn emit<F>(&self, call: Call<'_>, explain: F)
    where
        F: FnOnce() -> Result<Value, ExplainError>,
    {
        let explain = explain().unwrap_or_else(|e| {
            tracing::warn!(function = call.function, namespace = %call.namespace, error = %e, "Explain failed");
            json!({ "error": e.to_string() })
        });
        let settings = self.policy.settings();

        let event = Event {
            kind: call.kind,
            function: call.function.to_string(),
            database: call.namespace.database.clone(),
            collection: call.namespace.collection.clone(),
            query: call.filter.to_string(),
            explain,
            source: callsite::resolve(call.caller, &settings.ignored_modules),
            session: None,
        };

        match self.transport.push(&event) {
            Ok(()) => metrics::record_sampled(call.function),
            Err(e) => {
                tracing::debug!(function = call.function, error = %e, "Dropped sampled event");
                metrics::record_push_failure();
            }
        }
    }
}

pub(crate) struct SampledFind {
    pub(crate) inner: Arc<dyn FindOperation>,
    pub(crate) probe: Arc<Probe>,
}

impl FindOperation for SampledFind {
    fn find(&self, request: &FindRequest<'_>) -> Result<Box<dyn QueryCursor>, OperationError> {
        let result = self.inner.find(request);

        let call = Call {
            kind: EventKind::ExplainRead,
            function: "find",
            namespace: request.namespace,
            filter: request.filter,
            caller: request.caller,
        };
        self.probe.observe(call, || match &result {
            Ok(cursor) => cursor.explain(),
            Err(e) => Err(ExplainError::OperationFailed(e.to_string())),
        });

        result
    }
}

pub(crate) struct SampledUpdate {
    pub(crate) inner: Arc<dyn UpdateOperation>,
    pub(crate) probe: Arc<Probe>,
}

impl UpdateOperation for SampledUpdate {
    fn update(&self, request: &UpdateRequest<'_>) -> Result<UpdateOutcome, OperationError> {
        let result = self.inner.update(request);

        let call = Call {
            kind: EventKind::ExplainWrite,
            function: "update",
            namespace: request.namespace,
            filter: request.filter,
            caller: request.caller,
        };
        self.probe.observe(call, || self.inner.explain_update(request));

        result
    }

    fn explain_update(&self, request: &UpdateRequest<'_>) -> Result<Value, ExplainError> {
        self.inner.explain_update(request)
    }
}
