//! Query sampling instrumentation.
//!
//! # Data Flow
//! ```text
//! database::Collection::find / update   (#[track_caller])
//!     → Operations dispatch slot (dispatch.rs)
//!     → SampledFind / SampledUpdate (interceptor.rs)
//!         1. delegate to the wrapped operation
//!         2. SamplingPolicy::should_sample (sampler.rs)
//!         3. explain + call site (callsite.rs) → Event
//!         4. Transport::push, failures swallowed
//!     → result returned unchanged
//! ```
//!
//! # Design Decisions
//! - Dynamic dispatch through swappable slots instead of patching code
//! - Install and uninstall take the family lock; traced calls never do
//! - Frequency and ignored modules follow SharedConfig through a subscription
//!   registered on install and removed on uninstall

pub mod callsite;
pub mod dispatch;
pub mod interceptor;
pub mod operation;
pub mod sampler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{SharedConfig, SubscriptionId};
use crate::transport::Transport;

pub use dispatch::{Dispatch, Operations};
pub use operation::{
    Explain, ExplainError, FindOperation, FindRequest, Namespace, OperationError, QueryCursor,
    UpdateOperation, UpdateOutcome, UpdateRequest,
};
pub use sampler::{SamplingPolicy, SamplingSettings};

use interceptor::{Probe, SampledFind, SampledUpdate};

const NO_SUBSCRIPTION: u64 = 0;

/// Installs and removes the sampling wrappers on an operation family.
pub struct Instrumentation {
    operations: Arc<Operations>,
    config: Arc<SharedConfig>,
    transport: Arc<dyn Transport>,
    /// Only read or written while holding the family lock.
    subscription: AtomicU64,
}

impl Instrumentation {
    pub fn new(operations: Arc<Operations>, config: Arc<SharedConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            operations,
            config,
            transport,
            subscription: AtomicU64::new(NO_SUBSCRIPTION),
        }
    }

    /// Wrap every operation of the family. Returns false if already installed.
    pub fn install(&self) -> bool {
        let _guard = self.operations.lock_install();
        if self.operations.is_instrumented() {
            return false;
        }

        // Subscribe before reading the snapshot so no replacement in between is missed.
        let policy = Arc::new(SamplingPolicy::new(&self.config.current().instrument));
        let observed = policy.clone();
        let id = self.config.subscribe(move |config| observed.reconfigure(&config.instrument));
        self.subscription.store(id.0, Ordering::SeqCst);
        policy.reconfigure(&self.config.current().instrument);

        let probe = Arc::new(Probe::new(policy, self.transport.clone()));

        self.operations.find.wrap(|inner| {
            Arc::new(SampledFind {
                inner,
                probe: probe.clone(),
            })
        });
        self.operations.update.wrap(|inner| Arc::new(SampledUpdate { inner, probe }));

        tracing::info!(
            frequency = self.config.current().instrument.sample_frequency,
            "Instrumentation installed"
        );
        true
    }

    /// Restore the original operations. Returns false if nothing was installed.
    pub fn uninstall(&self) -> bool {
        let _guard = self.operations.lock_install();
        let find = self.operations.find.restore();
        let update = self.operations.update.restore();

        let id = self.subscription.swap(NO_SUBSCRIPTION, Ordering::SeqCst);
        if id != NO_SUBSCRIPTION {
            self.config.unsubscribe(SubscriptionId(id));
        }

        let removed = find || update;
        if removed {
            tracing::info!("Instrumentation uninstalled");
        }
        removed
    }

    pub fn is_installed(&self) -> bool {
        self.operations.is_instrumented()
    }

    /// Install for the lifetime of the returned guard. A guard only
    /// uninstalls what it installed itself.
    pub fn instrument(&self) -> InstrumentGuard<'_> {
        InstrumentGuard {
            owner: self,
            installed: self.install(),
        }
    }
}

/// Scoped installation, see [`Instrumentation::instrument`].
pub struct InstrumentGuard<'a> {
    owner: &'a Instrumentation,
    installed: bool,
}

impl Drop for InstrumentGuard<'_> {
    fn drop(&mut self) {
        if self.installed {
            self.owner.uninstall();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrumsConfig;
    use crate::database::{Database, MemoryDatabase};
    use crate::store::MemoryStore;
    use crate::transport::{Event, EventKind, TransportError};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Capture(Mutex<Vec<Event>>);

    impl Transport for Capture {
        fn push(&self, event: &Event) -> Result<(), TransportError> {
            self.0.lock().push(event.clone());
            Ok(())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn push(&self, _event: &Event) -> Result<(), TransportError> {
            Err(TransportError::Send(std::io::Error::other("unreachable")))
        }
    }

    /// Cursor whose plan can never be produced.
    struct Opaque;

    impl Iterator for Opaque {
        type Item = crate::store::Document;
        fn next(&mut self) -> Option<Self::Item> {
            None
        }
    }

    impl Explain for Opaque {
        fn explain(&self) -> Result<Value, ExplainError> {
            Err(ExplainError::Unavailable("cursor exhausted".to_string()))
        }
    }

    struct OpaqueEngine;

    impl FindOperation for OpaqueEngine {
        fn find(&self, _request: &FindRequest<'_>) -> Result<Box<dyn QueryCursor>, OperationError> {
            Ok(Box::new(Opaque))
        }
    }

    impl UpdateOperation for OpaqueEngine {
        fn update(&self, _request: &UpdateRequest<'_>) -> Result<UpdateOutcome, OperationError> {
            Err(OperationError::Failed("read only".to_string()))
        }

        fn explain_update(&self, _request: &UpdateRequest<'_>) -> Result<Value, ExplainError> {
            Err(ExplainError::Unavailable("read only".to_string()))
        }
    }

    struct Fixture {
        instrumentation: Instrumentation,
        config: Arc<SharedConfig>,
        capture: Arc<Capture>,
        db: Database,
    }

    fn fixture(frequency: f64, operations: Operations) -> Fixture {
        let mut initial = DrumsConfig::default();
        initial.instrument.sample_frequency = frequency;
        let config = Arc::new(SharedConfig::new(initial));
        let capture = Arc::new(Capture::default());
        let operations = Arc::new(operations);
        Fixture {
            instrumentation: Instrumentation::new(operations.clone(), config.clone(), capture.clone()),
            config,
            capture,
            db: Database::new("shop", operations),
        }
    }

    fn memory_operations() -> Operations {
        let engine = Arc::new(MemoryDatabase::new(Arc::new(MemoryStore::default())));
        engine.insert(&Namespace::new("shop", "orders"), json!({"a": 1})).unwrap();
        Operations::from_engine(engine)
    }

    #[test]
    fn test_install_is_idempotent() {
        let f = fixture(1.0, memory_operations());
        assert!(f.instrumentation.install());
        assert!(!f.instrumentation.install());
        assert!(f.instrumentation.is_installed());
        assert_eq!(f.config.observer_count(), 1);

        f.db.collection("orders").find(&json!({"a": 1})).unwrap();
        assert_eq!(f.capture.0.lock().len(), 1);

        assert!(f.instrumentation.uninstall());
        assert!(!f.instrumentation.uninstall());
        assert_eq!(f.config.observer_count(), 0);

        f.db.collection("orders").find(&json!({"a": 1})).unwrap();
        assert_eq!(f.capture.0.lock().len(), 1);
    }

    #[test]
    fn test_frequency_zero_sends_nothing() {
        let f = fixture(0.0, memory_operations());
        let _guard = f.instrumentation.instrument();
        let orders = f.db.collection("orders");
        for _ in 0..50 {
            orders.find(&json!({"a": 1})).unwrap();
            orders.update_one(&json!({"a": 1}), &json!({"$set": {"b": 2}})).unwrap();
            assert!(orders.find(&json!({"$where": "x"})).is_err());
        }
        assert!(f.capture.0.lock().is_empty());
    }

    #[test]
    fn test_frequency_one_sends_one_event_per_call() {
        let f = fixture(1.0, memory_operations());
        let _guard = f.instrumentation.instrument();
        let orders = f.db.collection("orders");

        orders.find(&json!({"a": 1})).unwrap();
        orders.update_one(&json!({"a": 1}), &json!({"$inc": {"a": 1}})).unwrap();
        assert!(orders.find(&json!({"$where": "x"})).is_err());
        assert!(orders.update_one(&json!({}), &json!({"replacement": true})).is_err());

        let events = f.capture.0.lock();
        let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.function.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::ExplainRead, "find"),
                (EventKind::ExplainWrite, "update"),
                (EventKind::ExplainRead, "find"),
                (EventKind::ExplainWrite, "update"),
            ]
        );
        assert!(events.iter().all(|e| e.session.is_none()));
        assert_eq!(events[0].query, r#"{"a":1}"#);
        assert_eq!(events[0].explain["cursor"], "BasicCursor");
        assert!(events[2].explain.get("error").is_some());
    }

    #[test]
    fn test_config_change_during_install_is_seen() {
        for _ in 0..50 {
            let f = fixture(0.0, memory_operations());
            std::thread::scope(|scope| {
                scope.spawn(|| f.config.update(|c| c.instrument.sample_frequency = 1.0));
                assert!(f.instrumentation.install());
            });

            f.db.collection("orders").find(&json!({})).unwrap();
            assert_eq!(f.capture.0.lock().len(), 1);
            f.instrumentation.uninstall();
        }
    }

    #[test]
    fn test_frequency_follows_config() {
        let f = fixture(0.0, memory_operations());
        let _guard = f.instrumentation.instrument();
        let orders = f.db.collection("orders");

        orders.find(&json!({})).unwrap();
        f.config.update(|c| c.instrument.sample_frequency = 1.0);
        orders.find(&json!({})).unwrap();

        assert_eq!(f.capture.0.lock().len(), 1);
    }

    #[test]
    fn test_explain_failure_becomes_placeholder() {
        let engine = Arc::new(OpaqueEngine);
        let f = fixture(1.0, Operations::from_engine(engine));
        let _guard = f.instrumentation.instrument();
        let orders = f.db.collection("orders");

        assert_eq!(orders.find(&json!({})).unwrap().count(), 0);
        assert!(matches!(
            orders.update_one(&json!({}), &json!({"$set": {"a": 1}})),
            Err(OperationError::Failed(_))
        ));

        let events = f.capture.0.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].explain, json!({"error": "explain unavailable: cursor exhausted"}));
        assert_eq!(events[1].explain, json!({"error": "explain unavailable: read only"}));
    }

    #[test]
    fn test_call_site_is_the_application_line() {
        let f = fixture(1.0, memory_operations());
        let _guard = f.instrumentation.instrument();

        let line = line!() + 1;
        f.db.collection("orders").find(&json!({})).unwrap();

        assert_eq!(f.capture.0.lock()[0].source, format!("{}:{}", file!(), line));
    }

    #[test]
    fn test_push_failure_is_invisible() {
        let operations = Arc::new(memory_operations());
        let config = Arc::new(SharedConfig::default());
        config.update(|c| c.instrument.sample_frequency = 1.0);
        let instrumentation = Instrumentation::new(operations.clone(), config, Arc::new(Unreachable));
        let _guard = instrumentation.instrument();

        let db = Database::new("shop", operations);
        let found = db.collection("orders").find_one(&json!({"a": 1})).unwrap();
        assert_eq!(found.unwrap()["a"], 1);
    }

    #[test]
    fn test_guard_uninstalls_only_what_it_installed() {
        let f = fixture(1.0, memory_operations());
        {
            let _guard = f.instrumentation.instrument();
            assert!(f.instrumentation.is_installed());
        }
        assert!(!f.instrumentation.is_installed());

        f.instrumentation.install();
        drop(f.instrumentation.instrument());
        assert!(f.instrumentation.is_installed());
    }

    #[test]
    fn test_concurrent_install_uninstall() {
        let f = fixture(1.0, memory_operations());
        std::thread::scope(|scope| {
            for i in 0..8 {
                let instrumentation = &f.instrumentation;
                scope.spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            instrumentation.install();
                        } else {
                            instrumentation.uninstall();
                        }
                    }
                });
            }
        });
        f.instrumentation.uninstall();
        assert!(!f.instrumentation.is_installed());
        assert_eq!(f.config.observer_count(), 0);
    }
}
