//! MongoDB query sampling and index usage profiling.
//!
//! Instrumented applications sample their database calls and ship each
//! sample's execution plan over UDP; a collector aggregates them into
//! per-index and per-query-shape profiles.

// Pure canonicalization
pub mod shape;

// Storage boundary and traced database
pub mod database;
pub mod store;

// Pipeline
pub mod collector;
pub mod instrument;
pub mod sink;
pub mod transport;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use collector::{Collector, CollectorHandle, CollectorState};
pub use config::{DrumsConfig, SharedConfig};
pub use instrument::Instrumentation;
pub use lifecycle::Shutdown;
pub use shape::{sanitize, skeleton};
pub use sink::{IndexProfileSink, Payload, QueryProfileSink, Sink};
pub use transport::{Event, Pusher};
