//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! interceptors, collector, sinks produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout (human-readable or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments) and no-ops until a recorder is installed
//! - Nothing here is required for correctness; failures to initialise are logged

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
