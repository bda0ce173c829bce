//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Stop requested → broadcast → receive loop exits → session closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → request collector stop
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop receiving, finish in-flight fan-out, close session
//! - One broadcast coordinator per collector run

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
