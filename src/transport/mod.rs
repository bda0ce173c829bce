//! Event transport between instrumented processes and the collector.
//!
//! # Data Flow
//! ```text
//! interceptor → Event (event.rs)
//!     → Pusher (pusher.rs): JSON object, one UDP datagram, fire-and-forget
//!     → network
//!     → DatagramReceiver (receiver.rs) in the collector
//! ```
//!
//! # Design Decisions
//! - Delivery is best effort. Loss, duplication, and reordering are tolerated
//! - The sending side never blocks on the collector and never reports a
//!   send failure to the traced caller
//! - The wire format is a self-describing JSON object so raw producers can
//!   send events without linking this crate

pub mod event;
pub mod pusher;
pub mod receiver;

use thiserror::Error;

pub use event::{Event, EventKind};
pub use pusher::{Pusher, MAX_DATAGRAM_BYTES};
pub use receiver::DatagramReceiver;

/// Errors raised while sending or receiving events.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to bind socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to receive datagram: {0}")]
    Receive(#[source] std::io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("encoded event is {0} bytes, larger than one datagram")]
    Oversized(usize),
}

/// Sends sampled events towards a collector.
pub trait Transport: Send + Sync {
    fn push(&self, event: &Event) -> Result<(), TransportError>;
}
