//! Event collector.
//!
//! # Data Flow
//! ```text
//! start():  bind DatagramReceiver → session begin → spawn tasks → Running
//!
//! receive task:
//!     datagram → Payload::decode (attach session)
//!     → spawn_blocking fan_out: every sink in registration order,
//!       each call isolated (errors and panics logged)
//!
//! supervisor task (every poll_interval):
//!     stop flag set → Stopping → Shutdown::trigger
//!     → receive task finishes its in-flight fan-out and exits
//!     → session end → Stopped
//! ```
//!
//! # Design Decisions
//! - Only bind failures and receive-socket failures are errors of the
//!   collector itself; sink and storage problems are logged per datagram
//! - The stop request is a plain flag so it can be set from any thread,
//!   sync or async
//! - In-flight sink calls are never cancelled

pub mod server;
pub mod session;
pub mod state;

use thiserror::Error;

use crate::transport::TransportError;

pub use server::{fan_out, Collector, CollectorHandle};
pub use session::SessionLog;
pub use state::CollectorState;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("cannot listen: {0}")]
    Bind(#[source] TransportError),

    #[error("receive loop failed: {0}")]
    Receive(#[source] TransportError),

    #[error("collector task failed: {0}")]
    Task(String),
}
