//! Query shape subsystem.
//!
//! # Data Flow
//! ```text
//! Event.query (serialized filter)
//!     → skeleton.rs (structural fingerprint, literal values dropped)
//!     → used as the aggregation key by the profile sinks
//!
//! Event.explain (execution plan)
//!     → sanitize.rs (escape operator-prefixed keys)
//!     → persisted verbatim by the query-profile sink
//! ```
//!
//! # Design Decisions
//! - Both functions are pure and never mutate their input
//! - Operator keys (`$gt`, `$in`, ...) are part of a shape like any other key
//! - Storage safety is a separate concern from shape; neither calls the other

pub mod sanitize;
pub mod skeleton;

pub use sanitize::{desanitize, sanitize};
pub use skeleton::{skeleton, skeleton_str, SkeletonError};
