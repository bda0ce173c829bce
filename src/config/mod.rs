//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DrumsConfig (validated)
//!     → shared.rs (SharedConfig, ArcSwap + observers)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → forward_updates swaps it into SharedConfig
//!     → observers (sampling policy, pusher) pick up the new values
//! ```
//!
//! # Design Decisions
//! - A loaded config is immutable; changes are whole-value replacements
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Invalid reloads are logged and dropped, the previous config stays

pub mod loader;
pub mod schema;
pub mod shared;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CollectorConfig, DrumsConfig, InstrumentConfig, ObservabilityConfig, PusherConfig, StorageConfig,
};
pub use shared::{SharedConfig, SubscriptionId};
pub use watcher::{forward_updates, ConfigWatcher};
