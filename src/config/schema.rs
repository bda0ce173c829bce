//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure shared by the
//! instrumented application (sampling, pusher) and the collector process.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DrumsConfig {
    /// Sampling settings for the interceptors.
    pub instrument: InstrumentConfig,

    /// Where sampled events are sent.
    pub pusher: PusherConfig,

    /// Collector listener and session settings.
    pub collector: CollectorConfig,

    /// Profile storage settings.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Interceptor sampling configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Probability (0.0 to 1.0) that a traced call is sampled.
    pub sample_frequency: f64,

    /// Module identifiers skipped when attributing a call site.
    pub ignored_modules: Vec<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            sample_frequency: 0.1,
            ignored_modules: vec!["mongo_drums".to_string()],
        }
    }
}

/// Event pusher configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PusherConfig {
    /// Collector address events are sent to (e.g., "127.0.0.1:63333").
    pub target_address: String,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            target_address: "127.0.0.1:63333".to_string(),
        }
    }
}

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Bind address for the datagram listener.
    pub bind_address: String,

    /// Profiling session name attached to every event.
    pub session: Option<String>,

    /// How often the supervisor checks for a stop request, in milliseconds.
    pub poll_interval_ms: u64,

    /// Receive buffer size; larger datagrams are truncated.
    pub recv_buffer_bytes: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:63333".to_string(),
            session: None,
            poll_interval_ms: 100,
            recv_buffer_bytes: 64 * 1024,
        }
    }
}

/// Profile storage configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot file; profiles are kept in memory only when unset.
    pub snapshot_path: Option<PathBuf>,

    /// Periodic snapshot interval in seconds while the collector runs.
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
