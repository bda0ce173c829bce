//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (frequency within [0, 1], bounded poll interval)
//! - Check that every address parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DrumsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::DrumsConfig;
use crate::transport::MAX_DATAGRAM_BYTES;

pub const MAX_RECV_BUFFER_BYTES: usize = 64 * 1024;
/// The buffer must hold the largest event a pusher sends.
pub const MIN_RECV_BUFFER_BYTES: usize = MAX_DATAGRAM_BYTES;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    SampleFrequency(f64),
    Address { field: &'static str, value: String },
    PollInterval(u64),
    RecvBuffer(usize),
    LogLevel(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::SampleFrequency(v) => {
                write!(f, "instrument.sample_frequency must be within [0, 1], got {}", v)
            }
            ValidationError::Address { field, value } => {
                write!(f, "{} is not a socket address: '{}'", field, value)
            }
            ValidationError::PollInterval(v) => write!(
                f,
                "collector.poll_interval_ms must be within 1..={}, got {}",
                MAX_POLL_INTERVAL_MS, v
            ),
            ValidationError::RecvBuffer(v) => write!(
                f,
                "collector.recv_buffer_bytes must be within {}..={}, got {}",
                MIN_RECV_BUFFER_BYTES, MAX_RECV_BUFFER_BYTES, v
            ),
            ValidationError::LogLevel(v) => write!(f, "observability.log_level is unknown: '{}'", v),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &DrumsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let frequency = config.instrument.sample_frequency;
    if !frequency.is_finite() || !(0.0..=1.0).contains(&frequency) {
        errors.push(ValidationError::SampleFrequency(frequency));
    }

    let addresses = [
        ("pusher.target_address", &config.pusher.target_address),
        ("collector.bind_address", &config.collector.bind_address),
    ];
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::Address {
                field,
                value: value.clone(),
            });
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let poll = config.collector.poll_interval_ms;
    if poll == 0 || poll > MAX_POLL_INTERVAL_MS {
        errors.push(ValidationError::PollInterval(poll));
    }

    let buffer = config.collector.recv_buffer_bytes;
    if !(MIN_RECV_BUFFER_BYTES..=MAX_RECV_BUFFER_BYTES).contains(&buffer) {
        errors.push(ValidationError::RecvBuffer(buffer));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
