//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (sampled events, push failures, datagrams, sink failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `drums_events_sampled_total` (counter): events pushed, by function
//! - `drums_push_failures_total` (counter): events lost before leaving the process
//! - `drums_datagrams_total` (counter): datagrams received, by kind (structured/raw)
//! - `drums_sink_failures_total` (counter): sink errors and panics, by sink
//! - `drums_datagrams_truncated_total` (counter): datagrams longer than the receive buffer
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Without an installed recorder every call is a no-op, so the library
//!   records unconditionally

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and HTTP listener. Needs a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_sampled(function: &str) {
    metrics::counter!("drums_events_sampled_total", "function" => function.to_string()).increment(1);
}

pub fn record_push_failure() {
    metrics::counter!("drums_push_failures_total").increment(1);
}

pub fn record_datagram(structured: bool) {
    let kind = if structured { "structured" } else { "raw" };
    metrics::counter!("drums_datagrams_total", "kind" => kind).increment(1);
}

pub fn record_truncated_datagram() {
    metrics::counter!("drums_datagrams_truncated_total").increment(1);
}

pub fn record_sink_failure(sink: &str) {
    metrics::counter!("drums_sink_failures_total", "sink" => sink.to_string()).increment(1);
}
