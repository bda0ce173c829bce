//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mongo_drums::config::CollectorConfig;
use mongo_drums::sink::{Payload, Sink, SinkError};
use parking_lot::Mutex;
use tokio::net::UdpSocket;

/// Records every payload it is handed, internal collections included.
pub struct CapturingSink {
    payloads: Mutex<Vec<Payload>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }
}

impl Sink for CapturingSink {
    fn name(&self) -> &str {
        "capturing"
    }

    fn filter(&self, _payload: &Payload) -> Result<bool, SinkError> {
        Ok(false)
    }

    fn send(&self, payload: &Payload) -> Result<(), SinkError> {
        self.payloads.lock().push(payload.clone());
        Ok(())
    }
}

/// Fails every send.
pub struct FailingSink {
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn filter(&self, _payload: &Payload) -> Result<bool, SinkError> {
        Ok(false)
    }

    fn send(&self, _payload: &Payload) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::MalformedEvent("refusing everything".to_string()))
    }
}

/// Collector settings bound to an ephemeral port with a fast stop poll.
pub fn collector_config(session: Option<&str>) -> CollectorConfig {
    CollectorConfig {
        bind_address: "127.0.0.1:0".to_string(),
        session: session.map(str::to_string),
        poll_interval_ms: 20,
        ..CollectorConfig::default()
    }
}

/// Send each payload as its own datagram.
pub async fn send_datagrams(target: SocketAddr, payloads: &[&[u8]]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for payload in payloads {
        socket.send_to(payload, target).await.unwrap();
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
