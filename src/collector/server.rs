//! Collector tasks and handle.

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time;

use super::session::SessionLog;
use super::state::{CollectorState, StateCell};
use super::CollectorError;
use crate::config::CollectorConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::sink::{Payload, Sink};
use crate::store::DocumentStore;
use crate::transport::DatagramReceiver;

/// Characters of a payload quoted in sink failure logs.
const PREVIEW_CHARS: usize = 256;

type Sinks = Arc<Vec<Arc<dyn Sink>>>;

/// Builder for a collector run.
pub struct Collector {
    config: CollectorConfig,
    sinks: Vec<Arc<dyn Sink>>,
    session_store: Option<Arc<dyn DocumentStore>>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
            session_store: None,
        }
    }

    /// Where session records are kept.
    pub fn with_session_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Register a sink. Sinks receive payloads in registration order.
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Bind the listener and start receiving. Fails only if binding fails.
    pub async fn start(self) -> Result<CollectorHandle, CollectorError> {
        let receiver = DatagramReceiver::bind(&self.config.bind_address, self.config.recv_buffer_bytes)
            .await
            .map_err(CollectorError::Bind)?;
        let local_addr = receiver.local_addr().map_err(CollectorError::Bind)?;

        let session_name = self.config.session.clone();
        let session = match (&session_name, self.session_store) {
            (Some(name), Some(store)) => Some(SessionLog::begin(store, name)),
            (Some(name), None) => {
                tracing::warn!(session = %name, "No session store configured, session not recorded");
                None
            }
            (None, _) => None,
        };

        let state = Arc::new(StateCell::new(CollectorState::Running));
        let stop = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Shutdown::new());

        tracing::info!(
            address = %local_addr,
            session = session_name.as_deref().unwrap_or("-"),
            sinks = self.sinks.len(),
            "Collector listening"
        );

        let receive = tokio::spawn(receive_loop(
            receiver,
            Arc::new(self.sinks),
            session_name.map(Arc::from),
            shutdown.clone(),
        ));
        let supervisor = tokio::spawn(supervise(
            stop.clone(),
            Duration::from_millis(self.config.poll_interval_ms.max(1)),
            shutdown,
            receive,
            state.clone(),
            session,
        ));

        Ok(CollectorHandle {
            local_addr,
            state,
            stop,
            supervisor,
        })
    }
}

/// Control handle of a running collector.
pub struct CollectorHandle {
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    stop: Arc<AtomicBool>,
    supervisor: JoinHandle<Result<(), CollectorError>>,
}

impl CollectorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> CollectorState {
        self.state.get()
    }

    /// Request a stop. Returns immediately; the supervisor notices within
    /// one poll interval.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// A clonable stop switch, for signal handlers and other tasks.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Wait until the collector reaches `Stopped`.
    pub async fn join(self) -> Result<(), CollectorError> {
        flatten(self.supervisor.await)
    }

    /// Request a stop and wait for it.
    pub async fn shutdown(self) -> Result<(), CollectorError> {
        self.stop();
        self.join().await
    }
}

fn flatten(joined: Result<Result<(), CollectorError>, JoinError>) -> Result<(), CollectorError> {
    joined.map_err(|e| CollectorError::Task(e.to_string()))?
}

async fn supervise(
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    shutdown: Arc<Shutdown>,
    mut receive: JoinHandle<Result<(), CollectorError>>,
    state: Arc<StateCell>,
    session: Option<SessionLog>,
) -> Result<(), CollectorError> {
    let mut ticker = time::interval(poll_interval);

    let finished = loop {
        let stop_requested = tokio::select! {
            _ = ticker.tick() => stop.load(Ordering::SeqCst),
            result = &mut receive => break result,
        };
        if stop_requested {
            state.set(CollectorState::Stopping);
            tracing::info!("Stop requested, closing receive loop");
            shutdown.trigger();
            break receive.await;
        }
    };

    state.set(CollectorState::Stopping);
    let outcome = flatten(finished);
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Collector terminated");
    }

    if let Some(session) = session {
        let closed = tokio::task::spawn_blocking(move || session.end()).await;
        if let Err(e) = closed {
            tracing::error!(error = %e, "Session close task failed");
        }
    }

    state.set(CollectorState::Stopped);
    tracing::info!("Collector stopped");
    outcome
}

async fn receive_loop(
    mut receiver: DatagramReceiver,
    sinks: Sinks,
    session: Option<Arc<str>>,
    shutdown: Arc<Shutdown>,
) -> Result<(), CollectorError> {
    let mut stop = shutdown.subscribe();

    loop {
        let received = tokio::select! {
            _ = shutdown.wait(&mut stop) => {
                tracing::debug!("Receive loop received shutdown signal, exiting loop");
                return Ok(());
            }
            received = receiver.recv() => received,
        };
        let (bytes, peer) = received.map_err(CollectorError::Receive)?;

        let payload = Payload::decode(&bytes, session.as_deref());
        metrics::record_datagram(payload.is_structured());
        tracing::trace!(peer = %peer, bytes = bytes.len(), "Datagram received");

        let sinks = sinks.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || fan_out(&sinks, &payload)).await {
            tracing::error!(error = %e, "Fan-out task failed");
        }
    }
}

/// Hand a payload to every sink, isolating each one. Returns how many failed.
pub fn fan_out(sinks: &[Arc<dyn Sink>], payload: &Payload) -> usize {
    let mut failures = 0;
    for sink in sinks {
        match panic::catch_unwind(AssertUnwindSafe(|| sink.handle(payload))) {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => tracing::error!(
                sink = sink.name(),
                error = %e,
                payload = %payload.preview(PREVIEW_CHARS),
                "Sink failed"
            ),
            Err(_) => tracing::error!(
                sink = sink.name(),
                payload = %payload.preview(PREVIEW_CHARS),
                "Sink panicked"
            ),
        }
        failures += 1;
        metrics::record_sink_failure(sink.name());
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use parking_lot::Mutex;

    struct Counting(Mutex<Vec<Payload>>);

    impl Sink for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn filter(&self, _payload: &Payload) -> Result<bool, SinkError> {
            Ok(false)
        }
        fn send(&self, payload: &Payload) -> Result<(), SinkError> {
            self.0.lock().push(payload.clone());
            Ok(())
        }
    }

    struct Panicking;

    impl Sink for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn send(&self, _payload: &Payload) -> Result<(), SinkError> {
            panic!("sink bug")
        }
    }

    #[test]
    fn test_fan_out_isolates_failures() {
        let counting = Arc::new(Counting(Mutex::new(Vec::new())));
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(Panicking), counting.clone(), Arc::new(Panicking)];

        let structured = Payload::decode(br#"{"collection": "c"}"#, Some("s"));
        assert_eq!(fan_out(&sinks, &structured), 2);
        assert_eq!(fan_out(&sinks, &Payload::Raw(b"raw".to_vec())), 2);
        assert_eq!(counting.0.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_walks_the_state_machine() {
        let config = CollectorConfig {
            bind_address: "127.0.0.1:0".to_string(),
            poll_interval_ms: 10,
            ..CollectorConfig::default()
        };
        let handle = Collector::new(config).start().await.unwrap();
        assert_eq!(handle.state(), CollectorState::Running);
        assert_ne!(handle.local_addr().port(), 0);

        let state = handle.state.clone();
        time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.get(), CollectorState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = CollectorConfig {
            bind_address: taken.local_addr().unwrap().to_string(),
            ..CollectorConfig::default()
        };
        assert!(matches!(
            Collector::new(config).start().await,
            Err(CollectorError::Bind(_))
        ));
    }
}
