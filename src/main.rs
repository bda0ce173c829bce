//! drums-collector
//!
//! Receives sampled query plans and aggregates them into profiles.
//!
//! # Architecture Overview
//!
//! ```text
//!   instrumented application                 drums-collector
//!  ┌──────────────────────────┐            ┌──────────────────────────────────────┐
//!  │ Collection::find/update  │            │  DatagramReceiver                     │
//!  │   → Operations slot      │   UDP      │    → Payload + session                │
//!  │   → Sampled* wrapper     │ ─────────▶ │    → fan-out                          │
//!  │   → Pusher               │  (lossy)   │        ├─ IndexProfileSink ─┐         │
//!  └──────────────────────────┘            │        └─ QueryProfileSink ─┤         │
//!                                          │                             ▼         │
//!                                          │                  MemoryStore (+ JSON  │
//!                                          │                  snapshot on disk)    │
//!                                          └──────────────────────────────────────┘
//! ```
//!
//! Runs in the foreground until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mongo_drums::collector::{Collector, CollectorError};
use mongo_drums::config::validation::validate_config;
use mongo_drums::config::{forward_updates, load_config, ConfigError, ConfigWatcher, DrumsConfig, SharedConfig};
use mongo_drums::lifecycle::{wait_for_termination, Shutdown};
use mongo_drums::observability::{init_logging, metrics};
use mongo_drums::sink::{IndexProfileSink, QueryProfileSink};
use mongo_drums::store::MemoryStore;

#[derive(Parser)]
#[command(name = "drums-collector")]
#[command(about = "Collect sampled MongoDB query plans into index and query profiles", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session name (default: configured name, else a random UUID)
    #[arg(short, long)]
    session: Option<String>,

    /// Listen address, overrides collector.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Snapshot file, overrides storage.snapshot_path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Reload the configuration file when it changes
    #[arg(long)]
    watch: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut DrumsConfig) {
        if let Some(session) = &self.session {
            config.collector.session = Some(session.clone());
        }
        if config.collector.session.is_none() {
            config.collector.session = Some(uuid::Uuid::new_v4().to_string());
        }
        if let Some(bind) = &self.bind {
            config.collector.bind_address = bind.clone();
        }
        if let Some(snapshot) = &self.snapshot {
            config.storage.snapshot_path = Some(snapshot.clone());
        }
        match self.verbose {
            0 => {}
            1 => config.observability.log_level = "debug".to_string(),
            _ => config.observability.log_level = "trace".to_string(),
        }
    }
}

fn open_store(config: &DrumsConfig) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    Ok(match &config.storage.snapshot_path {
        Some(path) => MemoryStore::load_from_file(path)?,
        None => MemoryStore::new(None),
    })
}

async fn save_snapshot(store: &Arc<MemoryStore>) {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.save_to_file()).await {
        Ok(Ok(())) => tracing::debug!("Snapshot saved"),
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to save snapshot"),
        Err(e) => tracing::error!(error = %e, "Snapshot task failed"),
    }
}

async fn snapshot_loop(store: Arc<MemoryStore>, shared: Arc<SharedConfig>, shutdown: Arc<Shutdown>) {
    let mut stop = shutdown.subscribe();
    loop {
        let interval = Duration::from_secs(shared.current().storage.snapshot_interval_secs.max(1));
        tokio::select! {
            _ = tokio::time::sleep(interval) => save_snapshot(&store).await,
            _ = shutdown.wait(&mut stop) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DrumsConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);
    tracing::info!("drums-collector v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store = Arc::new(open_store(&config)?);
    let shared = Arc::new(SharedConfig::new(config.clone()));

    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            forward_updates(updates, shared.clone());
            let started = config.collector.clone();
            shared.subscribe(move |next| {
                if next.collector != started {
                    tracing::warn!("Collector settings changed; they take effect after a restart");
                }
            });
            Some(watcher)
        }
        (None, true) => {
            tracing::warn!("--watch needs --config, not watching");
            None
        }
        _ => None,
    };

    let housekeeping = Arc::new(Shutdown::new());
    let snapshots = store
        .snapshot_path()
        .is_some()
        .then(|| tokio::spawn(snapshot_loop(store.clone(), shared.clone(), housekeeping.clone())));

    let handle = Collector::new(config.collector.clone())
        .with_session_store(store.clone())
        .with_sink(Arc::new(IndexProfileSink::new(store.clone())?))
        .with_sink(Arc::new(QueryProfileSink::new(store.clone())?))
        .start()
        .await?;

    let stop = handle.stop_flag();
    let mut collector = tokio::spawn(handle.join());
    let joined = tokio::select! {
        signal = wait_for_termination() => {
            tracing::info!(signal, "Termination requested, stopping collector");
            stop.store(true, Ordering::SeqCst);
            collector.await
        }
        joined = &mut collector => joined,
    };
    let outcome = joined.map_err(|e| CollectorError::Task(e.to_string())).and_then(|r| r);

    housekeeping.trigger();
    if let Some(task) = snapshots {
        let _ = task.await;
        save_snapshot(&store).await;
    }

    outcome?;
    tracing::info!("Shutdown complete");
    Ok(())
}
