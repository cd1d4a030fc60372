use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by the walker, the checkpoint layer, the publisher
/// and the connection refresher.
#[derive(Default, Debug)]
pub struct Telemetry {
    pages_fetched: AtomicU64,
    signatures_published: AtomicU64,
    batches_published: AtomicU64,
    empty_page_retries: AtomicU64,
    tie_duplicates_dropped: AtomicU64,
    malformed_records_skipped: AtomicU64,
    checkpoint_write_failures: AtomicU64,
    publish_failures: AtomicU64,
    connection_refreshes: AtomicU64,
}

impl Telemetry {
    pub fn record_page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_published(&self, signatures: usize) {
        if signatures == 0 {
            return;
        }
        self.batches_published.fetch_add(1, Ordering::Relaxed);
        self.signatures_published
            .fetch_add(signatures as u64, Ordering::Relaxed);
    }

    pub fn record_empty_page_retry(&self) {
        self.empty_page_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tie_duplicates(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.tie_duplicates_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_malformed_records(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.malformed_records_skipped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_checkpoint_write_failure(&self) {
        self.checkpoint_write_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_refresh(&self) {
        self.connection_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signatures_published(&self) -> u64 {
        self.signatures_published.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            signatures_published: self.signatures_published.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            empty_page_retries: self.empty_page_retries.load(Ordering::Relaxed),
            tie_duplicates_dropped: self.tie_duplicates_dropped.load(Ordering::Relaxed),
            malformed_records_skipped: self.malformed_records_skipped.load(Ordering::Relaxed),
            checkpoint_write_failures: self.checkpoint_write_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            connection_refreshes: self.connection_refreshes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub pages_fetched: u64,
    pub signatures_published: u64,
    pub batches_published: u64,
    pub empty_page_retries: u64,
    pub tie_duplicates_dropped: u64,
    pub malformed_records_skipped: u64,
    pub checkpoint_write_failures: u64,
    pub publish_failures: u64,
    pub connection_refreshes: u64,
}

/// Spawns a background task that periodically logs publish throughput and the counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "sigfill::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let published_delta = current
                        .signatures_published
                        .saturating_sub(last_snapshot.signatures_published);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        published_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "sigfill::metrics",
                        throughput = format!("{throughput:.2}"),
                        published = current.signatures_published,
                        batches = current.batches_published,
                        pages = current.pages_fetched,
                        empty_page_retries = current.empty_page_retries,
                        tie_duplicates_dropped = current.tie_duplicates_dropped,
                        malformed_records_skipped = current.malformed_records_skipped,
                        checkpoint_write_failures = current.checkpoint_write_failures,
                        publish_failures = current.publish_failures,
                        connection_refreshes = current.connection_refreshes,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
