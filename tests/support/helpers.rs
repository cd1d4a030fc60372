use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use sigfill::walker::EmptyPageRetry;
use sigfill::{QueuePublisher, SignatureBatch};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

pub const PROGRAM_ADDRESS: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Short empty-page schedule so walks over a real socket finish quickly.
pub fn fast_empty_retry() -> EmptyPageRetry {
    EmptyPageRetry::new(2, Duration::from_millis(20), 1.0)
}

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    batches: Arc<Mutex<Vec<SignatureBatch>>>,
}

impl RecordingPublisher {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .expect("recording publisher poisoned")
            .iter()
            .map(|batch| batch.signatures.clone())
            .collect()
    }

    pub fn networks(&self) -> Vec<String> {
        self.batches
            .lock()
            .expect("recording publisher poisoned")
            .iter()
            .map(|batch| batch.network.clone())
            .collect()
    }

    pub fn published(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }
}

impl QueuePublisher for RecordingPublisher {
    fn publish(&self, batch: SignatureBatch) {
        self.batches
            .lock()
            .expect("recording publisher poisoned")
            .push(batch);
    }
}

pub async fn wait_for_published(
    publisher: &RecordingPublisher,
    expected: usize,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let published = publisher.published().len();
        if published >= expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for {expected} signatures; saw {published}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Asserts that `published` is exactly `expected`, in order, with no repeats.
pub fn assert_published_once(published: &[String], expected: &[String]) {
    assert_eq!(
        published.len(),
        expected.len(),
        "published {} signatures, expected {}",
        published.len(),
        expected.len()
    );
    assert_eq!(published, expected);
}

/// Polls `condition` every 20 ms until it holds or `timeout` elapses.
pub async fn wait_until(
    what: &str,
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}
