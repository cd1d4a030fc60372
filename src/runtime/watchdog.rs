//! Stall detector.
//!
//! Every interval both checkpoints are snapshotted and compared with the
//! previous snapshot. An unchanged snapshot means nothing advanced for a
//! whole interval, which is reported as [`IndexerError::Stalled`] so the
//! process exits and its supervisor restarts it.

use crate::checkpoint::{CheckpointSnapshot, Checkpoints};
use crate::runtime::fatal::{FatalErrorHandler, IndexerError};
use anyhow::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First snapshot; nothing to compare against yet.
    Baseline,
    Progressed,
    Stalled,
}

pub struct LivenessWatchdog {
    checkpoints: Checkpoints,
    interval: Duration,
    baseline: Option<CheckpointSnapshot>,
}

impl LivenessWatchdog {
    pub fn new(checkpoints: Checkpoints, interval: Duration) -> Self {
        Self {
            checkpoints,
            interval,
            baseline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Compares `snapshot` with the stored baseline and replaces it.
    pub fn compare(&mut self, snapshot: CheckpointSnapshot) -> Observation {
        match self.baseline.replace(snapshot) {
            None => Observation::Baseline,
            Some(previous) if Some(&previous) == self.baseline.as_ref() => Observation::Stalled,
            Some(_) => Observation::Progressed,
        }
    }

    /// Reads both checkpoints and compares them with the baseline.
    pub async fn observe(&mut self) -> Result<Observation> {
        let snapshot = self.checkpoints.snapshot().await?;
        Ok(self.compare(snapshot))
    }

    /// Runs the watchdog until `shutdown` is cancelled or a stall is found.
    /// A stall is handed to `fatal`, which cancels the run.
    pub fn spawn(
        mut self,
        fatal: FatalErrorHandler,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("watchdog shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.observe().await {
                            Ok(Observation::Stalled) => {
                                fatal.trigger(IndexerError::Stalled { idle_for: self.interval });
                                break;
                            }
                            Ok(observation) => {
                                tracing::debug!(?observation, "watchdog checkpoint comparison");
                            }
                            Err(err) => {
                                tracing::warn!(
                                    error = format!("{err:#}"),
                                    "watchdog could not read checkpoints"
                                );
                            }
                        }
                    }
                }
            }
        })
    }
}
