//! Checkpoint persistence seam and the write policies layered on top of it.

use super::types::{BackfillCheckpoint, CheckpointSnapshot, FrontfillCheckpoint};
use super::retry::{retry_write, WriteRetryPolicy};
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stores the backfill and frontfill records for one network.
///
/// A missing record reads back as the default (all fields absent,
/// `backfill_complete = false`).
pub trait CheckpointStore: Send + Sync {
    fn read_backfill(&self) -> BoxFuture<'_, Result<BackfillCheckpoint>>;

    fn read_frontfill(&self) -> BoxFuture<'_, Result<FrontfillCheckpoint>>;

    fn write_backfill<'a>(&'a self, checkpoint: &'a BackfillCheckpoint)
        -> BoxFuture<'a, Result<()>>;

    fn write_frontfill<'a>(
        &'a self,
        checkpoint: &'a FrontfillCheckpoint,
    ) -> BoxFuture<'a, Result<()>>;

    fn snapshot(&self) -> BoxFuture<'_, Result<CheckpointSnapshot>> {
        Box::pin(async move {
            let backfill = self.read_backfill().await?;
            let frontfill = self.read_frontfill().await?;
            Ok(CheckpointSnapshot {
                backfill,
                frontfill,
            })
        })
    }
}

/// Shared handle to a [`CheckpointStore`] applying the daemon's write policies:
/// reads propagate errors, backfill progress writes are retried and then
/// surfaced, and every other write is best effort.
#[derive(Clone)]
pub struct Checkpoints {
    store: Arc<dyn CheckpointStore>,
    telemetry: Arc<Telemetry>,
}

impl Checkpoints {
    pub fn new(store: Arc<dyn CheckpointStore>, telemetry: Arc<Telemetry>) -> Self {
        Self { store, telemetry }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub async fn read_backfill(&self) -> Result<BackfillCheckpoint> {
        let checkpoint = self
            .store
            .read_backfill()
            .await
            .context("failed to read backfill checkpoint")?;
        tracing::debug!(
            incomplete_top = ?checkpoint.incomplete_top,
            bottom_sig = ?checkpoint.bottom_sig,
            backfill_complete = checkpoint.backfill_complete,
            "read backfill checkpoint"
        );
        Ok(checkpoint)
    }

    pub async fn read_frontfill(&self) -> Result<FrontfillCheckpoint> {
        let checkpoint = self
            .store
            .read_frontfill()
            .await
            .context("failed to read frontfill checkpoint")?;
        tracing::debug!(
            old_top = ?checkpoint.old_top,
            old_top_block_time = ?checkpoint.old_top_block_time,
            old_top_slot = ?checkpoint.old_top_slot,
            "read frontfill checkpoint"
        );
        Ok(checkpoint)
    }

    pub async fn snapshot(&self) -> Result<CheckpointSnapshot> {
        self.store
            .snapshot()
            .await
            .context("failed to snapshot checkpoints")
    }

    /// Persists backfill progress before the walk may advance. Transient
    /// failures are retried; a persistent failure is returned to the caller.
    pub async fn write_backfill_with_retry(
        &self,
        checkpoint: &BackfillCheckpoint,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let telemetry = &self.telemetry;
        retry_write(
            WriteRetryPolicy::PROGRESS,
            cancellation,
            || self.store.write_backfill(checkpoint),
            |failed| {
                telemetry.record_checkpoint_write_failure();
                match failed.retry_in {
                    Some(delay) => tracing::warn!(
                        attempt = failed.attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %failed.error,
                        "backfill progress write failed; retrying"
                    ),
                    None => tracing::error!(
                        attempt = failed.attempt,
                        error = %failed.error,
                        "backfill progress write exhausted retries"
                    ),
                }
            },
        )
        .await
        .with_context(|| {
            format!(
                "failed to persist backfill progress at {:?}",
                checkpoint.incomplete_top
            )
        })
    }

    /// Writes the backfill record, logging instead of propagating failures.
    pub async fn write_backfill_best_effort(&self, checkpoint: &BackfillCheckpoint) -> bool {
        match self.store.write_backfill(checkpoint).await {
            Ok(()) => {
                tracing::info!(
                    incomplete_top = ?checkpoint.incomplete_top,
                    backfill_complete = checkpoint.backfill_complete,
                    "backfill checkpoint written"
                );
                true
            }
            Err(err) => {
                self.telemetry.record_checkpoint_write_failure();
                tracing::error!(error = %err, "backfill checkpoint write failed");
                false
            }
        }
    }

    /// Writes the frontfill record, logging instead of propagating failures.
    pub async fn write_frontfill_best_effort(&self, checkpoint: &FrontfillCheckpoint) -> bool {
        match self.store.write_frontfill(checkpoint).await {
            Ok(()) => {
                tracing::info!(
                    old_top = ?checkpoint.old_top,
                    old_top_block_time = ?checkpoint.old_top_block_time,
                    old_top_slot = ?checkpoint.old_top_slot,
                    "frontfill checkpoint written"
                );
                true
            }
            Err(err) => {
                self.telemetry.record_checkpoint_write_failure();
                tracing::error!(error = %err, "frontfill checkpoint write failed");
                false
            }
        }
    }

    /// Clears both records to the fully absent state.
    pub async fn reset(&self) -> Result<()> {
        tracing::info!("resetting checkpoints");
        self.store
            .write_frontfill(&FrontfillCheckpoint::default())
            .await
            .context("failed to reset frontfill checkpoint")?;
        self.store
            .write_backfill(&BackfillCheckpoint::default())
            .await
            .context("failed to reset backfill checkpoint")?;
        Ok(())
    }
}
