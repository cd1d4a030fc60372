//! Two-state loop choosing between backfill and frontfill walks.
//!
//! `BACKFILL` resumes from the stored `incomplete_top` until the walker
//! reports the range exhausted; `FRONTFILL` polls from the newest signature
//! down to the stored anchor. State lives entirely in the checkpoints, so a
//! restart picks up where the last persisted write left off.

use crate::checkpoint::{BackfillCheckpoint, Checkpoints};
use crate::walker::{Cursor, SignatureWalker, WalkBounds, WalkMode, WalkOutcome};
use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// What a single orchestrator iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    Backfill(WalkOutcome),
    Frontfill(WalkOutcome),
    /// Frontfill was selected without an anchor; backfill completion was
    /// cleared and no walk ran.
    SelfHealed,
}

pub struct ModeOrchestrator {
    walker: SignatureWalker,
    checkpoints: Checkpoints,
    frontfill_only: bool,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl ModeOrchestrator {
    pub fn new(walker: SignatureWalker) -> Self {
        let checkpoints = walker.checkpoints().clone();
        Self {
            walker,
            checkpoints,
            frontfill_only: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    /// Forces frontfill regardless of the stored completion flag. Without a
    /// stored anchor nothing is walked; the orchestrator self-heals instead.
    pub fn with_frontfill_only(mut self, frontfill_only: bool) -> Self {
        self.frontfill_only = frontfill_only;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Shares `shutdown` with the walker so a cancellation also stops a walk
    /// between pages.
    pub fn with_cancellation(mut self, shutdown: CancellationToken) -> Self {
        self.walker = self.walker.with_cancellation(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    pub fn walker(&self) -> &SignatureWalker {
        &self.walker
    }

    /// Loops until the shutdown token is cancelled or an iteration fails.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            frontfill_only = self.frontfill_only,
            poll_interval_secs = self.poll_interval.as_secs(),
            "orchestrator started"
        );

        while !self.shutdown.is_cancelled() {
            self.run_once().await?;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("orchestrator stopped");
        Ok(())
    }

    pub async fn run_once(&mut self) -> Result<Iteration> {
        let backfill = self.checkpoints.read_backfill().await?;
        tracing::info!(
            incomplete_top = ?backfill.incomplete_top,
            bottom_sig = ?backfill.bottom_sig,
            backfill_complete = backfill.backfill_complete,
            "read backfill checkpoint"
        );

        if backfill.backfill_complete || self.frontfill_only {
            self.frontfill(&backfill).await
        } else {
            self.backfill(&backfill).await
        }
    }

    async fn backfill(&mut self, checkpoint: &BackfillCheckpoint) -> Result<Iteration> {
        let bounds = WalkBounds::new(
            checkpoint.incomplete_top.clone(),
            Cursor::at_signature(checkpoint.bottom_sig.clone()),
        );
        let outcome = self.walker.walk(WalkMode::Backfill, bounds).await?;

        // A resumed walk whose first page is empty writes nothing. Without
        // this the loop would re-enter backfill forever.
        if outcome.pages == 0 && checkpoint.incomplete_top.is_some() {
            let frontfill = self.checkpoints.read_frontfill().await?;
            if frontfill.is_anchored() {
                tracing::info!(
                    incomplete_top = ?checkpoint.incomplete_top,
                    "resumed backfill found nothing older; marking complete"
                );
                self.checkpoints
                    .write_backfill_best_effort(&BackfillCheckpoint::completed())
                    .await;
            }
        }

        Ok(Iteration::Backfill(outcome))
    }

    async fn frontfill(&mut self, backfill: &BackfillCheckpoint) -> Result<Iteration> {
        let frontfill = self.checkpoints.read_frontfill().await?;
        tracing::info!(
            old_top = ?frontfill.old_top,
            old_top_block_time = ?frontfill.old_top_block_time,
            old_top_slot = ?frontfill.old_top_slot,
            "read frontfill checkpoint"
        );

        if !frontfill.is_anchored() {
            if self.frontfill_only {
                tracing::error!(
                    "frontfill-only override set but no frontfill anchor exists; \
                     skipping the walk until a backfill seeds one"
                );
            } else {
                tracing::warn!(
                    "backfill marked complete without a frontfill anchor; resuming backfill"
                );
            }
            let healed = BackfillCheckpoint::in_progress(
                backfill.incomplete_top.clone(),
                backfill.bottom_sig.clone(),
            );
            self.checkpoints
                .write_backfill_with_retry(&healed, &self.shutdown)
                .await?;
            return Ok(Iteration::SelfHealed);
        }

        let bounds = WalkBounds::new(None, frontfill.anchor());
        let outcome = self.walker.walk(WalkMode::Frontfill, bounds).await?;
        Ok(Iteration::Frontfill(outcome))
    }
}
