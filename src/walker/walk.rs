//! One directed traversal of an address's signature history.
//!
//! Pages are fetched strictly one at a time. Each non-empty page is published
//! oldest-first as a single batch, then `before` moves to the page's oldest
//! signature. Backfill progress is persisted before the next fetch; frontfill
//! and completion records are written once the range is exhausted.

use super::cursor::{Cursor, SignatureRecord, TieKey, WalkBounds, WalkMode, WalkOutcome};
use super::empty_retry::EmptyPageRetry;
use super::page::{display_block_time, SignaturePage};
use super::ties::TieTracker;
use crate::checkpoint::{BackfillCheckpoint, Checkpoints, FrontfillCheckpoint};
use crate::publisher::{QueuePublisher, SignatureBatch};
use crate::rpc::{PageRequest, SignatureSource};
use crate::runtime::fatal::IndexerError;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const MAX_PAGE_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct WalkerSettings {
    pub address: String,
    pub network: String,
    pub page_limit: usize,
    pub empty_page_retry: EmptyPageRetry,
}

impl WalkerSettings {
    pub fn new(address: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            network: network.into(),
            page_limit: MAX_PAGE_LIMIT,
            empty_page_retry: EmptyPageRetry::default(),
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn with_empty_page_retry(mut self, retry: EmptyPageRetry) -> Self {
        self.empty_page_retry = retry;
        self
    }
}

enum Fetched {
    Page(SignaturePage),
    Exhausted,
    Cancelled,
}

pub struct SignatureWalker {
    source: Arc<dyn SignatureSource>,
    checkpoints: Checkpoints,
    publisher: Arc<dyn QueuePublisher>,
    telemetry: Arc<Telemetry>,
    settings: WalkerSettings,
    shutdown: CancellationToken,
    ties: TieTracker,
}

impl SignatureWalker {
    pub fn new(
        source: Arc<dyn SignatureSource>,
        checkpoints: Checkpoints,
        publisher: Arc<dyn QueuePublisher>,
        telemetry: Arc<Telemetry>,
        settings: WalkerSettings,
    ) -> Self {
        Self {
            source,
            checkpoints,
            publisher,
            telemetry,
            settings,
            shutdown: CancellationToken::new(),
            ties: TieTracker::new(),
        }
    }

    /// A cancelled token stops the walk before the next fetch, or abandons a
    /// fetch in flight, without writing any termination checkpoint.
    pub fn with_cancellation(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn settings(&self) -> &WalkerSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    pub fn ties(&self) -> &TieTracker {
        &self.ties
    }

    pub async fn walk(&mut self, mode: WalkMode, bounds: WalkBounds) -> Result<WalkOutcome> {
        let fresh_backfill = mode == WalkMode::Backfill && bounds.is_fully_unbounded();
        let anchor_key = match mode {
            WalkMode::Frontfill => bounds.until.tie_key(),
            WalkMode::Backfill => None,
        };
        if let (Some(key), Some(signature)) = (anchor_key, bounds.until.signature.as_deref()) {
            self.ties.seed(key, signature);
        }

        tracing::info!(
            mode = %mode,
            address = %self.settings.address,
            before = ?bounds.before,
            until = ?bounds.until.signature,
            "starting walk"
        );

        let mut outcome = WalkOutcome {
            top: Cursor::at_signature(bounds.before.clone()),
            bottom: bounds.until.clone(),
            ..WalkOutcome::default()
        };
        let mut frontier_key: Option<TieKey> = None;

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(mode = %mode, pages = outcome.pages, "walk interrupted by shutdown");
                return Ok(outcome);
            }

            let raw = match self.fetch_with_empty_retry(&outcome.top, &bounds.until).await? {
                Fetched::Page(page) => page,
                Fetched::Exhausted => break,
                Fetched::Cancelled => {
                    tracing::info!(mode = %mode, pages = outcome.pages, "walk interrupted by shutdown");
                    return Ok(outcome);
                }
            };
            let (Some(raw_bottom), Some(raw_top)) = (raw.bottom().cloned(), raw.top().cloned())
            else {
                break;
            };

            outcome.pages += 1;
            if outcome.frontier.is_none() {
                outcome.frontier = Some(raw_top.clone());
            }

            let mut page = raw.clone();
            if mode == WalkMode::Frontfill {
                let dropped = self.ties.filter_edges(&mut page);
                if dropped > 0 {
                    self.telemetry.record_tie_duplicates(dropped);
                    tracing::debug!(dropped, "dropped already published tied signatures");
                }

                if frontier_key.is_none() {
                    let key = raw_top.tie_key();
                    self.ties.record_group(&raw, key);
                    frontier_key = Some(key);
                }
                let bottom_key = raw_bottom.tie_key();
                self.ties.record_group(&raw, bottom_key);

                let keep: Vec<TieKey> = [anchor_key, frontier_key, Some(bottom_key)]
                    .into_iter()
                    .flatten()
                    .collect();
                self.ties.retain_keys(&keep);
            }

            if !page.is_empty() {
                self.publish(&page);
                outcome.published += page.len();
            }
            outcome.top = Cursor::from(&raw_bottom);

            if mode == WalkMode::Backfill {
                if fresh_backfill && outcome.pages == 1 {
                    self.checkpoints
                        .write_frontfill_best_effort(&FrontfillCheckpoint::from(&raw_top))
                        .await;
                }

                let progress = BackfillCheckpoint::in_progress(
                    Some(raw_bottom.signature.clone()),
                    bounds.until.signature.clone(),
                );
                if let Err(err) = self
                    .checkpoints
                    .write_backfill_with_retry(&progress, &self.shutdown)
                    .await
                {
                    if self.shutdown.is_cancelled() {
                        tracing::info!("shutdown requested during backfill progress write");
                        return Ok(outcome);
                    }
                    return Err(err.context(IndexerError::CheckpointWrite {
                        incomplete_top: progress.incomplete_top,
                    }));
                }
            }
        }

        if outcome.pages == 0 {
            tracing::info!(mode = %mode, "range already exhausted; checkpoints unchanged");
            return Ok(outcome);
        }

        self.finish(mode, &outcome).await?;
        tracing::info!(
            mode = %mode,
            pages = outcome.pages,
            published = outcome.published,
            frontier = ?outcome.frontier.as_ref().map(|record| record.signature.as_str()),
            "walk complete"
        );
        Ok(outcome)
    }

    async fn finish(&mut self, mode: WalkMode, outcome: &WalkOutcome) -> Result<()> {
        let Some(frontier) = outcome.frontier.as_ref() else {
            return Ok(());
        };

        match mode {
            WalkMode::Frontfill => {
                self.checkpoints
                    .write_frontfill_best_effort(&FrontfillCheckpoint::from(frontier))
                    .await;
                self.ties.retain_keys(&[frontier.tie_key()]);
            }
            WalkMode::Backfill => {
                self.checkpoints
                    .write_backfill_best_effort(&BackfillCheckpoint::completed())
                    .await;
                let current = self.checkpoints.read_frontfill().await?;
                if !current.is_anchored() {
                    tracing::info!(
                        frontier = %frontier.signature,
                        "seeding frontfill anchor from backfill frontier"
                    );
                    self.checkpoints
                        .write_frontfill_best_effort(&FrontfillCheckpoint::from(frontier))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn fetch_with_empty_retry(&self, before: &Cursor, until: &Cursor) -> Result<Fetched> {
        let Some(page) = self.fetch_unless_cancelled(before, until).await? else {
            return Ok(Fetched::Cancelled);
        };
        if !page.is_empty() {
            return Ok(Fetched::Page(page));
        }

        let retry = self.settings.empty_page_retry;
        for (attempt, delay) in retry.delays().enumerate() {
            self.telemetry.record_empty_page_retry();
            tracing::debug!(
                attempt = attempt + 1,
                retries = retry.retries,
                delay_ms = delay.as_millis() as u64,
                before = ?before.signature,
                "empty page; retrying"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(Fetched::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(page) = self.fetch_unless_cancelled(before, until).await? else {
                return Ok(Fetched::Cancelled);
            };
            if !page.is_empty() {
                return Ok(Fetched::Page(page));
            }
        }

        Ok(Fetched::Exhausted)
    }

    /// `None` when shutdown wins the race; the in-flight request is dropped.
    async fn fetch_unless_cancelled(
        &self,
        before: &Cursor,
        until: &Cursor,
    ) -> Result<Option<SignaturePage>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            page = self.fetch_page(before, until) => page.map(Some),
        }
    }

    async fn fetch_page(&self, before: &Cursor, until: &Cursor) -> Result<SignaturePage> {
        let request = PageRequest {
            address: &self.settings.address,
            before: before.signature.as_deref(),
            until: until.signature.as_deref(),
            limit: self.settings.page_limit,
        };
        let raw = self.source.fetch_page(request).await.with_context(|| {
            format!(
                "failed to fetch signatures for {} before {:?}",
                self.settings.address, before.signature
            )
        })?;
        self.telemetry.record_page_fetched();

        let (page, skipped) = SignaturePage::from_newest_first(raw);
        self.telemetry.record_malformed_records(skipped);
        Ok(page)
    }

    fn publish(&self, page: &SignaturePage) {
        let (Some(oldest), Some(newest)) = (page.bottom(), page.top()) else {
            return;
        };
        log_page(page.len(), oldest, newest);

        self.publisher
            .publish(SignatureBatch::new(&self.settings.network, page.signatures()));
        self.telemetry.record_batch_published(page.len());
    }
}

fn log_page(count: usize, oldest: &SignatureRecord, newest: &SignatureRecord) {
    tracing::info!(
        count,
        oldest = %oldest.signature,
        oldest_time = %display_block_time(oldest.block_time),
        newest = %newest.signature,
        newest_time = %display_block_time(newest.block_time),
        "published signature page"
    );
}
