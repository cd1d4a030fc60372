use super::store::CheckpointStore;
use super::types::{BackfillCheckpoint, CheckpointKey, FrontfillCheckpoint};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Write observed by a [`MemoryCheckpointStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointWrite {
    Backfill(BackfillCheckpoint),
    Frontfill(FrontfillCheckpoint),
}

#[derive(Default)]
struct State {
    backfill: BackfillCheckpoint,
    frontfill: FrontfillCheckpoint,
    history: Vec<CheckpointWrite>,
}

/// In-process store used by debug runs and tests. Supports injecting write
/// and read failures.
pub struct MemoryCheckpointStore {
    key: CheckpointKey,
    state: Mutex<State>,
    failing_writes: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            key: CheckpointKey::new(network),
            state: Mutex::new(State::default()),
            failing_writes: AtomicUsize::new(0),
            failing_reads: AtomicUsize::new(0),
        }
    }

    pub fn with_checkpoints(
        network: impl Into<String>,
        backfill: BackfillCheckpoint,
        frontfill: FrontfillCheckpoint,
    ) -> Self {
        let store = Self::new(network);
        {
            let mut state = store.lock();
            state.backfill = backfill;
            state.frontfill = frontfill;
        }
        store
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    /// The next `count` writes fail without touching stored state.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` reads fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn backfill(&self) -> BackfillCheckpoint {
        self.lock().backfill.clone()
    }

    pub fn frontfill(&self) -> FrontfillCheckpoint {
        self.lock().frontfill.clone()
    }

    /// Successful writes in call order.
    pub fn history(&self) -> Vec<CheckpointWrite> {
        self.lock().history.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_read(&self) -> Result<()> {
        if Self::take_failure(&self.failing_reads) {
            bail!("injected read failure for {}", self.key);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if Self::take_failure(&self.failing_writes) {
            bail!("injected write failure for {}", self.key);
        }
        Ok(())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read_backfill(&self) -> BoxFuture<'_, Result<BackfillCheckpoint>> {
        Box::pin(async move {
            self.check_read()?;
            Ok(self.backfill())
        })
    }

    fn read_frontfill(&self) -> BoxFuture<'_, Result<FrontfillCheckpoint>> {
        Box::pin(async move {
            self.check_read()?;
            Ok(self.frontfill())
        })
    }

    fn write_backfill<'a>(
        &'a self,
        checkpoint: &'a BackfillCheckpoint,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_write()?;
            let mut state = self.lock();
            state.backfill = checkpoint.clone();
            state
                .history
                .push(CheckpointWrite::Backfill(checkpoint.clone()));
            Ok(())
        })
    }

    fn write_frontfill<'a>(
        &'a self,
        checkpoint: &'a FrontfillCheckpoint,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_write()?;
            let mut state = self.lock();
            state.frontfill = checkpoint.clone();
            state
                .history
                .push(CheckpointWrite::Frontfill(checkpoint.clone()));
            Ok(())
        })
    }
}
