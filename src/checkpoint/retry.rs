//! Bounded, cancellable retry schedule for checkpoint writes.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Attempts and delays for a write that must land before the walk advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteRetryPolicy {
    pub attempts: usize,
    pub first_delay: Duration,
    pub delay_cap: Duration,
}

impl WriteRetryPolicy {
    /// Policy for backfill progress records.
    pub(crate) const PROGRESS: Self = Self {
        attempts: 3,
        first_delay: Duration::from_millis(250),
        delay_cap: Duration::from_secs(2),
    };

    /// Delay after the `failed`-th attempt, doubling up to the cap.
    fn delay_after(&self, failed: usize) -> Duration {
        let doublings = failed.saturating_sub(1).min(16) as u32;
        self.first_delay
            .saturating_mul(1 << doublings)
            .min(self.delay_cap)
    }
}

/// One failed write attempt, reported before the next delay starts.
#[derive(Debug)]
pub(crate) struct FailedWrite<'e> {
    pub attempt: usize,
    pub retry_in: Option<Duration>,
    pub error: &'e anyhow::Error,
}

/// Runs `write` until it succeeds or the policy's attempts are spent.
///
/// The first attempt always runs. Cancellation is only observed while
/// waiting between attempts and returns the last write error.
pub(crate) async fn retry_write<W, Fut, R>(
    policy: WriteRetryPolicy,
    cancellation: &CancellationToken,
    mut write: W,
    mut report: R,
) -> Result<()>
where
    W: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
    R: FnMut(FailedWrite<'_>),
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match write().await {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };

        let retry_in = (attempt < attempts).then(|| policy.delay_after(attempt));
        report(FailedWrite {
            attempt,
            retry_in,
            error: &error,
        });
        let Some(delay) = retry_in else {
            return Err(error);
        };

        tokio::select! {
            _ = cancellation.cancelled() => {
                return Err(error.context("shutdown requested between checkpoint write attempts"));
            }
            _ = sleep(delay) => {}
        }
    }
}
