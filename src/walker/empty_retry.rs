//! Bounded retry policy for empty pages.
//!
//! An empty response is ambiguous: the range may be exhausted, or the upstream
//! node may simply be lagging. The walker refetches a few times with a
//! growing delay before treating the range as finished.

use std::time::Duration;

pub const DEFAULT_EMPTY_PAGE_RETRIES: usize = 4;
pub const DEFAULT_EMPTY_PAGE_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_EMPTY_PAGE_MULTIPLIER: f64 = 1.35;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmptyPageRetry {
    /// Additional fetches after the first empty response.
    pub retries: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for EmptyPageRetry {
    fn default() -> Self {
        Self {
            retries: DEFAULT_EMPTY_PAGE_RETRIES,
            initial_delay: DEFAULT_EMPTY_PAGE_INITIAL_DELAY,
            multiplier: DEFAULT_EMPTY_PAGE_MULTIPLIER,
        }
    }
}

impl EmptyPageRetry {
    pub fn new(retries: usize, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            retries,
            initial_delay,
            multiplier,
        }
    }

    /// Sleep preceding the retry with the given zero-based index.
    pub fn delay_for(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay.as_secs_f64() * 1_000.0 * factor;
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_micros((millis * 1_000.0).round() as u64)
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).map(move |retry| self.delay_for(retry))
    }

    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }
}
