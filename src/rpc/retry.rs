//! Retry context and canned log messages used by the RPC client so every
//! attempt is reported with the same fields.

use crate::rpc::circuit_breaker::CircuitState;
use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        match $ctx.before {
            Some(before) => tracing::$level!(
                address = $ctx.address,
                before = before,
                $($rest)*
            ),
            None => tracing::$level!(address = $ctx.address, $($rest)*),
        }
    }};
}

/// Logging labels for one RPC operation.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) permit: &'static str,
    pub(crate) circuit_open: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) oversized: &'static str,
    pub(crate) fallback: &'static str,
}

/// Context passed into `retry_with_breaker`: the address and page cursor the
/// request is for, plus the messages to log with.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    address: &'a str,
    before: Option<&'a str>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(
        messages: &'a RetryMessages,
        address: &'a str,
        before: Option<&'a str>,
    ) -> Self {
        Self {
            address,
            before,
            messages,
        }
    }

    pub(crate) fn log_permit(&self, state: CircuitState) {
        log_with_retry_ctx!(
            trace,
            self,
            breaker_state = ?state,
            "{}",
            self.messages.permit
        );
    }

    pub(crate) fn log_circuit_open(&self, retry_in: Option<Duration>) {
        log_with_retry_ctx!(
            warn,
            self,
            retry_in_ms = retry_in.map(Self::duration_to_millis),
            "{}",
            self.messages.circuit_open
        );
    }

    pub(crate) fn log_timeout(&self, attempt: usize, endpoint: &str, backoff: Duration) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            endpoint,
            backoff_ms = Self::duration_to_millis(backoff),
            "{}",
            self.messages.timeout
        );
    }

    pub(crate) fn log_retry(&self, attempt: usize, endpoint: &str, backoff: Duration, err: &Error) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            endpoint,
            backoff_ms = Self::duration_to_millis(backoff),
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_oversized(&self, attempt: usize, endpoint: &str) {
        log_with_retry_ctx!(warn, self, attempt, endpoint, "{}", self.messages.oversized);
    }

    pub(crate) fn log_fallback(&self, attempt: usize, endpoint: &str) {
        log_with_retry_ctx!(debug, self, attempt, endpoint, "{}", self.messages.fallback);
    }

    fn duration_to_millis(backoff: Duration) -> u64 {
        backoff.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

pub(crate) const GET_SIGNATURES_RETRY: RetryMessages = RetryMessages {
    permit: "circuit breaker permit acquired for getSignaturesForAddress",
    circuit_open: "RPC circuit breaker open; rejecting getSignaturesForAddress",
    timeout: "getSignaturesForAddress timed out; will retry",
    retry: "getSignaturesForAddress failed; retrying",
    exhausted: "getSignaturesForAddress exhausted retries",
    oversized: "getSignaturesForAddress response exceeded HTTP size limit",
    fallback: "routing getSignaturesForAddress to fallback endpoint",
};
