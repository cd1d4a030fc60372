use crate::rpc::options::RpcClientOptions;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Externally visible breaker state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    /// How long the breaker has been open, if it is.
    pub open_for: Option<Duration>,
    /// Number of times the breaker has tripped since it was created.
    pub trips: u64,
}

/// The breaker refused an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerRejected {
    /// Time left in the cool-down; `None` while the half-open trials are all
    /// in flight.
    pub retry_in: Option<Duration>,
}

impl std::fmt::Display for BreakerRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.retry_in {
            Some(delay) => write!(
                f,
                "rpc circuit breaker is open; next trial in {}ms",
                delay.as_millis()
            ),
            None => write!(f, "rpc circuit breaker is half-open; no trial permits left"),
        }
    }
}

impl std::error::Error for BreakerRejected {}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { trials: usize },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    consecutive_failures: usize,
    trips: u64,
}

impl Inner {
    fn state(&self) -> CircuitState {
        match self.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Closed/Open/Half-Open breaker shared by every client built from one
/// [`ConnectionHandle`](crate::rpc::ConnectionHandle), so a refresh does not
/// reset the failure history.
#[derive(Debug, Clone)]
pub struct RpcCircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    failure_threshold: usize,
    cooldown: Duration,
    half_open_trials: usize,
}

impl Default for RpcCircuitBreaker {
    fn default() -> Self {
        Self::from_options(&RpcClientOptions::default())
    }
}

impl RpcCircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration, half_open_trials: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Closed,
                consecutive_failures: 0,
                trips: 0,
            })),
            failure_threshold: failure_threshold.max(1),
            cooldown: cooldown.max(Duration::from_secs(1)),
            half_open_trials: half_open_trials.max(1),
        }
    }

    pub fn from_options(options: &RpcClientOptions) -> Self {
        Self::new(
            options.breaker_failure_threshold,
            options.breaker_cooldown,
            options.breaker_half_open_sample,
        )
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state: inner.state(),
            consecutive_failures: inner.consecutive_failures,
            open_for: match inner.phase {
                Phase::Open { since } => Some(since.elapsed()),
                _ => None,
            },
            trips: inner.trips,
        }
    }

    /// Grants one attempt, taking a trial slot while half-open. A cooled-down
    /// open breaker moves to half-open here.
    pub fn try_acquire(&self) -> Result<CircuitState, BreakerRejected> {
        let mut inner = self.lock();

        if let Phase::Open { since } = inner.phase {
            let elapsed = since.elapsed();
            if elapsed < self.cooldown {
                return Err(BreakerRejected {
                    retry_in: Some(self.cooldown - elapsed),
                });
            }
            self.enter(&mut inner, Phase::HalfOpen { trials: 0 });
        }

        if let Phase::HalfOpen { trials } = inner.phase {
            if trials >= self.half_open_trials {
                return Err(BreakerRejected { retry_in: None });
            }
            inner.phase = Phase::HalfOpen { trials: trials + 1 };
        }

        Ok(inner.state())
    }

    pub fn on_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if let Phase::HalfOpen { .. } = inner.phase {
            self.enter(&mut inner, Phase::Closed);
        }
    }

    /// A failed trial reopens immediately; a closed breaker opens once the
    /// failure threshold is reached.
    pub fn on_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trip = match inner.phase {
            Phase::HalfOpen { .. } => true,
            Phase::Closed => inner.consecutive_failures >= self.failure_threshold,
            Phase::Open { .. } => false,
        };
        if trip {
            inner.trips += 1;
            self.enter(
                &mut inner,
                Phase::Open {
                    since: Instant::now(),
                },
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    fn enter(&self, inner: &mut Inner, next: Phase) {
        let previous = inner.state();
        inner.phase = next;
        if previous != inner.state() {
            tracing::warn!(
                previous = ?previous,
                next = ?inner.state(),
                consecutive_failures = inner.consecutive_failures,
                trips = inner.trips,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "rpc circuit breaker state changed"
            );
        }
    }
}
