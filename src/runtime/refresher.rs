use crate::rpc::ConnectionHandle;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically swaps the RPC client behind a [`ConnectionHandle`] so no
/// connection lives long enough to hang.
pub struct ConnectionRefresher {
    connection: Arc<ConnectionHandle>,
    telemetry: Arc<Telemetry>,
    interval: Duration,
}

impl ConnectionRefresher {
    pub fn new(
        connection: Arc<ConnectionHandle>,
        telemetry: Arc<Telemetry>,
        interval: Duration,
    ) -> Self {
        Self {
            connection,
            telemetry,
            interval,
        }
    }

    /// Replaces the client once. Failures keep the previous client in place.
    pub fn refresh_once(&self) -> bool {
        match self.connection.refresh() {
            Ok(generation) => {
                self.telemetry.record_connection_refresh();
                tracing::info!(generation, "rpc connection refreshed");
                true
            }
            Err(err) => {
                tracing::warn!(
                    error = format!("{err:#}"),
                    "rpc connection refresh failed; keeping current client"
                );
                false
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("connection refresher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh_once();
                    }
                }
            }
        })
    }
}
