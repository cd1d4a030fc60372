//! HTTP queue publisher: POSTs each batch as JSON to the configured queue
//! endpoint from a detached task.

use super::{QueuePublisher, SignatureBatch};
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct HttpQueuePublisher {
    client: Client,
    queue_url: Arc<String>,
    telemetry: Arc<Telemetry>,
    runtime: Handle,
    retry_delay: Duration,
}

impl HttpQueuePublisher {
    /// Must be called from within a Tokio runtime; batches are delivered on it.
    pub fn new(queue_url: impl Into<String>, telemetry: Arc<Telemetry>) -> Result<Self> {
        let queue_url = queue_url.into();
        if !(queue_url.starts_with("http://") || queue_url.starts_with("https://")) {
            bail!("queue_url must start with http:// or https://");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build queue HTTP client")?;
        let runtime = Handle::try_current().context("queue publisher requires a Tokio runtime")?;

        Ok(Self {
            client,
            queue_url: Arc::new(queue_url),
            telemetry,
            runtime,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Base delay between delivery attempts; attempt `n` waits `n` times this.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn deliver(
        client: Client,
        url: Arc<String>,
        retry_delay: Duration,
        batch: SignatureBatch,
    ) -> Result<()> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match client.post(url.as_str()).json(&batch).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        attempt,
                        count = batch.len(),
                        status = %response.status(),
                        "signature batch delivered"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(attempt, %status, body = %body, "queue rejected signature batch");
                    last_error = Some(anyhow!("queue responded with status {status}"));
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "queue request failed");
                    last_error = Some(anyhow!(err).context("queue request failed"));
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(retry_delay * attempt).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("queue delivery failed")))
    }
}

impl QueuePublisher for HttpQueuePublisher {
    fn publish(&self, batch: SignatureBatch) {
        if batch.is_empty() {
            return;
        }

        let client = self.client.clone();
        let url = self.queue_url.clone();
        let telemetry = self.telemetry.clone();
        let retry_delay = self.retry_delay;
        let count = batch.len();

        self.runtime.spawn(async move {
            if let Err(err) = Self::deliver(client, url, retry_delay, batch).await {
                telemetry.record_publish_failure();
                tracing::error!(
                    error = %err,
                    count,
                    attempts = MAX_ATTEMPTS,
                    "failed to deliver signature batch; dropping"
                );
            }
        });
    }
}
