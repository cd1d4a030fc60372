//! JSON-RPC signature source. Houses the `SignatureSource` seam consumed by
//! the walker, `SignatureRpcClient` (paged `getSignaturesForAddress` with
//! breaker-gated retries and endpoint fallback) and the RPC error type.

use crate::rpc::auth::build_headers;
use crate::rpc::circuit_breaker::RpcCircuitBreaker;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::{RpcClientOptions, RpcEndpoints};
use crate::rpc::retry::{RetryContext, GET_SIGNATURES_RETRY};
use crate::walker::cursor::ConfirmedSignature;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Serialize;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{sleep, timeout, Instant};

const GET_SIGNATURES_METHOD: &str = "getSignaturesForAddress";

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    CircuitOpen,
    ResponseTooLarge { method: &'static str },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::CircuitOpen => write!(f, "rpc circuit breaker is open"),
            RpcError::ResponseTooLarge { method } => {
                write!(f, "rpc {method} response exceeded HTTP size limits")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// One page request. Both cursors are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub address: &'a str,
    pub before: Option<&'a str>,
    pub until: Option<&'a str>,
    pub limit: usize,
}

/// Source of signature pages for one address.
///
/// Implementations answer newest-first, return an empty list when the range
/// holds nothing, and retry transient transport failures themselves: an
/// `Err` is treated as fatal by the caller.
pub trait SignatureSource: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ConfirmedSignature>>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignaturesForAddressConfig<'a> {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    until: Option<&'a str>,
    commitment: &'static str,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    client: HttpClient,
}

#[derive(Debug, Clone)]
pub struct SignatureRpcClient {
    endpoints: Arc<Vec<Endpoint>>,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    breaker: Arc<RpcCircuitBreaker>,
}

impl SignatureSource for SignatureRpcClient {
    fn fetch_page<'a>(
        &'a self,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ConfirmedSignature>>> {
        Box::pin(self.get_signatures_for_address(request))
    }
}

impl SignatureRpcClient {
    pub fn new(endpoints: &RpcEndpoints, options: RpcClientOptions) -> Result<Self> {
        let breaker = Arc::new(RpcCircuitBreaker::from_options(&options));
        Self::with_breaker(endpoints, options, breaker)
    }

    pub fn with_breaker(
        endpoints: &RpcEndpoints,
        options: RpcClientOptions,
        breaker: Arc<RpcCircuitBreaker>,
    ) -> Result<Self> {
        Self::with_shared_state(endpoints, options, Arc::new(RpcMetrics::default()), breaker)
    }

    /// Builds a client that reports into existing metrics and breaker state.
    pub(crate) fn with_shared_state(
        endpoints: &RpcEndpoints,
        options: RpcClientOptions,
        metrics: Arc<RpcMetrics>,
        breaker: Arc<RpcCircuitBreaker>,
    ) -> Result<Self> {
        options.validate()?;

        let headers = build_headers(endpoints.credentials.as_ref())?;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let built = endpoints
            .urls()
            .map(|url| {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(anyhow!("rpc url '{url}' must start with http:// or https://"));
                }
                let client = HttpClientBuilder::default()
                    .set_headers(headers.clone())
                    .request_timeout(options.request_timeout)
                    .max_concurrent_requests(options.max_concurrent_requests)
                    .max_response_size(max_response_body_size)
                    .build(url)
                    .map_err(|err| anyhow!("failed to build RPC client for {url}: {err}"))?;
                Ok(Endpoint {
                    url: url.to_owned(),
                    client,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoints: Arc::new(built),
            options,
            metrics,
            breaker,
        })
    }

    pub fn endpoints(&self) -> Vec<&str> {
        self.endpoints
            .iter()
            .map(|endpoint| endpoint.url.as_str())
            .collect()
    }

    pub fn options(&self) -> &RpcClientOptions {
        &self.options
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot(self.breaker.snapshot().state)
    }

    pub async fn get_signatures_for_address(
        &self,
        request: PageRequest<'_>,
    ) -> Result<Vec<ConfirmedSignature>> {
        let context = RetryContext::new(&GET_SIGNATURES_RETRY, request.address, request.before);
        let request = &request;

        self.retry_with_breaker(
            context,
            move |endpoint| self.fetch_once(endpoint, request),
            |attempt, signatures: &Vec<ConfirmedSignature>| {
                tracing::debug!(
                    attempt,
                    count = signatures.len(),
                    "getSignaturesForAddress completed successfully"
                );
            },
        )
        .await
    }

    /// Endpoint used by the given 1-based attempt; attempts alternate between
    /// the primary and the fallback.
    fn endpoint_for(&self, attempt: usize) -> usize {
        attempt.saturating_sub(1) % self.endpoints.len().max(1)
    }

    /// Shared retry/backoff loop that wraps RPC operations with breaker gating, metrics,
    /// exponential backoff, endpoint fallback, and consistent logging.
    async fn retry_with_breaker<T, F, Fut, S>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
        mut on_success: S,
    ) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
        S: FnMut(usize, &T),
        T: Counted,
    {
        let mut attempt = 0;

        loop {
            match self.breaker.try_acquire() {
                Ok(state) => context.log_permit(state),
                Err(rejected) => {
                    context.log_circuit_open(rejected.retry_in);
                    return Err(RpcError::CircuitOpen.into());
                }
            }

            attempt += 1;
            let endpoint = self.endpoint_for(attempt);
            let endpoint_url = self.endpoint_url(endpoint);
            if endpoint > 0 {
                self.metrics.record_fallback();
                context.log_fallback(attempt, endpoint_url);
            }
            let start = Instant::now();

            match operation(endpoint).await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed(), value.count());
                    self.breaker.on_success();
                    on_success(attempt, &value);
                    return Ok(value);
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    let will_retry = attempt < self.options.max_attempts;
                    let backoff = self.backoff_delay(attempt);

                    match err.downcast_ref::<RpcError>() {
                        Some(RpcError::ResponseTooLarge { .. }) => {
                            self.metrics.record_failure(elapsed);
                            self.breaker.on_failure();
                            context.log_oversized(attempt, endpoint_url);
                            return Err(err);
                        }
                        Some(RpcError::Timeout { .. }) => {
                            self.metrics.record_timeout(elapsed);
                            self.breaker.on_failure();
                            if will_retry {
                                context.log_timeout(attempt, endpoint_url, backoff);
                            }
                        }
                        _ => {
                            self.metrics.record_failure(elapsed);
                            self.breaker.on_failure();
                            if will_retry {
                                context.log_retry(attempt, endpoint_url, backoff, &err);
                            }
                        }
                    }

                    if !will_retry {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    sleep(backoff).await;
                }
            }
        }
    }

    fn endpoint_url(&self, endpoint: usize) -> &str {
        self.endpoints
            .get(endpoint)
            .map(|endpoint| endpoint.url.as_str())
            .unwrap_or_default()
    }

    async fn fetch_once(
        &self,
        endpoint: usize,
        request: &PageRequest<'_>,
    ) -> Result<Vec<ConfirmedSignature>> {
        let client = &self
            .endpoints
            .get(endpoint)
            .ok_or_else(|| anyhow!("no rpc endpoint configured"))?
            .client;

        let config = SignaturesForAddressConfig {
            limit: request.limit,
            before: request.before,
            until: request.until,
            commitment: self.options.commitment.as_str(),
        };

        timeout(
            self.options.request_timeout,
            client.request::<Vec<ConfirmedSignature>, _>(
                GET_SIGNATURES_METHOD,
                rpc_params![request.address, config],
            ),
        )
        .await
        .map_err(|_| RpcError::Timeout {
            method: GET_SIGNATURES_METHOD,
        })?
        .map_err(|err| map_rpc_error(GET_SIGNATURES_METHOD, err))
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.options.initial_backoff;
        }

        let exponent = attempt.saturating_sub(1) as u32;
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.options
            .initial_backoff
            .saturating_mul(multiplier)
            .min(self.options.max_backoff)
    }
}

/// Result size reported to the request metrics.
trait Counted {
    fn count(&self) -> usize;
}

impl<T> Counted for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method: label }.into();
    }
    anyhow!("rpc {label} call failed: {err}")
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => match inner.downcast_ref::<HttpTransportError>() {
            Some(HttpTransportError::Http(http_err)) => matches!(http_err, HttpError::TooLarge),
            Some(HttpTransportError::RequestTooLarge) => true,
            _ => false,
        },
        _ => false,
    }
}
