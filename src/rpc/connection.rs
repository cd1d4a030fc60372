//! Swappable RPC connection.
//!
//! The walker holds a [`ConnectionHandle`] rather than a client. Each fetch
//! loads the current client once and keeps that `Arc` until the request
//! finishes, so [`ConnectionHandle::refresh`] never disturbs a request in
//! flight; only later fetches see the new client.

use crate::rpc::circuit_breaker::RpcCircuitBreaker;
use crate::rpc::client::{PageRequest, SignatureRpcClient, SignatureSource};
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::{RpcClientOptions, RpcEndpoints};
use crate::walker::cursor::ConfirmedSignature;
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct ConnectionHandle {
    current: ArcSwap<SignatureRpcClient>,
    endpoints: RpcEndpoints,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    breaker: Arc<RpcCircuitBreaker>,
    generation: AtomicU64,
}

impl ConnectionHandle {
    pub fn connect(endpoints: RpcEndpoints, options: RpcClientOptions) -> Result<Self> {
        let metrics = Arc::new(RpcMetrics::default());
        let breaker = Arc::new(RpcCircuitBreaker::from_options(&options));
        let client = SignatureRpcClient::with_shared_state(
            &endpoints,
            options.clone(),
            metrics.clone(),
            breaker.clone(),
        )?;

        Ok(Self {
            current: ArcSwap::from_pointee(client),
            endpoints,
            options,
            metrics,
            breaker,
            generation: AtomicU64::new(0),
        })
    }

    /// The client subsequent fetches will use.
    pub fn current(&self) -> Arc<SignatureRpcClient> {
        self.current.load_full()
    }

    /// Builds a fresh client from the stored configuration and swaps it in.
    /// Returns the new generation number.
    pub fn refresh(&self) -> Result<u64> {
        let client = SignatureRpcClient::with_shared_state(
            &self.endpoints,
            self.options.clone(),
            self.metrics.clone(),
            self.breaker.clone(),
        )
        .context("failed to rebuild RPC client")?;

        self.current.store(Arc::new(client));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, endpoint = %self.endpoints.primary, "rpc connection replaced");
        Ok(generation)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> &RpcEndpoints {
        &self.endpoints
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot(self.breaker.snapshot().state)
    }
}

impl SignatureSource for ConnectionHandle {
    fn fetch_page<'a>(
        &'a self,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ConfirmedSignature>>> {
        let client = self.current();
        Box::pin(async move { client.get_signatures_for_address(request).await })
    }
}
