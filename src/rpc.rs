//! JSON-RPC signature source: client, swappable connection handle,
//! authentication, circuit breaker, metrics, and retry policy.

pub mod auth;
pub mod circuit_breaker;
pub mod client;
pub mod connection;
pub mod metrics;
pub mod options;
pub mod retry;

pub use circuit_breaker::{
    BreakerRejected, CircuitBreakerSnapshot, CircuitState, RpcCircuitBreaker,
};
pub use client::{PageRequest, RpcError, SignatureRpcClient, SignatureSource};
pub use connection::ConnectionHandle;
pub use metrics::RpcMetricsSnapshot;
pub use options::{Commitment, RpcClientOptions, RpcCredentials, RpcEndpoints};
