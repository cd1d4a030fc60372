use crate::rpc::options::{Commitment, RpcClientOptions, RpcEndpoints};
use crate::runtime::telemetry;
use crate::walker::{EmptyPageRetry, WalkerSettings, MAX_PAGE_LIMIT};
use crate::walker::empty_retry::{
    DEFAULT_EMPTY_PAGE_INITIAL_DELAY, DEFAULT_EMPTY_PAGE_MULTIPLIER, DEFAULT_EMPTY_PAGE_RETRIES,
};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 30 * 60;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_CHECKPOINT_PATH: &str = "sigfill-checkpoints.json";
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Runtime configuration for the indexer daemon.
///
/// All instances must be constructed via [`IndexerConfig::builder`] or [`IndexerConfig::new`]
/// so every field is validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    rpc_url: String,
    rpc_fallback_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    program_address: String,
    network: String,
    queue_url: Option<String>,
    checkpoint_path: PathBuf,
    commitment: Commitment,
    debug_mode: bool,
    reset_checkpoints: bool,
    frontfill_only: bool,
    page_limit: usize,
    poll_interval: Duration,
    watchdog_interval: Duration,
    refresh_interval: Duration,
    metrics_interval: Duration,
    rpc_timeout: Duration,
    empty_page_retries: usize,
    empty_page_initial_backoff: Duration,
    empty_page_backoff_multiplier: f64,
}

pub struct IndexerConfigParams {
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub program_address: String,
    pub network: String,
    pub queue_url: Option<String>,
    pub checkpoint_path: PathBuf,
    pub commitment: Commitment,
    pub debug_mode: bool,
    pub reset_checkpoints: bool,
    pub frontfill_only: bool,
    pub page_limit: usize,
    pub poll_interval: Duration,
    pub watchdog_interval: Duration,
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub rpc_timeout: Duration,
    pub empty_page_retries: usize,
    pub empty_page_initial_backoff: Duration,
    pub empty_page_backoff_multiplier: f64,
}

impl IndexerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`IndexerConfig::builder`] when most values use defaults.
    pub fn new(params: IndexerConfigParams) -> Result<Self> {
        let IndexerConfigParams {
            rpc_url,
            rpc_fallback_url,
            rpc_user,
            rpc_password,
            program_address,
            network,
            queue_url,
            checkpoint_path,
            commitment,
            debug_mode,
            reset_checkpoints,
            frontfill_only,
            page_limit,
            poll_interval,
            watchdog_interval,
            refresh_interval,
            metrics_interval,
            rpc_timeout,
            empty_page_retries,
            empty_page_initial_backoff,
            empty_page_backoff_multiplier,
        } = params;

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            rpc_fallback_url: trimmed_optional(rpc_fallback_url),
            rpc_user: trimmed_optional(rpc_user),
            rpc_password: trimmed_optional(rpc_password),
            program_address: trimmed_string(program_address),
            network: trimmed_string(network),
            queue_url: trimmed_optional(queue_url),
            checkpoint_path,
            commitment,
            debug_mode,
            reset_checkpoints,
            frontfill_only,
            page_limit,
            poll_interval,
            watchdog_interval,
            refresh_interval,
            metrics_interval,
            rpc_timeout,
            empty_page_retries,
            empty_page_initial_backoff,
            empty_page_backoff_multiplier,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rpc_fallback_url(&self) -> Option<&str> {
        self.rpc_fallback_url.as_deref()
    }

    pub fn program_address(&self) -> &str {
        &self.program_address
    }

    /// Network label scoping checkpoint ids and queue messages.
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn queue_url(&self) -> Option<&str> {
        self.queue_url.as_deref()
    }

    pub fn checkpoint_path(&self) -> &PathBuf {
        &self.checkpoint_path
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// When set, batches are logged and discarded instead of queued.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Clear both checkpoints before the first iteration.
    pub fn reset_checkpoints(&self) -> bool {
        self.reset_checkpoints
    }

    /// Skip backfill regardless of the stored completion flag.
    pub fn frontfill_only(&self) -> bool {
        self.frontfill_only
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    /// Sleep between orchestrator iterations.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn watchdog_interval(&self) -> Duration {
        self.watchdog_interval
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn empty_page_retry(&self) -> EmptyPageRetry {
        EmptyPageRetry::new(
            self.empty_page_retries,
            self.empty_page_initial_backoff,
            self.empty_page_backoff_multiplier,
        )
    }

    pub fn rpc_endpoints(&self) -> RpcEndpoints {
        let mut endpoints = RpcEndpoints::new(self.rpc_url.clone());
        if let Some(fallback) = &self.rpc_fallback_url {
            endpoints = endpoints.with_fallback(fallback.clone());
        }
        if let (Some(user), Some(password)) = (&self.rpc_user, &self.rpc_password) {
            endpoints = endpoints.with_credentials(user.clone(), password.clone());
        }
        endpoints
    }

    pub fn rpc_options(&self) -> RpcClientOptions {
        RpcClientOptions {
            request_timeout: self.rpc_timeout,
            commitment: self.commitment,
            ..RpcClientOptions::default()
        }
    }

    pub fn walker_settings(&self) -> WalkerSettings {
        WalkerSettings::new(self.program_address.clone(), self.network.clone())
            .with_page_limit(self.page_limit)
            .with_empty_page_retry(self.empty_page_retry())
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url, "rpc_url")?;
        if let Some(fallback) = &self.rpc_fallback_url {
            validate_url(fallback, "rpc_fallback_url")?;
        }
        if self.rpc_user.is_some() != self.rpc_password.is_some() {
            bail!("rpc_user and rpc_password must be provided together");
        }

        validate_address(&self.program_address)?;
        ensure_not_empty(&self.network, "network")?;

        match &self.queue_url {
            Some(url) => validate_url(url, "queue_url")?,
            None if !self.debug_mode => bail!("queue_url is required unless debug mode is on"),
            None => {}
        }

        if self.checkpoint_path.as_os_str().is_empty() {
            bail!("checkpoint_path cannot be empty");
        }

        if self.page_limit == 0 || self.page_limit > MAX_PAGE_LIMIT {
            bail!("page_limit must be between 1 and {MAX_PAGE_LIMIT}");
        }

        for (value, field) in [
            (self.poll_interval, "poll_interval"),
            (self.watchdog_interval, "watchdog_interval"),
            (self.refresh_interval, "refresh_interval"),
            (self.metrics_interval, "metrics_interval"),
            (self.rpc_timeout, "rpc_timeout"),
            (self.empty_page_initial_backoff, "empty_page_initial_backoff"),
        ] {
            if value.is_zero() {
                bail!("{field} must be greater than 0");
            }
        }

        if !self.empty_page_backoff_multiplier.is_finite()
            || self.empty_page_backoff_multiplier < 1.0
        {
            bail!("empty_page_backoff_multiplier must be a finite value of at least 1.0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct IndexerConfigBuilder {
    rpc_url: Option<String>,
    rpc_fallback_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    program_address: Option<String>,
    network: Option<String>,
    queue_url: Option<String>,
    checkpoint_path: Option<PathBuf>,
    commitment: Option<Commitment>,
    debug_mode: bool,
    reset_checkpoints: bool,
    frontfill_only: bool,
    page_limit: Option<usize>,
    poll_interval: Option<Duration>,
    watchdog_interval: Option<Duration>,
    refresh_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
    rpc_timeout: Option<Duration>,
    empty_page_retries: Option<usize>,
    empty_page_initial_backoff: Option<Duration>,
    empty_page_backoff_multiplier: Option<f64>,
}

impl IndexerConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_fallback_url = Some(url.into());
        self
    }

    pub fn rpc_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self.rpc_password = Some(password.into());
        self
    }

    pub fn program_address(mut self, address: impl Into<String>) -> Self {
        self.program_address = Some(address.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn queue_url(mut self, url: impl Into<String>) -> Self {
        self.queue_url = Some(url.into());
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = Some(commitment);
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    pub fn reset_checkpoints(mut self, enabled: bool) -> Self {
        self.reset_checkpoints = enabled;
        self
    }

    pub fn frontfill_only(mut self, enabled: bool) -> Self {
        self.frontfill_only = enabled;
        self
    }

    pub fn page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = Some(interval);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn empty_page_retry(mut self, retry: EmptyPageRetry) -> Self {
        self.empty_page_retries = Some(retry.retries);
        self.empty_page_initial_backoff = Some(retry.initial_delay);
        self.empty_page_backoff_multiplier = Some(retry.multiplier);
        self
    }

    pub fn build(self) -> Result<IndexerConfig> {
        let params = IndexerConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            rpc_fallback_url: self.rpc_fallback_url,
            rpc_user: self.rpc_user,
            rpc_password: self.rpc_password,
            program_address: self
                .program_address
                .context("program_address is required")?,
            network: self.network.context("network is required")?,
            queue_url: self.queue_url,
            checkpoint_path: self
                .checkpoint_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            commitment: self.commitment.unwrap_or_default(),
            debug_mode: self.debug_mode,
            reset_checkpoints: self.reset_checkpoints,
            frontfill_only: self.frontfill_only,
            page_limit: self.page_limit.unwrap_or(MAX_PAGE_LIMIT),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            watchdog_interval: self
                .watchdog_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_WATCHDOG_INTERVAL_SECS)),
            refresh_interval: self
                .refresh_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            empty_page_retries: self
                .empty_page_retries
                .unwrap_or(DEFAULT_EMPTY_PAGE_RETRIES),
            empty_page_initial_backoff: self
                .empty_page_initial_backoff
                .unwrap_or(DEFAULT_EMPTY_PAGE_INITIAL_DELAY),
            empty_page_backoff_multiplier: self
                .empty_page_backoff_multiplier
                .unwrap_or(DEFAULT_EMPTY_PAGE_MULTIPLIER),
        };

        IndexerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn trimmed_optional(value: Option<String>) -> Option<String> {
    value
        .map(trimmed_string)
        .filter(|value| !value.is_empty())
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<()> {
    ensure_not_empty(address, "program_address")?;
    if !(32..=44).contains(&address.len()) {
        bail!(
            "program_address must be 32 to 44 base58 characters (got {})",
            address.len()
        );
    }
    if let Some(invalid) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        bail!("program_address contains non-base58 character '{invalid}'");
    }
    Ok(())
}
