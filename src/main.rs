use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sigfill::rpc::Commitment;
use sigfill::{init_tracing, IndexerConfig, Runner};

const DEFAULT_RPC_URL: &str = "http://localhost:8899";
const DEFAULT_NETWORK: &str = "mainnet";
const DEFAULT_PAGE_LIMIT: usize = 1_000;
const DEFAULT_POLL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = config_from_env()?;
    if config.debug_mode() {
        tracing::warn!("debug mode enabled; signature batches will not be queued");
    }

    let runner = Runner::from_config(config)?;
    if let Err(err) = runner.run_until_ctrl_c().await {
        tracing::error!(error = format!("{err:#}"), "indexer exited with a fatal error");
        return Err(err);
    }

    Ok(())
}

fn config_from_env() -> Result<IndexerConfig> {
    let mut builder = IndexerConfig::builder()
        .rpc_url(read_env_or_default("SIGFILL_RPC_URL", DEFAULT_RPC_URL))
        .program_address(read_env_or_default("SIGFILL_PROGRAM_ADDRESS", ""))
        .network(read_env_or_default("SIGFILL_NETWORK", DEFAULT_NETWORK))
        .commitment(parse_env_with_default(
            "SIGFILL_COMMITMENT",
            Commitment::default(),
        )?)
        .debug_mode(read_flag("SIGFILL_DEBUG"))
        .reset_checkpoints(read_flag("SIGFILL_RESET"))
        .frontfill_only(read_flag("SIGFILL_FRONTFILL_ONLY"))
        .page_limit(parse_env_with_default(
            "SIGFILL_PAGE_LIMIT",
            DEFAULT_PAGE_LIMIT,
        )?)
        .poll_interval(Duration::from_secs(parse_env_with_default(
            "SIGFILL_POLL_SECS",
            DEFAULT_POLL_SECS,
        )?));

    if let Some(url) = read_optional_env("SIGFILL_RPC_FALLBACK_URL") {
        builder = builder.rpc_fallback_url(url);
    }
    if let (Some(user), Some(password)) = (
        read_optional_env("SIGFILL_RPC_USER"),
        read_optional_env("SIGFILL_RPC_PASSWORD"),
    ) {
        builder = builder.rpc_credentials(user, password);
    }
    if let Some(url) = read_optional_env("SIGFILL_QUEUE_URL") {
        builder = builder.queue_url(url);
    }
    if let Some(path) = read_optional_env("SIGFILL_CHECKPOINT_PATH") {
        builder = builder.checkpoint_path(PathBuf::from(path));
    }

    builder
        .build()
        .context("invalid SIGFILL_* configuration")
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_flag(key: &str) -> bool {
    read_optional_env(key)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            )
        })
        .unwrap_or(false)
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(default),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(Into::<anyhow::Error>::into)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
