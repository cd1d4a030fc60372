use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{
        fast_empty_retry, init_tracing, wait_for_published, RecordingPublisher, PROGRAM_ADDRESS,
    },
    mock_rpc::{MockLedger, MockRpcServer},
};
use anyhow::{Context, Result};
use sigfill::{CheckpointStore, IndexerConfig, JsonFileCheckpointStore, Runner, Telemetry};
use tokio::time::timeout;

fn config(rpc_url: &str, checkpoint_path: &Path, reset: bool) -> Result<IndexerConfig> {
    IndexerConfig::builder()
        .rpc_url(rpc_url)
        .program_address(PROGRAM_ADDRESS)
        .network("testnet")
        .debug_mode(true)
        .checkpoint_path(checkpoint_path)
        .reset_checkpoints(reset)
        .page_limit(3)
        .poll_interval(Duration::from_millis(50))
        .empty_page_retry(fast_empty_retry())
        .build()
}

fn runner(config: IndexerConfig, publisher: &RecordingPublisher) -> Result<Arc<Runner>> {
    let store = Arc::new(JsonFileCheckpointStore::new(
        config.checkpoint_path().clone(),
        config.network(),
    ));
    Ok(Arc::new(Runner::new(
        config,
        store,
        Arc::new(publisher.clone()),
        Arc::new(Telemetry::default()),
    )?))
}

/// Runs until `expected` signatures were published, then cancels and waits
/// for a clean shutdown.
async fn run_until_published(
    runner: Arc<Runner>,
    publisher: &RecordingPublisher,
    expected: usize,
) -> Result<()> {
    let token = runner.cancellation_token();
    let task = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run().await }
    });

    wait_for_published(publisher, expected, Duration::from_secs(10)).await?;
    // let the walk reach its termination checkpoint
    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();

    timeout(Duration::from_secs(10), task)
        .await
        .context("runner should stop after cancellation")??
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_persists_progress_and_resumes_after_restart() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("checkpoints.json");
    let ledger = MockLedger::with_history(5);
    let server = MockRpcServer::start(ledger.clone()).await?;

    let first = RecordingPublisher::default();
    run_until_published(runner(config(server.url(), &path, false)?, &first)?, &first, 5).await?;
    let mut published = first.published();
    published.sort();
    assert_eq!(published, ledger.signatures());

    let store = JsonFileCheckpointStore::new(&path, "testnet");
    assert!(store.read_backfill().await?.backfill_complete);
    assert_eq!(store.read_frontfill().await?.old_top.as_deref(), Some("sig-004"));

    ledger.append("sig-005");
    ledger.append("sig-006");
    let second = RecordingPublisher::default();
    run_until_published(runner(config(server.url(), &path, false)?, &second)?, &second, 2).await?;
    assert_eq!(second.batches(), vec![vec!["sig-005", "sig-006"]]);
    assert_eq!(store.read_frontfill().await?.old_top.as_deref(), Some("sig-006"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_flag_replays_full_history() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("checkpoints.json");
    let ledger = MockLedger::with_history(4);
    let server = MockRpcServer::start(ledger.clone()).await?;

    let first = RecordingPublisher::default();
    run_until_published(runner(config(server.url(), &path, false)?, &first)?, &first, 4).await?;

    let replay = RecordingPublisher::default();
    run_until_published(runner(config(server.url(), &path, true)?, &replay)?, &replay, 4).await?;

    let mut replayed = replay.published();
    replayed.sort();
    assert_eq!(replayed, ledger.signatures());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_exits_when_rpc_retries_are_exhausted() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("checkpoints.json");
    let ledger = MockLedger::with_history(3);
    ledger.fail_next_requests(usize::MAX);
    let server = MockRpcServer::start(ledger).await?;

    let publisher = RecordingPublisher::default();
    let runner = runner(config(server.url(), &path, false)?, &publisher)?;
    let outcome = timeout(Duration::from_secs(30), runner.run())
        .await
        .context("runner should stop after exhausting RPC retries")?;

    let err = outcome.expect_err("rpc outage should abort runner");
    let message = format!("{err:#}");
    assert!(
        message.contains("failed to fetch signatures"),
        "runner did not propagate the fetch failure, got {message}"
    );
    assert!(runner.cancellation_token().is_cancelled());
    assert!(publisher.published().is_empty());

    server.shutdown().await;
    Ok(())
}
