use std::sync::Arc;

use crate::support::{
    helpers::{
        assert_published_once, fast_empty_retry, init_tracing, RecordingPublisher,
        PROGRAM_ADDRESS,
    },
    mock_rpc::{MockLedger, MockRpcServer},
};
use anyhow::Result;
use sigfill::rpc::{RpcClientOptions, RpcEndpoints};
use sigfill::{
    Checkpoints, ConnectionHandle, Iteration, MemoryCheckpointStore, ModeOrchestrator,
    SignatureSource, SignatureWalker, Telemetry, WalkerSettings,
};

struct Pipeline {
    orchestrator: ModeOrchestrator,
    store: Arc<MemoryCheckpointStore>,
    publisher: RecordingPublisher,
}

fn pipeline(source: Arc<dyn SignatureSource>, network: &str) -> Pipeline {
    let store = Arc::new(MemoryCheckpointStore::new(network));
    let publisher = RecordingPublisher::default();
    let telemetry = Arc::new(Telemetry::default());
    let walker = SignatureWalker::new(
        source,
        Checkpoints::new(store.clone(), telemetry.clone()),
        Arc::new(publisher.clone()),
        telemetry,
        WalkerSettings::new(PROGRAM_ADDRESS, network)
            .with_page_limit(3)
            .with_empty_page_retry(fast_empty_retry()),
    );
    Pipeline {
        orchestrator: ModeOrchestrator::new(walker),
        store,
        publisher,
    }
}

fn connect(endpoints: RpcEndpoints) -> Result<Arc<ConnectionHandle>> {
    Ok(Arc::new(ConnectionHandle::connect(
        endpoints,
        RpcClientOptions::default(),
    )?))
}

fn names(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|index| format!("sig-{index:03}")).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backfill_then_frontfill_over_json_rpc() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::with_history(7);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let connection = connect(RpcEndpoints::new(server.url()))?;
    let mut pipeline = pipeline(connection.clone(), "mainnet");

    let iteration = pipeline.orchestrator.run_once().await?;
    assert!(matches!(iteration, Iteration::Backfill(ref outcome) if outcome.pages == 3));
    assert_eq!(
        pipeline.publisher.batches(),
        vec![names(4..7), names(1..4), names(0..1)]
    );
    assert!(pipeline.store.backfill().backfill_complete);
    assert_eq!(pipeline.store.frontfill().old_top.as_deref(), Some("sig-006"));

    ledger.append("sig-007");
    ledger.append("sig-008");
    let iteration = pipeline.orchestrator.run_once().await?;
    assert!(matches!(iteration, Iteration::Frontfill(_)));

    let frontfill_request = ledger
        .requests()
        .into_iter()
        .find(|request| request.until.as_deref() == Some("sig-006"))
        .expect("frontfill request bounded by the anchor");
    assert_eq!(frontfill_request.before, None);
    assert_eq!(frontfill_request.limit, 3);
    assert_eq!(frontfill_request.commitment.as_deref(), Some("finalized"));
    assert_eq!(frontfill_request.address, PROGRAM_ADDRESS);

    let mut expected = names(4..7);
    expected.extend(names(1..4));
    expected.extend(names(0..1));
    expected.extend(names(7..9));
    assert_published_once(&pipeline.publisher.published(), &expected);
    assert_eq!(pipeline.store.frontfill().old_top.as_deref(), Some("sig-008"));
    assert!(pipeline.publisher.networks().iter().all(|network| network == "mainnet"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_frontfill_poll_publishes_nothing() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::with_history(2);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let mut pipeline = pipeline(connect(RpcEndpoints::new(server.url()))?, "devnet");

    pipeline.orchestrator.run_once().await?;
    let anchor = pipeline.store.frontfill();
    let history = pipeline.store.history().len();

    let iteration = pipeline.orchestrator.run_once().await?;

    assert!(matches!(iteration, Iteration::Frontfill(ref outcome) if outcome.pages == 0));
    assert_eq!(pipeline.publisher.published(), names(0..2));
    assert_eq!(pipeline.store.frontfill(), anchor);
    assert_eq!(pipeline.store.history().len(), history);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_rpc_failures_are_retried() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::with_history(3);
    ledger.fail_next_requests(2);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let connection = connect(RpcEndpoints::new(server.url()))?;
    let mut pipeline = pipeline(connection.clone(), "mainnet");

    pipeline.orchestrator.run_once().await?;

    assert_eq!(pipeline.publisher.published(), names(0..3));
    let metrics = connection.metrics();
    assert_eq!(metrics.total_errors, 2);
    assert!(metrics.total_requests > metrics.total_errors);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_primary_falls_back_and_credentials_are_sent() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::with_history(2);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let endpoints = RpcEndpoints::new("http://127.0.0.1:9")
        .with_fallback(server.url())
        .with_credentials("user", "pass");
    let connection = connect(endpoints)?;
    let mut pipeline = pipeline(connection.clone(), "mainnet");

    pipeline.orchestrator.run_once().await?;

    assert_eq!(pipeline.publisher.published(), names(0..2));
    assert!(connection.metrics().fallback_requests >= 1);
    let requests = ledger.requests();
    assert!(!requests.is_empty());
    assert!(requests
        .iter()
        .all(|request| request.authorization.as_deref() == Some("Basic dXNlcjpwYXNz")));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refreshed_connection_keeps_walking() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::with_history(4);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let connection = connect(RpcEndpoints::new(server.url()))?;
    let mut pipeline = pipeline(connection.clone(), "mainnet");

    pipeline.orchestrator.run_once().await?;
    connection.refresh()?;
    ledger.append("sig-004");
    pipeline.orchestrator.run_once().await?;

    assert_eq!(connection.generation(), 1);
    let mut expected = names(1..4);
    expected.extend(names(0..1));
    expected.extend(names(4..5));
    assert_published_once(&pipeline.publisher.published(), &expected);

    server.shutdown().await;
    Ok(())
}
