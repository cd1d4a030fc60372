use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, wait_until},
    mock_queue::{MockQueue, MockQueueServer},
};
use anyhow::Result;
use serde_json::json;
use sigfill::{HttpQueuePublisher, QueuePublisher, SignatureBatch, Telemetry};

fn publisher(url: &str, telemetry: &Arc<Telemetry>) -> Result<HttpQueuePublisher> {
    Ok(HttpQueuePublisher::new(url, telemetry.clone())?
        .with_retry_delay(Duration::from_millis(10)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_is_posted_as_json() -> Result<()> {
    init_tracing();
    let queue = MockQueue::default();
    let server = MockQueueServer::start(queue.clone()).await?;
    let telemetry = Arc::new(Telemetry::default());

    publisher(server.url(), &telemetry)?.publish(SignatureBatch::new(
        "mainnet",
        vec!["sig-000".into(), "sig-001".into()],
    ));
    wait_until("one delivery", Duration::from_secs(10), || {
        queue.accepted().len() == 1
    })
    .await?;

    let deliveries = queue.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].path, "/queue");
    assert_eq!(deliveries[0].content_type.as_deref(), Some("application/json"));
    assert_eq!(
        deliveries[0].body,
        json!({ "network": "mainnet", "signatures": ["sig-000", "sig-001"] })
    );
    assert_eq!(telemetry.snapshot().publish_failures, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_delivery_is_retried() -> Result<()> {
    init_tracing();
    let queue = MockQueue::default();
    queue.reject_next(2);
    let server = MockQueueServer::start(queue.clone()).await?;
    let telemetry = Arc::new(Telemetry::default());

    publisher(server.url(), &telemetry)?
        .publish(SignatureBatch::new("devnet", vec!["sig-007".into()]));
    wait_until("an accepted delivery", Duration::from_secs(10), || {
        !queue.accepted().is_empty()
    })
    .await?;

    let deliveries = queue.deliveries();
    assert_eq!(deliveries.len(), 3);
    assert!(deliveries.iter().all(|delivery| delivery.body == deliveries[0].body));
    assert_eq!(
        deliveries.iter().map(|delivery| delivery.accepted).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert_eq!(telemetry.snapshot().publish_failures, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_is_dropped_and_counted_after_three_rejections() -> Result<()> {
    init_tracing();
    let queue = MockQueue::default();
    queue.reject_next(usize::MAX);
    let server = MockQueueServer::start(queue.clone()).await?;
    let telemetry = Arc::new(Telemetry::default());

    publisher(server.url(), &telemetry)?
        .publish(SignatureBatch::new("devnet", vec!["sig-009".into()]));
    wait_until("the delivery failure", Duration::from_secs(10), || {
        telemetry.snapshot().publish_failures == 1
    })
    .await?;

    assert_eq!(queue.deliveries().len(), 3);
    assert!(queue.accepted().is_empty());

    server.shutdown().await;
    Ok(())
}
