use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Request, Response, Server, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One delivery attempt as the queue endpoint saw it.
#[derive(Clone, Debug)]
pub struct QueueDelivery {
    pub path: String,
    pub content_type: Option<String>,
    pub body: Value,
    pub accepted: bool,
}

/// Records every POST; the next `reject_next` attempts get a 503.
#[derive(Clone, Default)]
pub struct MockQueue {
    deliveries: Arc<RwLock<Vec<QueueDelivery>>>,
    rejecting: Arc<AtomicUsize>,
}

impl MockQueue {
    pub fn reject_next(&self, count: usize) {
        self.rejecting.store(count, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<QueueDelivery> {
        self.deliveries.read().expect("mock queue poisoned").clone()
    }

    pub fn accepted(&self) -> Vec<Value> {
        self.deliveries()
            .into_iter()
            .filter(|delivery| delivery.accepted)
            .map(|delivery| delivery.body)
            .collect()
    }

    fn take_rejection(&self) -> bool {
        self.rejecting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct MockQueueServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockQueueServer {
    pub async fn start(queue: MockQueue) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock queue listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock queue address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock queue listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock queue listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let make_service = make_service_fn(move |_| {
            let queue = queue.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| receive(queue.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock queue server")?
            .serve(make_service)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("mock queue server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{addr}/queue"),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn receive(queue: MockQueue, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = body::to_bytes(req.into_body())
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(Value::Null);

    let accepted = !queue.take_rejection();
    queue
        .deliveries
        .write()
        .expect("mock queue poisoned")
        .push(QueueDelivery {
            path,
            content_type,
            body,
            accepted,
        });

    let mut response = Response::new(Body::from(if accepted { "ok" } else { "busy" }));
    if !accepted {
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    }
    Ok(response)
}
