use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct LedgerEntry {
    pub signature: String,
    pub block_time: i64,
    pub slot: u64,
}

/// One `getSignaturesForAddress` call as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeenRequest {
    pub address: String,
    pub before: Option<String>,
    pub until: Option<String>,
    pub limit: usize,
    pub commitment: Option<String>,
    pub authorization: Option<String>,
}

/// Signature history of a single address, oldest entry first.
#[derive(Clone, Default)]
pub struct MockLedger {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
    requests: Arc<RwLock<Vec<SeenRequest>>>,
    failing_requests: Arc<AtomicUsize>,
}

impl MockLedger {
    /// `count` signatures `sig-000`, `sig-001`, ... one per slot, oldest first.
    pub fn with_history(count: usize) -> Self {
        let ledger = Self::default();
        for index in 0..count {
            ledger.append(format!("sig-{index:03}"));
        }
        ledger
    }

    /// Appends a signature in the next slot.
    pub fn append(&self, signature: impl Into<String>) {
        let mut entries = self.entries.write().expect("mock ledger poisoned");
        let slot = entries.last().map(|entry| entry.slot + 1).unwrap_or(100);
        entries.push(LedgerEntry {
            signature: signature.into(),
            block_time: 1_700_000_000 + slot as i64,
            slot,
        });
    }

    pub fn signatures(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("mock ledger poisoned")
            .iter()
            .map(|entry| entry.signature.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.read().expect("mock ledger poisoned").clone()
    }

    /// The next `count` HTTP requests answer with a 500.
    pub fn fail_next_requests(&self, count: usize) {
        self.failing_requests.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Newest-first page strictly between `until` and `before`.
    fn page(&self, before: Option<&str>, until: Option<&str>, limit: usize) -> Vec<LedgerEntry> {
        let entries = self.entries.read().expect("mock ledger poisoned");
        let upper = before
            .and_then(|sig| entries.iter().position(|entry| entry.signature == sig))
            .unwrap_or(entries.len());
        let lower = until
            .and_then(|sig| entries.iter().position(|entry| entry.signature == sig))
            .map(|index| index + 1)
            .unwrap_or(0);
        if lower >= upper {
            return Vec::new();
        }
        entries[lower..upper]
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn record(&self, request: SeenRequest) {
        self.requests
            .write()
            .expect("mock ledger poisoned")
            .push(request);
    }
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(ledger: MockLedger) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let ledger = ledger.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(ledger.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
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

async fn serve_request(ledger: MockLedger, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    if ledger.take_failure() {
        let mut response = Response::new(Body::from("upstream unavailable"));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return Ok(response);
    }

    let authorization = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = handle_call(&ledger, payload, authorization);
    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(ledger: &MockLedger, call: Value, authorization: Option<String>) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if method != "getSignaturesForAddress" {
        return error(id, -32601, format!("unknown method {method}"));
    }

    let Some(address) = params.first().and_then(Value::as_str) else {
        return error(id, -32602, "missing address");
    };
    let config = params.get(1).cloned().unwrap_or(Value::Null);
    let text = |field: &str| config.get(field).and_then(Value::as_str).map(str::to_owned);
    let request = SeenRequest {
        address: address.to_owned(),
        before: text("before"),
        until: text("until"),
        limit: config
            .get("limit")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize)
            .unwrap_or(1_000),
        commitment: text("commitment"),
        authorization,
    };

    let page = ledger.page(
        request.before.as_deref(),
        request.until.as_deref(),
        request.limit,
    );
    ledger.record(request);

    let result: Vec<Value> = page
        .into_iter()
        .map(|entry| {
            json!({
                "signature": entry.signature,
                "slot": entry.slot,
                "blockTime": entry.block_time,
                "err": null,
                "memo": null,
                "confirmationStatus": "finalized",
            })
        })
        .collect();
    success(id, Value::Array(result))
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
