//! In-memory collaborators shared by unit tests.

use crate::publisher::{QueuePublisher, SignatureBatch};
use crate::rpc::{PageRequest, SignatureSource};
use crate::walker::ConfirmedSignature;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type RecordedRequest = (Option<String>, Option<String>, usize);

/// Replays canned pages in order; an exhausted script answers with empty pages.
#[derive(Default)]
pub(crate) struct Scripted {
    responses: Mutex<VecDeque<Vec<ConfirmedSignature>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Scripted {
    pub(crate) fn new(responses: Vec<Vec<ConfirmedSignature>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
        })
    }

    pub(crate) fn push(&self, page: Vec<ConfirmedSignature>) {
        self.responses.lock().unwrap().push_back(page);
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl SignatureSource for Scripted {
    fn fetch_page<'a>(
        &'a self,
        request: PageRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ConfirmedSignature>>> {
        self.requests.lock().unwrap().push((
            request.before.map(str::to_owned),
            request.until.map(str::to_owned),
            request.limit,
        ));
        let next = self.responses.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move { Ok(next) })
    }
}

/// Answers every request with the same page after `latency`, like an
/// upstream that keeps returning data without the cursor getting anywhere new.
pub(crate) struct Repeating {
    page: Vec<ConfirmedSignature>,
    latency: Duration,
    fetches: AtomicUsize,
}

impl Repeating {
    pub(crate) fn new(page: Vec<ConfirmedSignature>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            page,
            latency,
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SignatureSource for Repeating {
    fn fetch_page<'a>(
        &'a self,
        _request: PageRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ConfirmedSignature>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            Ok(self.page.clone())
        })
    }
}

#[derive(Default)]
pub(crate) struct Recording {
    batches: Mutex<Vec<Vec<String>>>,
}

impl Recording {
    pub(crate) fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl QueuePublisher for Recording {
    fn publish(&self, batch: SignatureBatch) {
        self.batches.lock().unwrap().push(batch.signatures);
    }
}

pub(crate) fn sig(id: &str, block_time: i64, slot: u64) -> ConfirmedSignature {
    ConfirmedSignature::new(id, Some(block_time), slot)
}
