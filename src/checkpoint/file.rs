//! JSON document store. Each write rewrites the whole document to a sibling
//! temp file and renames it over the original, so a crash never leaves a
//! half-written checkpoint behind.

use super::store::CheckpointStore;
use super::types::{
    BackfillCheckpoint, CheckpointKey, FrontfillCheckpoint, StoredBackfill, StoredFrontfill,
    StoredRecord,
};
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

type Document = BTreeMap<String, StoredRecord>;

pub struct JsonFileCheckpointStore {
    path: PathBuf,
    key: CheckpointKey,
    lock: Mutex<()>,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>, network: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: CheckpointKey::new(network),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).with_context(|| {
                format!("failed to parse checkpoint file {}", self.path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read checkpoint file {}", self.path.display())
            }),
        }
    }

    async fn persist(&self, document: &Document) -> Result<()> {
        let encoded =
            serde_json::to_vec_pretty(document).context("failed to encode checkpoint file")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&tmp, &encoded)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    async fn update(&self, record: StoredRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        document.insert(record.id().to_string(), record);
        self.persist(&document).await
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn read_backfill(&self) -> BoxFuture<'_, Result<BackfillCheckpoint>> {
        Box::pin(async move {
            let id = self.key.backfill_id();
            let document = {
                let _guard = self.lock.lock().await;
                self.load().await?
            };
            match document.get(&id) {
                Some(StoredRecord::Backfill(record)) => Ok(record.clone().decode()),
                Some(StoredRecord::Frontfill(_)) => {
                    bail!("checkpoint record {id} holds a frontfill checkpoint")
                }
                None => {
                    tracing::warn!(id = %id, "no backfill checkpoint stored; using defaults");
                    Ok(BackfillCheckpoint::default())
                }
            }
        })
    }

    fn read_frontfill(&self) -> BoxFuture<'_, Result<FrontfillCheckpoint>> {
        Box::pin(async move {
            let id = self.key.frontfill_id();
            let document = {
                let _guard = self.lock.lock().await;
                self.load().await?
            };
            match document.get(&id) {
                Some(StoredRecord::Frontfill(record)) => Ok(record.clone().decode()),
                Some(StoredRecord::Backfill(_)) => {
                    bail!("checkpoint record {id} holds a backfill checkpoint")
                }
                None => {
                    tracing::warn!(id = %id, "no frontfill checkpoint stored; using defaults");
                    Ok(FrontfillCheckpoint::default())
                }
            }
        })
    }

    fn write_backfill<'a>(
        &'a self,
        checkpoint: &'a BackfillCheckpoint,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = StoredBackfill::encode(self.key.backfill_id(), checkpoint);
            self.update(StoredRecord::Backfill(record)).await
        })
    }

    fn write_frontfill<'a>(
        &'a self,
        checkpoint: &'a FrontfillCheckpoint,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = StoredFrontfill::encode(self.key.frontfill_id(), checkpoint);
            self.update(StoredRecord::Frontfill(record)).await
        })
    }
}
