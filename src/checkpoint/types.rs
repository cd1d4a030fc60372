//! Checkpoint records and their persisted schema.
//!
//! Optional fields are stored as explicit `null` rather than sentinel
//! values, so a legitimate `0` block time or slot survives a round trip.
//! Records written by older deployments used `""` for an absent signature;
//! those still decode as absent.

use crate::walker::cursor::{Cursor, SignatureRecord, TieKey};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Progress of the one-time backward traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillCheckpoint {
    /// Oldest signature reached so far while walking backward.
    pub incomplete_top: Option<String>,
    /// Lower bound of the backfill range; `None` walks to genesis.
    pub bottom_sig: Option<String>,
    pub backfill_complete: bool,
}

impl BackfillCheckpoint {
    pub fn in_progress(incomplete_top: Option<String>, bottom_sig: Option<String>) -> Self {
        Self {
            incomplete_top,
            bottom_sig,
            backfill_complete: false,
        }
    }

    pub fn completed() -> Self {
        Self {
            incomplete_top: None,
            bottom_sig: None,
            backfill_complete: true,
        }
    }
}

/// Newest fully processed signature and its ordering key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontfillCheckpoint {
    pub old_top: Option<String>,
    pub old_top_block_time: Option<i64>,
    pub old_top_slot: Option<u64>,
}

impl FrontfillCheckpoint {
    pub fn is_anchored(&self) -> bool {
        self.old_top.is_some()
    }

    pub fn anchor(&self) -> Cursor {
        Cursor::new(
            self.old_top.clone(),
            self.old_top_block_time,
            self.old_top_slot,
        )
    }

    pub fn anchor_key(&self) -> Option<TieKey> {
        self.anchor().tie_key()
    }
}

impl From<&SignatureRecord> for FrontfillCheckpoint {
    fn from(record: &SignatureRecord) -> Self {
        Self {
            old_top: Some(record.signature.clone()),
            old_top_block_time: record.block_time,
            old_top_slot: Some(record.slot),
        }
    }
}

/// Both checkpoints read together; compared field by field by the watchdog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointSnapshot {
    pub backfill: BackfillCheckpoint,
    pub frontfill: FrontfillCheckpoint,
}

/// Network-scoped record ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    network: String,
}

impl CheckpointKey {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn backfill_id(&self) -> String {
        format!("{}-backfill-checkpoint", self.network)
    }

    pub fn frontfill_id(&self) -> String {
        format!("{}-frontfill-checkpoint", self.network)
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBackfill {
    pub id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub incomplete_top: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub bottom_sig: Option<String>,
    #[serde(default)]
    pub backfill_complete: bool,
}

impl StoredBackfill {
    pub fn encode(id: String, checkpoint: &BackfillCheckpoint) -> Self {
        Self {
            id,
            incomplete_top: checkpoint.incomplete_top.clone(),
            bottom_sig: checkpoint.bottom_sig.clone(),
            backfill_complete: checkpoint.backfill_complete,
        }
    }

    pub fn decode(self) -> BackfillCheckpoint {
        BackfillCheckpoint {
            incomplete_top: self.incomplete_top,
            bottom_sig: self.bottom_sig,
            backfill_complete: self.backfill_complete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFrontfill {
    pub id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub old_top: Option<String>,
    #[serde(default)]
    pub old_top_block_time: Option<i64>,
    #[serde(default)]
    pub old_top_slot: Option<u64>,
}

impl StoredFrontfill {
    pub fn encode(id: String, checkpoint: &FrontfillCheckpoint) -> Self {
        Self {
            id,
            old_top: checkpoint.old_top.clone(),
            old_top_block_time: checkpoint.old_top_block_time,
            old_top_slot: checkpoint.old_top_slot,
        }
    }

    pub fn decode(self) -> FrontfillCheckpoint {
        FrontfillCheckpoint {
            old_top: self.old_top,
            old_top_block_time: self.old_top_block_time,
            old_top_slot: self.old_top_slot,
        }
    }
}

/// One persisted record, tagged so a single document can hold both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredRecord {
    Backfill(StoredBackfill),
    Frontfill(StoredFrontfill),
}

impl StoredRecord {
    pub fn id(&self) -> &str {
        match self {
            StoredRecord::Backfill(record) => &record.id,
            StoredRecord::Frontfill(record) => &record.id,
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
