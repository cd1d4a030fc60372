//! Cursor, record, and walk-shape types shared by the walker, the checkpoint
//! layer, and the RPC source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Boundary pointer used to bound a page fetch.
///
/// A missing `signature` means the side is unbounded (newest or oldest
/// extreme). `block_time` and `slot` carry the ordering key of the boundary
/// when it is known, which the frontfill tie handling needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub signature: Option<String>,
    pub block_time: Option<i64>,
    pub slot: Option<u64>,
}

impl Cursor {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn at_signature(signature: Option<String>) -> Self {
        Self {
            signature,
            block_time: None,
            slot: None,
        }
    }

    pub fn new(signature: Option<String>, block_time: Option<i64>, slot: Option<u64>) -> Self {
        Self {
            signature,
            block_time,
            slot,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.signature.is_none()
    }

    /// Ordering key of the boundary, if a slot is known.
    pub fn tie_key(&self) -> Option<TieKey> {
        self.slot.map(|slot| TieKey {
            block_time: self.block_time,
            slot,
        })
    }
}

impl From<&SignatureRecord> for Cursor {
    fn from(record: &SignatureRecord) -> Self {
        Self {
            signature: Some(record.signature.clone()),
            block_time: record.block_time,
            slot: Some(record.slot),
        }
    }
}

/// Raw entry returned by the signature source. The id is optional because
/// upstream nodes have been observed to emit entries without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedSignature {
    #[serde(default)]
    pub signature: Option<String>,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl ConfirmedSignature {
    pub fn new(signature: impl Into<String>, block_time: Option<i64>, slot: u64) -> Self {
        Self {
            signature: Some(signature.into()),
            slot,
            block_time,
            err: None,
            memo: None,
            confirmation_status: None,
        }
    }
}

/// One historical event with a defined signature id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signature: String,
    pub block_time: Option<i64>,
    pub slot: u64,
}

impl SignatureRecord {
    pub fn new(signature: impl Into<String>, block_time: Option<i64>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            block_time,
            slot,
        }
    }

    pub fn tie_key(&self) -> TieKey {
        TieKey {
            block_time: self.block_time,
            slot: self.slot,
        }
    }
}

/// `(blockTime, slot)` ordering pair. Records sharing a key have no stable
/// relative order across separate fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TieKey {
    pub block_time: Option<i64>,
    pub slot: u64,
}

impl fmt::Display for TieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_time {
            Some(block_time) => write!(f, "({block_time}, {})", self.slot),
            None => write!(f, "(-, {})", self.slot),
        }
    }
}

/// Direction of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Walking from `before` toward older history down to `until`.
    Backfill,
    /// Walking from the newest signature down to a known `until` anchor.
    Frontfill,
}

impl fmt::Display for WalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkMode::Backfill => f.write_str("backfill"),
            WalkMode::Frontfill => f.write_str("frontfill"),
        }
    }
}

/// Range handed to a single walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkBounds {
    /// Newest exclusive bound; `None` starts at the newest signature.
    pub before: Option<String>,
    /// Oldest exclusive bound together with its ordering key.
    pub until: Cursor,
}

impl WalkBounds {
    pub fn new(before: Option<String>, until: Cursor) -> Self {
        Self { before, until }
    }

    /// Fresh backfill with no resume point and no lower bound.
    pub fn is_fully_unbounded(&self) -> bool {
        self.before.is_none() && self.until.is_unbounded()
    }
}

/// Result of one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Oldest cursor reached, i.e. the `before` the next page would have used.
    pub top: Cursor,
    /// The `until` bound the walk was confined to.
    pub bottom: Cursor,
    /// Newest record observed on the first non-empty page.
    pub frontier: Option<SignatureRecord>,
    pub pages: usize,
    pub published: usize,
}
