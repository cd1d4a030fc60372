//! Page normalization: the source answers newest-first and may contain
//! entries without an id; the walker works on oldest-first defined records.

use super::cursor::{ConfirmedSignature, SignatureRecord};
use chrono::DateTime;

/// Oldest-first page of records with defined ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePage {
    records: Vec<SignatureRecord>,
}

impl SignaturePage {
    /// Reverses a newest-first source response, skipping (and logging) any
    /// entry without a signature. Returns the page and the skipped count.
    pub fn from_newest_first(raw: Vec<ConfirmedSignature>) -> (Self, usize) {
        let mut skipped = 0;
        let mut records = Vec::with_capacity(raw.len());

        for entry in raw.into_iter().rev() {
            match entry.signature {
                Some(signature) if !signature.is_empty() => records.push(SignatureRecord {
                    signature,
                    block_time: entry.block_time,
                    slot: entry.slot,
                }),
                _ => {
                    skipped += 1;
                    tracing::error!(
                        slot = entry.slot,
                        block_time = ?entry.block_time,
                        "null signature detected; skipping entry"
                    );
                }
            }
        }

        (Self { records }, skipped)
    }

    pub fn from_records(records: Vec<SignatureRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[SignatureRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<SignatureRecord> {
        &mut self.records
    }

    /// Oldest entry.
    pub fn bottom(&self) -> Option<&SignatureRecord> {
        self.records.first()
    }

    /// Newest entry.
    pub fn top(&self) -> Option<&SignatureRecord> {
        self.records.last()
    }

    pub fn signatures(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| record.signature.clone())
            .collect()
    }
}

/// Renders a block time for log lines.
pub(crate) fn display_block_time(block_time: Option<i64>) -> String {
    block_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| "<unknown>".to_owned())
}
