//! Boundary-tie tracking for frontfill polling.
//!
//! Several signatures can share one `(blockTime, slot)` pair and the source
//! does not order them stably across calls. When a page boundary falls inside
//! such a group, a signature that was already published can come back on the
//! other side of the boundary. The tracker remembers, per tied pair, which
//! ids were already emitted and filters them from the edges of later pages.

use super::cursor::{SignatureRecord, TieKey};
use super::page::SignaturePage;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone)]
pub struct TieTracker {
    groups: HashMap<TieKey, HashSet<String>>,
}

impl TieTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn tracked_keys(&self) -> impl Iterator<Item = &TieKey> {
        self.groups.keys()
    }

    pub fn contains(&self, record: &SignatureRecord) -> bool {
        self.groups
            .get(&record.tie_key())
            .is_some_and(|ids| ids.contains(&record.signature))
    }

    /// Marks a single signature as already emitted for `key`.
    pub fn seed(&mut self, key: TieKey, signature: impl Into<String>) {
        self.groups.entry(key).or_default().insert(signature.into());
    }

    /// Removes already-emitted records from both edges of an oldest-first
    /// page. Scanning from each edge stops at the first record whose pair is
    /// not tracked, since tied records are contiguous. Returns the number of
    /// records removed.
    pub fn filter_edges(&self, page: &mut SignaturePage) -> usize {
        if self.groups.is_empty() {
            return 0;
        }

        let records = page.records_mut();
        let mut drop = vec![false; records.len()];

        let mut oldest_run_end = 0;
        for (idx, record) in records.iter().enumerate() {
            if !self.groups.contains_key(&record.tie_key()) {
                break;
            }
            drop[idx] = self.contains(record);
            oldest_run_end = idx + 1;
        }

        for idx in (oldest_run_end..records.len()).rev() {
            let record = &records[idx];
            if !self.groups.contains_key(&record.tie_key()) {
                break;
            }
            drop[idx] = self.contains(record);
        }

        let before = records.len();
        let mut flags = drop.into_iter();
        records.retain(|_| !flags.next().unwrap_or(false));
        before - records.len()
    }

    /// Records every signature in `page` whose pair equals `key`.
    pub fn record_group(&mut self, page: &SignaturePage, key: TieKey) {
        let ids = self.groups.entry(key).or_default();
        ids.extend(
            page.records()
                .iter()
                .filter(|record| record.tie_key() == key)
                .map(|record| record.signature.clone()),
        );
    }

    /// Drops every tracked pair not listed in `keep`.
    pub fn retain_keys(&mut self, keep: &[TieKey]) {
        self.groups.retain(|key, _| keep.contains(key));
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
