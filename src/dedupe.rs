//! Removal of repeated message ids.
//!
//! Pages can overlap when posts are published during a walk, so the same
//! message may arrive twice. The first occurrence wins; survivors keep their
//! relative order.

use std::collections::HashSet;

use crate::record::PostRecord;

/// Streaming deduplicator.
///
/// # Example
///
/// ```rust
/// use postpack::dedupe::Deduplicator;
/// use postpack::PostRecord;
/// use chrono::Utc;
///
/// let mut dedup = Deduplicator::new();
/// assert!(dedup.accept(PostRecord::new(1, Utc::now(), "a")).is_some());
/// assert!(dedup.accept(PostRecord::new(1, Utc::now(), "a again")).is_none());
/// assert_eq!(dedup.duplicates(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<u64>,
    duplicates: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record if its id is new, `None` otherwise.
    pub fn accept(&mut self, record: PostRecord) -> Option<PostRecord> {
        if self.seen.insert(record.id()) {
            Some(record)
        } else {
            self.duplicates += 1;
            None
        }
    }

    /// Number of records dropped so far.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Batch form of [`Deduplicator`].
pub fn dedupe(records: Vec<PostRecord>) -> Vec<PostRecord> {
    let mut dedup = Deduplicator::new();
    records
        .into_iter()
        .filter_map(|record| dedup.accept(record))
        .collect()
}
