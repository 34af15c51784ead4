//! Diagnostic per-record processing counter.
//!
//! When enabled, every record a front-end thread processes bumps its slot.
//! After a search, [`CoverageCounter::report`] lists the ids in the assigned
//! range that were never processed or were processed more than once. This is
//! a test hook for exactly-once coverage, not a production fault handler.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use super::range::RecordRange;

/// Gaps and duplicates found in one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Total increments recorded.
    pub processed: u64,
    /// Ids in the assigned ranges that were never processed.
    pub missing: Vec<u64>,
    /// Ids processed more than once, with their counts.
    pub duplicated: Vec<(u64, u32)>,
    /// Ids processed that lie outside every assigned range.
    pub unexpected: Vec<u64>,
}

impl CoverageReport {
    /// Returns true if every assigned id was processed exactly once.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.duplicated.is_empty() && self.unexpected.is_empty()
    }
}

/// Per-record counters sized to the searched database.
#[derive(Debug, Default)]
pub struct CoverageCounter {
    counts: RwLock<Vec<AtomicU32>>,
}

impl CoverageCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the counter and size it for `num_records` records.
    pub fn reset(&self, num_records: u64) {
        let size = usize::try_from(num_records).unwrap_or(usize::MAX);
        let mut counts = self.counts.write();
        counts.clear();
        counts.resize_with(size, || AtomicU32::new(0));
    }

    /// Count one processing of `record_id`.
    pub fn record(&self, record_id: u64) {
        let counts = self.counts.read();
        if let Some(slot) = usize::try_from(record_id).ok().and_then(|i| counts.get(i)) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.read().iter().map(|c| u64::from(c.load(Ordering::Relaxed))).sum()
    }

    /// Compare the counts against the ranges that were assigned.
    #[must_use]
    pub fn report(&self, assigned: &[RecordRange]) -> CoverageReport {
        let counts = self.counts.read();
        let mut report = CoverageReport::default();
        for (id, count) in counts.iter().enumerate() {
            let id = id as u64;
            let count = count.load(Ordering::Relaxed);
            report.processed += u64::from(count);
            let expected = assigned.iter().any(|r| r.contains(id));
            match (expected, count) {
                (true, 0) => report.missing.push(id),
                (true, 1) | (false, 0) => {}
                (true, n) => report.duplicated.push((id, n)),
                (false, _) => report.unexpected.push(id),
            }
        }
        report
    }
}
