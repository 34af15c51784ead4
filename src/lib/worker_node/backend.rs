//! Queue of front-end survivors awaiting the back-end stage.
//!
//! Front-end threads package each record that passes the filter into a
//! [`BackendEntry`] drawn from the back-end pool and push it here without
//! waiting. Back-end threads pop entries, run the full score, and hand the
//! entry back to the pool. The queue lock and the pool lock are independent
//! leaves: neither is ever held while acquiring the other.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::pipeline::FilterScores;
use super::pool::{ObjectPool, PoolStats, Poolable};
use crate::errors::{NodeError, Result};

/// A comparison that passed the front-end filter.
#[derive(Debug, Default, Clone)]
pub struct BackendEntry {
    /// Copy of the record's bytes.
    pub record: Vec<u8>,
    /// Id of the record in the searched database.
    pub record_id: u64,
    /// Thread whose front end produced the entry.
    pub origin_thread: usize,
    /// Intermediate scores from the front-end filter.
    pub scores: FilterScores,
}

impl BackendEntry {
    /// Fill the entry for one comparison, reusing the record buffer.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PoolExhausted`] if the record buffer cannot grow.
    pub fn load(
        &mut self,
        record: &[u8],
        record_id: u64,
        origin_thread: usize,
        scores: FilterScores,
    ) -> Result<()> {
        self.record.clear();
        self.record
            .try_reserve(record.len())
            .map_err(|_| NodeError::PoolExhausted { pool: "backend", requested: record.len() })?;
        self.record.extend_from_slice(record);
        self.record_id = record_id;
        self.origin_thread = origin_thread;
        self.scores = scores;
        Ok(())
    }

    /// Length of the record in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.record.len()
    }

    /// Returns true if the entry holds no record bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

impl Poolable for BackendEntry {
    fn recycle(&mut self) {
        self.record.clear();
        self.record_id = 0;
        self.origin_thread = 0;
        self.scores = FilterScores::default();
    }
}

/// FIFO queue of back-end work plus the pool its entries come from.
#[derive(Debug)]
pub struct BackendQueue {
    entries: Mutex<VecDeque<BackendEntry>>,
    /// Mirror of `entries.len()`, only written while the queue lock is held.
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    pool: ObjectPool<BackendEntry>,
}

impl Default for BackendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendQueue {
    /// Create an empty queue with an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            pool: ObjectPool::new("backend"),
        }
    }

    /// Take an empty entry from the pool.
    pub fn acquire_entry(&self) -> BackendEntry {
        self.pool.acquire()
    }

    /// Return a consumed entry to the pool.
    pub fn release_entry(&self, entry: BackendEntry) {
        self.pool.release(entry);
    }

    /// Append an entry. Returns the depth after the push.
    pub fn push(&self, entry: BackendEntry) -> usize {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        let depth = entries.len();
        self.depth.store(depth, Ordering::Release);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        depth
    }

    /// Remove the oldest entry, if any.
    pub fn pop(&self) -> Option<BackendEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.pop_front();
        self.depth.store(entries.len(), Ordering::Release);
        entry
    }

    /// Current depth (lock-free read).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Largest depth seen since the last [`BackendQueue::reset_peak`].
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Forget the recorded peak depth.
    pub fn reset_peak(&self) {
        self.peak_depth.store(0, Ordering::Relaxed);
    }

    /// Return every queued entry to the pool. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        let drained: Vec<BackendEntry> = {
            let mut entries = self.entries.lock();
            self.depth.store(0, Ordering::Release);
            entries.drain(..).collect()
        };
        let count = drained.len();
        self.pool.release_batch(drained);
        count
    }

    /// Counters for the entry pool.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
