//! Hit collection.
//!
//! Each thread keeps its hits in a private sorted container and draws empty
//! hits from a private slice of the shared hit pool, so steady-state scanning
//! touches no shared lock per hit. When a thread parks it publishes its
//! container to its slot in the [`HitCollector`] and returns its unused empty
//! hits to the pool. At the end of a search the node merges all published
//! containers, already sorted, into one node-wide list with a k-way merge.

use itertools::Itertools;
use parking_lot::Mutex;
use std::cmp::Ordering;

use super::pool::{ObjectPool, PoolStats, Poolable};

/// One reportable comparison result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hit {
    /// Score of the comparison; higher is better.
    pub score: f32,
    /// Id of the database record that produced the hit.
    pub record_id: u64,
    /// Pipeline-defined detail (alignment, domain table, ...).
    pub payload: Vec<u8>,
}

impl Hit {
    /// Ranking order: score descending, then record id ascending.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score).then_with(|| self.record_id.cmp(&other.record_id))
    }
}

impl Poolable for Hit {
    fn recycle(&mut self) {
        self.score = 0.0;
        self.record_id = 0;
        self.payload.clear();
    }
}

/// Returns true if `hits` is in ranking order.
#[must_use]
pub fn is_ranked(hits: &[Hit]) -> bool {
    hits.windows(2).all(|w| w[0].rank_cmp(&w[1]) != Ordering::Greater)
}

/// A thread's private hit container and its slice of empty hits.
#[derive(Debug, Default)]
pub struct LocalHits {
    ranked: Vec<Hit>,
    spare: Vec<Hit>,
}

impl LocalHits {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty hit, refilling the private slice from `pool` if needed.
    pub fn take_empty(&mut self, pool: &ObjectPool<Hit>, batch_size: usize) -> Hit {
        if self.spare.is_empty() {
            pool.acquire_batch(batch_size.max(1), &mut self.spare);
        }
        self.spare.pop().unwrap_or_default()
    }

    /// Give back an empty hit that was not used.
    pub fn return_empty(&mut self, mut hit: Hit) {
        hit.recycle();
        self.spare.push(hit);
    }

    /// Insert a hit, keeping the container in ranking order.
    pub fn insert(&mut self, hit: Hit) {
        let at = self.ranked.partition_point(|h| h.rank_cmp(&hit) != Ordering::Greater);
        self.ranked.insert(at, hit);
    }

    /// Number of hits held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Returns true if no hits are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// The hits in ranking order.
    #[must_use]
    pub fn ranked(&self) -> &[Hit] {
        &self.ranked
    }
}

#[derive(Debug, Default)]
struct MergedHits {
    hits: Vec<Hit>,
    hits_in_list: u64,
}

/// Node-wide hit storage: per-thread published slots, the merged list, and
/// the shared pool of empty hits.
///
/// The merged-list lock and the pool lock are independent leaves.
#[derive(Debug)]
pub struct HitCollector {
    slots: Vec<Mutex<Vec<Hit>>>,
    merged: Mutex<MergedHits>,
    pool: ObjectPool<Hit>,
    batch_size: usize,
}

impl HitCollector {
    /// Create a collector for `num_threads` threads.
    #[must_use]
    pub fn new(num_threads: usize, batch_size: usize) -> Self {
        Self {
            slots: (0..num_threads).map(|_| Mutex::new(Vec::new())).collect(),
            merged: Mutex::new(MergedHits::default()),
            pool: ObjectPool::new("hit"),
            batch_size: batch_size.max(1),
        }
    }

    /// The shared pool of empty hits.
    #[must_use]
    pub fn pool(&self) -> &ObjectPool<Hit> {
        &self.pool
    }

    /// Hits a thread takes from the pool at once.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Move a thread's hits into its slot and return its spare hits to the pool.
    ///
    /// A thread may publish several times during one search (once per park);
    /// each batch is merged into what the slot already holds.
    pub fn publish(&self, thread_id: usize, local: &mut LocalHits) {
        let spare = std::mem::take(&mut local.spare);
        self.pool.release_batch(spare);

        let ranked = std::mem::take(&mut local.ranked);
        if ranked.is_empty() {
            return;
        }
        let mut slot = self.slots[thread_id].lock();
        if slot.is_empty() {
            *slot = ranked;
        } else {
            let previous = std::mem::take(&mut *slot);
            *slot = previous
                .into_iter()
                .merge_by(ranked, |a, b| a.rank_cmp(b) != Ordering::Greater)
                .collect();
        }
    }

    /// Number of hits a thread has published this search.
    #[must_use]
    pub fn published(&self, thread_id: usize) -> usize {
        self.slots[thread_id].lock().len()
    }

    /// Merge every thread's published hits into the node-wide list.
    ///
    /// Returns the total number of hits in the list.
    pub fn merge(&self) -> u64 {
        let mut merged = self.merged.lock();
        let inputs: Vec<Vec<Hit>> =
            self.slots.iter().map(|slot| std::mem::take(&mut *slot.lock())).collect();
        let incoming = std::mem::take(&mut merged.hits);
        merged.hits = inputs
            .into_iter()
            .chain(std::iter::once(incoming))
            .kmerge_by(|a, b| a.rank_cmp(b) == Ordering::Less)
            .collect();
        merged.hits_in_list = merged.hits.len() as u64;
        merged.hits_in_list
    }

    /// Number of hits in the merged list.
    #[must_use]
    pub fn hits_in_list(&self) -> u64 {
        self.merged.lock().hits_in_list
    }

    /// Copy the merged list out and return every hit object to the pool.
    pub fn take_results(&self) -> Vec<Hit> {
        let hits = {
            let mut merged = self.merged.lock();
            merged.hits_in_list = 0;
            std::mem::take(&mut merged.hits)
        };
        let results = hits.clone();
        self.pool.release_batch(hits);
        results
    }

    /// Drop all published and merged hits back into the pool.
    pub fn reset(&self) {
        for slot in &self.slots {
            let hits = std::mem::take(&mut *slot.lock());
            self.pool.release_batch(hits);
        }
        let hits = {
            let mut merged = self.merged.lock();
            merged.hits_in_list = 0;
            std::mem::take(&mut merged.hits)
        };
        self.pool.release_batch(hits);
    }

    /// Counters for the hit pool.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
