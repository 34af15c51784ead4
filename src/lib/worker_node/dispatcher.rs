//! Work-stealing dispatcher.
//!
//! Each thread claims record ids one at a time from its own descriptor. When
//! the descriptor runs dry the thread refills it from the global queue, and
//! when the queue is empty it steals the upper half of the largest range any
//! peer still holds.
//!
//! # Lock ordering
//!
//! The global queue lock is never requested while a descriptor lock is held.
//! Refills pop from the queue first and lock the descriptor afterwards, and a
//! thief releases the victim's lock before locking its own descriptor, so no
//! thread ever holds two descriptor locks either.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::range::{RecordRange, WorkDescriptor};
use super::work_queue::GlobalWorkQueue;

/// Where a claimed record id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimSource {
    /// The thread's own descriptor already held it.
    Own,
    /// The descriptor was refilled from the global queue.
    Queue,
    /// The descriptor was refilled by stealing from a peer.
    Stolen,
}

/// A record id claimed by a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claimed {
    /// The claimed record id.
    pub record_id: u64,
    /// How the thread obtained it.
    pub source: ClaimSource,
}

/// Distributes record ids across the node's threads.
#[derive(Debug)]
pub struct WorkDispatcher {
    queue: GlobalWorkQueue,
    descriptors: Vec<WorkDescriptor>,
    /// Advisory: the last steal scan found nothing worth taking.
    no_steal: AtomicBool,
    steals: AtomicU64,
}

impl WorkDispatcher {
    /// Create a dispatcher for `num_threads` threads.
    #[must_use]
    pub fn new(num_threads: usize, chunk_size: u64) -> Self {
        Self {
            queue: GlobalWorkQueue::new(chunk_size),
            descriptors: (0..num_threads).map(|_| WorkDescriptor::new()).collect(),
            no_steal: AtomicBool::new(false),
            steals: AtomicU64::new(0),
        }
    }

    /// The global work queue.
    #[must_use]
    pub fn queue(&self) -> &GlobalWorkQueue {
        &self.queue
    }

    /// The descriptor of `thread_id`.
    #[must_use]
    pub fn descriptor(&self, thread_id: usize) -> &WorkDescriptor {
        &self.descriptors[thread_id]
    }

    /// Number of threads served.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.descriptors.len()
    }

    /// Start a new search over `range`: clear all descriptors and queue the range.
    pub fn initialize_search(&self, range: RecordRange) -> usize {
        for descriptor in &self.descriptors {
            descriptor.clear();
        }
        let chunks = self.queue.initialize(range);
        self.no_steal.store(false, Ordering::Release);
        self.steals.store(0, Ordering::Relaxed);
        chunks
    }

    /// Queue more work for the current search.
    pub fn add_work(&self, range: RecordRange) -> usize {
        let chunks = self.queue.add_work(range);
        self.no_steal.store(false, Ordering::Release);
        chunks
    }

    /// Drop all outstanding work. Returns the number of record ids discarded.
    pub fn reset(&self) -> u64 {
        let mut discarded = self.queue.clear();
        for descriptor in &self.descriptors {
            discarded += descriptor.remaining();
            descriptor.clear();
        }
        self.no_steal.store(false, Ordering::Release);
        discarded
    }

    /// Claim the next record id for `thread_id`.
    ///
    /// Returns `None` only when the thread's descriptor is empty, the global
    /// queue is empty, and no peer holds a stealable range.
    pub fn next_record(&self, thread_id: usize) -> Option<Claimed> {
        let mut source = ClaimSource::Own;
        loop {
            if let Some(record_id) = self.descriptors[thread_id].claim_next() {
                return Some(Claimed { record_id, source });
            }
            if self.refill_from_queue(thread_id) {
                source = ClaimSource::Queue;
            } else if self.steal(thread_id) {
                source = ClaimSource::Stolen;
            } else {
                return None;
            }
        }
    }

    /// Move the head chunk of the global queue into the thread's descriptor.
    pub fn refill_from_queue(&self, thread_id: usize) -> bool {
        // The queue lock is released before the descriptor lock is taken.
        match self.queue.take_chunk() {
            Some(range) => {
                self.descriptors[thread_id].assign(range);
                // A scan that ran while the chunk was in transit saw nothing.
                self.no_steal.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Steal half of the largest peer range into the thread's descriptor.
    ///
    /// The `no_steal` flag is a hint only: a range can reach a peer's
    /// descriptor without passing through the dispatcher, so the peers are
    /// always rescanned and a successful steal clears the flag.
    pub fn steal(&self, thread_id: usize) -> bool {
        while let Some(victim) = self.select_victim(thread_id) {
            let stolen = self.descriptors[victim].lock().split_upper_half();
            if let Some(range) = stolen {
                self.descriptors[thread_id].assign(range);
                self.steals.fetch_add(1, Ordering::Relaxed);
                self.no_steal.store(false, Ordering::Release);
                log::trace!(
                    "Thread {thread_id} stole {}..={} from thread {victim}",
                    range.start,
                    range.end
                );
                return true;
            }
            // The victim drained its range between the scan and the split; rescan.
        }
        self.no_steal.store(true, Ordering::Release);
        false
    }

    /// Choose the peer with the largest remaining range.
    ///
    /// Only ranges of at least two ids are candidates. Ties go to the lowest
    /// thread index. Each peer's lock is held only while its range is read.
    #[must_use]
    pub fn select_victim(&self, thread_id: usize) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (peer, descriptor) in self.descriptors.iter().enumerate() {
            if peer == thread_id {
                continue;
            }
            let remaining = descriptor.remaining();
            if remaining < 2 {
                continue;
            }
            if best.is_none_or(|(_, most)| remaining > most) {
                best = Some((peer, remaining));
            }
        }
        best.map(|(peer, _)| peer)
    }

    /// Returns true if any record id is still queued or claimed.
    #[must_use]
    pub fn has_remaining_work(&self) -> bool {
        !self.queue.is_empty() || self.descriptors.iter().any(|d| d.remaining() > 0)
    }

    /// Returns true if the last steal scan found nothing to take.
    #[must_use]
    pub fn stealing_exhausted(&self) -> bool {
        self.no_steal.load(Ordering::Acquire)
    }

    /// Number of successful steals since the search started.
    #[must_use]
    pub fn steal_count(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    /// Snapshot of every descriptor's range.
    ///
    /// All descriptors are locked together, in index order, so the snapshot is
    /// a single consistent point in time.
    #[must_use]
    pub fn snapshot_ranges(&self) -> Vec<RecordRange> {
        let guards: Vec<_> = self.descriptors.iter().map(WorkDescriptor::lock).collect();
        guards.iter().map(|guard| **guard).collect()
    }

    /// Returns true if no two descriptors claim the same record id.
    #[must_use]
    pub fn descriptors_disjoint(&self) -> bool {
        let ranges = self.snapshot_ranges();
        ranges
            .iter()
            .enumerate()
            .all(|(i, a)| ranges[i + 1..].iter().all(|b| !a.overlaps(b)))
    }
}
