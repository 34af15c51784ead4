//! The node-wide queue of work chunks.
//!
//! The coordinator's macro-ranges are cut into chunk-sized pieces and queued
//! here; idle threads refill their descriptors from the head of the queue.
//! Chunk objects come from a pool and go back to it once their range has been
//! copied into a descriptor.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::lock_order;
use super::pool::{ObjectPool, PoolStats};
use super::range::{RecordRange, WorkChunk};

/// FIFO queue of record ranges awaiting a thread.
#[derive(Debug)]
pub struct GlobalWorkQueue {
    chunks: Mutex<VecDeque<WorkChunk>>,
    /// Mirror of `chunks.len()`, written under the queue lock.
    len: AtomicUsize,
    pool: ObjectPool<WorkChunk>,
    chunk_size: u64,
}

impl GlobalWorkQueue {
    /// Create an empty queue that splits incoming ranges into `chunk_size` pieces.
    #[must_use]
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            pool: ObjectPool::new("work-chunk"),
            chunk_size: chunk_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WorkChunk>> {
        lock_order::before_global_queue_lock();
        self.chunks.lock()
    }

    /// Replace the queue contents with `range` split into chunks.
    ///
    /// Returns the number of chunks queued.
    pub fn initialize(&self, range: RecordRange) -> usize {
        self.clear();
        self.add_work(range)
    }

    /// Append `range`, split into chunks, to the tail of the queue.
    ///
    /// Returns the number of chunks queued.
    pub fn add_work(&self, range: RecordRange) -> usize {
        let mut staged: Vec<WorkChunk> = Vec::new();
        let pieces: Vec<RecordRange> = range.chunks(self.chunk_size).collect();
        if pieces.is_empty() {
            return 0;
        }
        self.pool.acquire_batch(pieces.len(), &mut staged);
        for (chunk, piece) in staged.iter_mut().zip(&pieces) {
            chunk.range = *piece;
        }

        let mut chunks = self.lock();
        chunks.extend(staged);
        self.len.store(chunks.len(), Ordering::Release);
        pieces.len()
    }

    /// Pop the head chunk and return its range, or `None` if the queue is empty.
    pub fn take_chunk(&self) -> Option<RecordRange> {
        let chunk = {
            let mut chunks = self.lock();
            let chunk = chunks.pop_front();
            self.len.store(chunks.len(), Ordering::Release);
            chunk
        }?;
        let range = chunk.range;
        self.pool.release(chunk);
        Some(range)
    }

    /// Drop every queued chunk back into the pool.
    ///
    /// Returns the number of record ids that were still queued.
    pub fn clear(&self) -> u64 {
        let drained: Vec<WorkChunk> = {
            let mut chunks = self.lock();
            self.len.store(0, Ordering::Release);
            chunks.drain(..).collect()
        };
        let records = drained.iter().map(|c| c.range.len()).sum();
        self.pool.release_batch(drained);
        records
    }

    /// Number of chunks currently queued (lock-free read).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if no chunks are queued (lock-free read).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of record ids still queued.
    #[must_use]
    pub fn queued_records(&self) -> u64 {
        self.lock().iter().map(|c| c.range.len()).sum()
    }

    /// Chunk size used to split incoming ranges.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Counters for the chunk pool.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
