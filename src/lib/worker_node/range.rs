//! Record-id ranges: work chunks and per-thread work descriptors.
//!
//! A [`RecordRange`] is an inclusive `start..=end` range of record ids; any
//! range with `start > end` is empty. A [`WorkChunk`] is a range in transit
//! through the global queue. A [`WorkDescriptor`] is the range a thread has
//! currently claimed; it is the unit of theft, so peers lock it to shrink it.

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};

use super::lock_order;

/// Inclusive range of record ids. Empty when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRange {
    /// First record id in the range.
    pub start: u64,
    /// Last record id in the range (inclusive).
    pub end: u64,
}

impl RecordRange {
    /// The canonical empty range.
    pub const EMPTY: Self = Self { start: 1, end: 0 };

    /// Create a range covering `start..=end`.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns true if the range holds no record ids.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of record ids in the range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        if self.is_empty() { 0 } else { self.end - self.start + 1 }
    }

    /// Returns true if `id` lies in the range.
    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id >= self.start && id <= self.end
    }

    /// Returns true if the two ranges share any record id.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }

    /// Remove and return the first id, leaving the rest of the range.
    pub fn pop_front(&mut self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        let id = self.start;
        if id == self.end {
            *self = Self::EMPTY;
        } else {
            self.start += 1;
        }
        Some(id)
    }

    /// Split off the upper half of the range for a thief.
    ///
    /// With `n` ids remaining the owner keeps the lower `ceil(n/2)` ids and the
    /// returned range holds the upper `floor(n/2)`. Ranges of fewer than two
    /// ids cannot be split.
    pub fn split_upper_half(&mut self) -> Option<Self> {
        let remaining = self.len();
        if remaining < 2 {
            return None;
        }
        let keep = remaining.div_ceil(2);
        let stolen = Self::new(self.start + keep, self.end);
        self.end = self.start + keep - 1;
        Some(stolen)
    }

    /// Split the range into consecutive chunks of at most `chunk_size` ids.
    pub fn chunks(self, chunk_size: u64) -> impl Iterator<Item = Self> {
        let chunk_size = chunk_size.max(1);
        let mut next = if self.is_empty() { None } else { Some(self.start) };
        std::iter::from_fn(move || {
            let start = next?;
            let end = start.saturating_add(chunk_size - 1).min(self.end);
            next = if end == self.end { None } else { Some(end + 1) };
            Some(Self::new(start, end))
        })
    }
}

impl Default for RecordRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A range of record ids travelling through the global work queue.
///
/// Chunks are drawn from and returned to a [`ObjectPool`](super::ObjectPool),
/// so the global queue never allocates in steady state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkChunk {
    /// The ids this chunk covers.
    pub range: RecordRange,
}

impl super::pool::Poolable for WorkChunk {
    fn recycle(&mut self) {
        self.range = RecordRange::EMPTY;
    }
}

/// The range a single thread has claimed, guarded by its own lock.
///
/// Owners pop ids from the front; thieves shrink the range from the back.
/// The descriptor itself lives for the node's lifetime.
#[derive(Debug, Default)]
pub struct WorkDescriptor {
    range: Mutex<RecordRange>,
}

impl WorkDescriptor {
    /// Create an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self { range: Mutex::new(RecordRange::EMPTY) }
    }

    /// Lock the descriptor. The guard participates in lock-order checking.
    pub fn lock(&self) -> DescriptorGuard<'_> {
        let guard = self.range.lock();
        lock_order::descriptor_locked();
        DescriptorGuard { guard }
    }

    /// Claim the next record id, if any remain.
    pub fn claim_next(&self) -> Option<u64> {
        self.lock().pop_front()
    }

    /// Replace the claimed range.
    pub fn assign(&self, range: RecordRange) {
        *self.lock() = range;
    }

    /// Number of ids remaining in the claimed range.
    pub fn remaining(&self) -> u64 {
        self.lock().len()
    }

    /// Copy of the claimed range.
    pub fn snapshot(&self) -> RecordRange {
        *self.lock()
    }

    /// Drop whatever range is claimed.
    pub fn clear(&self) {
        self.assign(RecordRange::EMPTY);
    }
}

/// Guard over a locked [`WorkDescriptor`].
pub struct DescriptorGuard<'a> {
    guard: MutexGuard<'a, RecordRange>,
}

impl Deref for DescriptorGuard<'_> {
    type Target = RecordRange;

    fn deref(&self) -> &RecordRange {
        &self.guard
    }
}

impl DerefMut for DescriptorGuard<'_> {
    fn deref_mut(&mut self) -> &mut RecordRange {
        &mut self.guard
    }
}

impl Drop for DescriptorGuard<'_> {
    fn drop(&mut self) {
        lock_order::descriptor_unlocked();
    }
}
