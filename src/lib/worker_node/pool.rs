//! Typed object pools with explicit ownership transfer.
//!
//! Chunks, back-end entries, and hits are recycled between comparisons and
//! between searches instead of being reallocated. [`ObjectPool::acquire`]
//! hands an object out by value and [`ObjectPool::release`] takes it back;
//! an empty pool grows by constructing a fresh object rather than failing.
//! The pool remembers how many objects it has ever created, so a caller can
//! check that everything handed out during a search has come back.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An object that can be cleared and reused.
pub trait Poolable: Default + Send {
    /// Reset the object before it goes back into the pool.
    ///
    /// Implementations should keep heap capacity and drop only contents.
    fn recycle(&mut self);
}

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Name of the pool.
    pub name: &'static str,
    /// Objects ever created by this pool.
    pub allocated: usize,
    /// Objects currently sitting in the pool.
    pub available: usize,
}

impl PoolStats {
    /// Objects currently checked out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.available)
    }
}

/// A lock-protected free list of reusable objects.
#[derive(Debug)]
pub struct ObjectPool<T> {
    name: &'static str,
    free: Mutex<Vec<T>>,
    allocated: AtomicUsize,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create an empty pool.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, 0)
    }

    /// Create a pool pre-filled with `count` objects.
    #[must_use]
    pub fn with_capacity(name: &'static str, count: usize) -> Self {
        let free: Vec<T> = (0..count).map(|_| T::default()).collect();
        Self { name, free: Mutex::new(free), allocated: AtomicUsize::new(count) }
    }

    /// Take an object out of the pool, growing the pool if it is empty.
    pub fn acquire(&self) -> T {
        if let Some(item) = self.free.lock().pop() {
            return item;
        }
        self.grow(1);
        T::default()
    }

    /// Move up to `count` objects into `out` with a single lock acquisition,
    /// growing the pool for any shortfall.
    pub fn acquire_batch(&self, count: usize, out: &mut Vec<T>) {
        let taken = {
            let mut free = self.free.lock();
            let take = count.min(free.len());
            let split = free.len() - take;
            out.extend(free.drain(split..));
            take
        };
        let shortfall = count - taken;
        if shortfall > 0 {
            self.grow(shortfall);
            out.extend((0..shortfall).map(|_| T::default()));
        }
    }

    /// Return an object to the pool.
    pub fn release(&self, mut item: T) {
        item.recycle();
        self.free.lock().push(item);
    }

    /// Return many objects with a single lock acquisition.
    pub fn release_batch<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut recycled: Vec<T> = items
            .into_iter()
            .map(|mut item| {
                item.recycle();
                item
            })
            .collect();
        if !recycled.is_empty() {
            self.free.lock().append(&mut recycled);
        }
    }

    /// Name of the pool (for logging).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Objects currently in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Objects ever created by the pool.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Snapshot of the pool's counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let available = self.available();
        PoolStats { name: self.name, allocated: self.allocated(), available }
    }

    fn grow(&self, count: usize) {
        let total = self.allocated.fetch_add(count, Ordering::AcqRel) + count;
        log::trace!("Pool '{}' grew by {count} to {total} object(s)", self.name);
    }
}
