//! Lock-order instrumentation.
//!
//! Threads take the global queue lock and descriptor locks in one direction
//! only: a descriptor lock may be taken while the global queue lock is held,
//! but the global queue must never be locked while any descriptor lock is
//! held. Every descriptor guard bumps a thread-local counter, and
//! every global queue acquisition checks it. Violations are counted
//! process-wide so tests can assert that an instrumented run saw none.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static HELD_DESCRIPTOR_LOCKS: Cell<usize> = const { Cell::new(0) };
}

static VIOLATIONS: AtomicU64 = AtomicU64::new(0);
static QUEUE_ACQUISITIONS: AtomicU64 = AtomicU64::new(0);

/// Record that the current thread acquired a descriptor lock.
#[inline]
pub(crate) fn descriptor_locked() {
    HELD_DESCRIPTOR_LOCKS.with(|held| held.set(held.get() + 1));
}

/// Record that the current thread released a descriptor lock.
#[inline]
pub(crate) fn descriptor_unlocked() {
    HELD_DESCRIPTOR_LOCKS.with(|held| held.set(held.get().saturating_sub(1)));
}

/// Check the ordering rule before acquiring the global queue lock.
#[inline]
pub(crate) fn before_global_queue_lock() {
    QUEUE_ACQUISITIONS.fetch_add(1, Ordering::Relaxed);
    let held = held_descriptor_locks();
    if held > 0 {
        VIOLATIONS.fetch_add(1, Ordering::Relaxed);
        log::error!("Global queue lock requested while holding {held} descriptor lock(s)");
        debug_assert!(held == 0, "global queue lock acquired while holding a descriptor lock");
    }
}

/// Number of descriptor locks the calling thread currently holds.
#[must_use]
pub fn held_descriptor_locks() -> usize {
    HELD_DESCRIPTOR_LOCKS.with(Cell::get)
}

/// Total lock-order violations observed by this process.
#[must_use]
pub fn violations() -> u64 {
    VIOLATIONS.load(Ordering::Relaxed)
}

/// Total global queue lock acquisitions observed by this process.
#[must_use]
pub fn global_queue_acquisitions() -> u64 {
    QUEUE_ACQUISITIONS.load(Ordering::Relaxed)
}
