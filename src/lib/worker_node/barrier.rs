//! Start barrier for the node's worker threads.
//!
//! A worker entering the barrier increments the waiting count under the
//! barrier lock and sleeps on the start condition. The releasing call waits
//! until every live thread is waiting, then, still under the same lock,
//! resets the count, advances the generation, and broadcasts. Waiters only
//! leave once the generation they entered with has changed, so a thread is
//! woken at most once per release and never misses one.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct BarrierState {
    /// Threads blocked in [`StartBarrier::wait`].
    waiting: usize,
    /// Bumped by every release.
    generation: u64,
    /// Threads that have exited for good and will never wait again.
    retired: usize,
}

/// Reusable start/stop barrier for a fixed set of threads.
#[derive(Debug)]
pub struct StartBarrier {
    num_threads: usize,
    state: Mutex<BarrierState>,
    /// Signals waiting threads to start.
    start: Condvar,
    /// Signals the releaser that a thread arrived or retired.
    arrivals: Condvar,
}

impl StartBarrier {
    /// Create a barrier for `num_threads` threads.
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            state: Mutex::new(BarrierState::default()),
            start: Condvar::new(),
            arrivals: Condvar::new(),
        }
    }

    /// Block the calling worker until the next release.
    ///
    /// Returns the generation that released it.
    pub fn wait(&self) -> u64 {
        let mut state = self.state.lock();
        state.waiting += 1;
        let entered = state.generation;
        self.arrivals.notify_all();
        while state.generation == entered {
            self.start.wait(&mut state);
        }
        state.generation
    }

    /// Wait until every live thread is blocked in [`StartBarrier::wait`], then
    /// wake them all.
    ///
    /// Returns the new generation.
    pub fn release(&self) -> u64 {
        let mut state = self.state.lock();
        while state.waiting + state.retired < self.num_threads {
            self.arrivals.wait(&mut state);
        }
        state.waiting = 0;
        state.generation += 1;
        self.start.notify_all();
        state.generation
    }

    /// Returns true if every live thread is blocked in the barrier.
    #[must_use]
    pub fn all_waiting(&self) -> bool {
        let state = self.state.lock();
        state.waiting + state.retired >= self.num_threads
    }

    /// Wait up to `timeout` for every live thread to block in the barrier.
    ///
    /// Returns true if they all did.
    pub fn wait_until_all_waiting(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.waiting + state.retired < self.num_threads {
            if self.arrivals.wait_until(&mut state, deadline).timed_out() {
                return state.waiting + state.retired >= self.num_threads;
            }
        }
        true
    }

    /// Record that the calling thread has exited and will never wait again.
    pub fn retire(&self) {
        let mut state = self.state.lock();
        state.retired += 1;
        self.arrivals.notify_all();
    }

    /// Number of threads currently blocked.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Number of threads that have exited.
    #[must_use]
    pub fn retired(&self) -> usize {
        self.state.lock().retired
    }

    /// Number of releases so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}
