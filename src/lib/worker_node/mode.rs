//! Thread-mode controller.
//!
//! Every thread starts a search in front-end mode. When the back-end queue
//! backs up, the front-end thread that notices first promotes itself to the
//! back end; when the queue drains, back-end threads demote themselves. The
//! decision is a pure function of `(depth, backend_threads, num_threads)` and
//! is re-checked under the backend-thread-count lock, so one crossing of the
//! high-water mark promotes exactly one thread.

use parking_lot::Mutex;
use std::fmt;

use super::config::NodeConfig;

/// Which pipeline stage a thread is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadMode {
    /// Claiming records and running the front-end filter.
    #[default]
    Frontend,
    /// Draining the back-end queue.
    Backend,
}

impl fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frontend => write!(f, "FRONTEND"),
            Self::Backend => write!(f, "BACKEND"),
        }
    }
}

/// Outcome of evaluating the mode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeDecision {
    /// Move one front-end thread to the back end.
    Promote,
    /// Move one back-end thread to the front end.
    Demote,
    /// Leave the split as it is.
    Hold,
}

/// Water marks and bounds for promotion and demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    /// Per-back-end-thread depth above which a thread is promoted.
    pub high_water: usize,
    /// Depth at or below which a back-end thread is demoted.
    pub low_water: usize,
    /// Demotion never takes the back-end count below this.
    pub min_backend: usize,
    /// Promotion never takes the back-end count above this.
    pub max_backend: usize,
}

impl ModePolicy {
    /// Build the policy from a node configuration.
    #[must_use]
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            high_water: config.backend_high_water,
            low_water: config.backend_low_water,
            min_backend: config.min_backend_threads,
            max_backend: config.max_backend_threads,
        }
    }

    /// Decide whether the thread split should change.
    ///
    /// At least one thread always stays in front-end mode so the global queue
    /// keeps being serviced.
    #[must_use]
    pub fn decide(&self, depth: usize, backend_threads: usize, num_threads: usize) -> ModeDecision {
        let ceiling = self.max_backend.min(num_threads.saturating_sub(1));
        let promote_above = self.high_water.saturating_mul(backend_threads + 1);
        if depth > promote_above && backend_threads < ceiling {
            ModeDecision::Promote
        } else if depth <= self.low_water && backend_threads > self.min_backend {
            ModeDecision::Demote
        } else {
            ModeDecision::Hold
        }
    }
}

/// Owns the back-end thread count and applies [`ModePolicy`].
#[derive(Debug)]
pub struct ThreadModeController {
    policy: ModePolicy,
    num_threads: usize,
    /// The backend-thread-count lock; held only to re-check and update.
    backend_threads: Mutex<usize>,
}

impl ThreadModeController {
    /// Create a controller for `num_threads` threads.
    #[must_use]
    pub fn new(policy: ModePolicy, num_threads: usize) -> Self {
        Self { policy, num_threads, backend_threads: Mutex::new(0) }
    }

    /// The policy in force.
    #[must_use]
    pub fn policy(&self) -> ModePolicy {
        self.policy
    }

    /// Number of threads currently in back-end mode.
    #[must_use]
    pub fn backend_threads(&self) -> usize {
        *self.backend_threads.lock()
    }

    /// Called by a front-end thread after it enqueued work. Returns true if the
    /// caller must switch to back-end mode.
    pub fn try_promote(&self, depth: usize) -> bool {
        let mut backend = self.backend_threads.lock();
        if self.policy.decide(depth, *backend, self.num_threads) == ModeDecision::Promote {
            *backend += 1;
            true
        } else {
            false
        }
    }

    /// Called by a back-end thread. Returns true if the caller must switch back
    /// to front-end mode.
    pub fn try_demote(&self, depth: usize) -> bool {
        let mut backend = self.backend_threads.lock();
        if self.policy.decide(depth, *backend, self.num_threads) == ModeDecision::Demote {
            *backend -= 1;
            true
        } else {
            false
        }
    }

    /// Unconditionally demote the caller, e.g. when it parks at the barrier.
    pub fn force_demote(&self) {
        let mut backend = self.backend_threads.lock();
        *backend = backend.saturating_sub(1);
    }

    /// Forget all promotions (between searches).
    pub fn reset(&self) {
        *self.backend_threads.lock() = 0;
    }
}
