//! Tunable policy for a worker node.
//!
//! The thresholds here decide how finely work is split, when threads move
//! between the front-end and back-end stages, and when the node asks the
//! coordinator for more work.

use std::time::Duration;

use crate::errors::{NodeError, Result};

/// Default number of records in each chunk of the global work queue.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000;

/// Default back-end queue depth, per back-end thread, above which a front-end
/// thread is promoted.
pub const DEFAULT_BACKEND_HIGH_WATER: usize = 64;

/// Default number of chunks below which the node requests more work.
pub const DEFAULT_WORK_REQUEST_THRESHOLD: usize = 2;

/// Default number of empty hits a thread takes from the shared pool at once.
pub const DEFAULT_HIT_BATCH_SIZE: usize = 64;

/// Configuration for a [`WorkerNode`](super::WorkerNode).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Number of long-lived worker threads.
    pub num_threads: usize,
    /// Records per chunk when a range is split into the global queue.
    pub chunk_size: u64,
    /// Promote a thread when `depth > backend_high_water * (backend_threads + 1)`.
    pub backend_high_water: usize,
    /// A back-end thread demotes itself when `depth <= backend_low_water`.
    pub backend_low_water: usize,
    /// Back-end thread count never drops below this through demotion.
    pub min_backend_threads: usize,
    /// Back-end thread count never rises above this through promotion.
    pub max_backend_threads: usize,
    /// Request work from the coordinator when fewer chunks than this are queued.
    pub work_request_threshold: usize,
    /// Empty hits moved from the shared pool to a thread in one lock acquisition.
    pub hit_batch_size: usize,
    /// Count how many times each record is processed (diagnostic only).
    pub track_coverage: bool,
    /// Log scanned-record progress every this many records (0 = disabled).
    pub progress_interval: u64,
    /// How often the coordinator driver checks whether all threads are parked.
    pub idle_poll_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let num_threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(num_threads)
    }
}

impl NodeConfig {
    /// Create a configuration with default policy for `num_threads` threads.
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backend_high_water: DEFAULT_BACKEND_HIGH_WATER,
            backend_low_water: 0,
            min_backend_threads: 0,
            max_backend_threads: num_threads.saturating_sub(1),
            work_request_threshold: DEFAULT_WORK_REQUEST_THRESHOLD,
            hit_batch_size: DEFAULT_HIT_BATCH_SIZE,
            track_coverage: false,
            progress_interval: 0,
            idle_poll_interval: Duration::from_millis(5),
        }
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the back-end water marks.
    #[must_use]
    pub fn with_backend_water_marks(mut self, high: usize, low: usize) -> Self {
        self.backend_high_water = high;
        self.backend_low_water = low;
        self
    }

    /// Set the bounds on the number of back-end threads.
    #[must_use]
    pub fn with_backend_thread_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_backend_threads = min;
        self.max_backend_threads = max;
        self
    }

    /// Set the work request threshold (in chunks).
    #[must_use]
    pub fn with_work_request_threshold(mut self, chunks: usize) -> Self {
        self.work_request_threshold = chunks;
        self
    }

    /// Enable or disable the per-record coverage counter.
    #[must_use]
    pub fn with_coverage_tracking(mut self, enabled: bool) -> Self {
        self.track_coverage = enabled;
        self
    }

    /// Set the progress logging interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the driver's idle poll interval.
    #[must_use]
    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    /// Check that the configuration can run.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(invalid("num-threads", "must be >= 1"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk-size", "must be >= 1"));
        }
        if self.backend_high_water == 0 {
            return Err(invalid("backend-high-water", "must be >= 1"));
        }
        if self.backend_low_water >= self.backend_high_water {
            return Err(invalid(
                "backend-low-water",
                &format!("must be below the high-water mark ({})", self.backend_high_water),
            ));
        }
        if self.max_backend_threads >= self.num_threads {
            return Err(invalid(
                "max-backend-threads",
                &format!(
                    "must leave at least one front-end thread (got {} of {} threads)",
                    self.max_backend_threads, self.num_threads
                ),
            ));
        }
        if self.min_backend_threads > self.max_backend_threads {
            return Err(invalid(
                "min-backend-threads",
                &format!("must not exceed max-backend-threads ({})", self.max_backend_threads),
            ));
        }
        if self.hit_batch_size == 0 {
            return Err(invalid("hit-batch-size", "must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(parameter: &str, reason: &str) -> NodeError {
    NodeError::InvalidParameter { parameter: parameter.to_string(), reason: reason.to_string() }
}
