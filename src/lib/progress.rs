//! Progress tracking for long scans.
//!
//! Worker threads share one [`ProgressTracker`] per node and bump it once per
//! filtered record; a line is logged each time the total crosses a multiple
//! of the interval.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counter that logs at regular intervals.
///
/// # Example
/// ```
/// use hmmnode_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Filtered records").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // Logs at 100, 200
/// }
/// tracker.log_final(); // Logs "Filtered records 250 (complete)"
/// ```
#[derive(Debug)]
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Create a tracker with the default interval of 10,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 10_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Set the logging interval. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `additional` to the count, logging every interval boundary crossed.
    ///
    /// Returns true if the new count lies exactly on a boundary.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && count.is_multiple_of(self.interval);
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;
        for i in (prev / self.interval + 1)..=(new_count / self.interval) {
            info!("{} {}", self.message, i * self.interval);
        }
        new_count.is_multiple_of(self.interval)
    }

    /// Log the final count unless the last boundary already logged it.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    /// Zero the count, e.g. at the start of a new search.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// The current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
