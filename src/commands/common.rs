//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::time::Duration;

use clap::Args;

use hmmnode_lib::worker_node::NodeConfig;
use hmmnode_lib::worker_node::config::{
    DEFAULT_BACKEND_HIGH_WATER, DEFAULT_CHUNK_SIZE, DEFAULT_HIT_BATCH_SIZE,
    DEFAULT_WORK_REQUEST_THRESHOLD,
};

/// Worker node tuning options.
///
/// Every option maps onto one field of [`NodeConfig`]; the node validates the
/// combination when it is set up.
#[derive(Debug, Clone, Args)]
pub struct NodeOptions {
    /// Number of worker threads. Defaults to the available parallelism.
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Records per chunk in the global work queue
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Back-end queue depth per back-end thread above which a thread is promoted
    #[arg(long = "backend-high-water", default_value_t = DEFAULT_BACKEND_HIGH_WATER)]
    pub backend_high_water: usize,

    /// Back-end queue depth at or below which a back-end thread demotes itself
    #[arg(long = "backend-low-water", default_value_t = 0)]
    pub backend_low_water: usize,

    /// Lower bound on back-end threads
    #[arg(long = "min-backend-threads", default_value_t = 0)]
    pub min_backend_threads: usize,

    /// Upper bound on back-end threads. Defaults to threads - 1.
    #[arg(long = "max-backend-threads")]
    pub max_backend_threads: Option<usize>,

    /// Request more work when fewer chunks than this remain queued
    #[arg(long = "work-request-threshold", default_value_t = DEFAULT_WORK_REQUEST_THRESHOLD)]
    pub work_request_threshold: usize,

    /// Empty hits a thread draws from the shared pool at once
    #[arg(long = "hit-batch-size", default_value_t = DEFAULT_HIT_BATCH_SIZE)]
    pub hit_batch_size: usize,

    /// Count how often each record is scanned and report gaps or overlaps
    #[arg(long = "track-coverage")]
    pub track_coverage: bool,

    /// Log progress every N scanned records (0 disables)
    #[arg(long = "progress-interval", default_value_t = 0)]
    pub progress_interval: u64,

    /// Milliseconds between checks for parked threads
    #[arg(long = "idle-poll-ms", default_value_t = 5)]
    pub idle_poll_ms: u64,
}

impl NodeOptions {
    /// Number of threads, falling back to the available parallelism.
    pub fn num_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Build the node configuration.
    pub fn to_config(&self) -> NodeConfig {
        let num_threads = self.num_threads();
        let max_backend = self.max_backend_threads.unwrap_or(num_threads.saturating_sub(1));
        let mut config = NodeConfig::new(num_threads)
            .with_chunk_size(self.chunk_size)
            .with_backend_water_marks(self.backend_high_water, self.backend_low_water)
            .with_backend_thread_bounds(self.min_backend_threads, max_backend)
            .with_work_request_threshold(self.work_request_threshold)
            .with_coverage_tracking(self.track_coverage)
            .with_progress_interval(self.progress_interval)
            .with_idle_poll_interval(Duration::from_millis(self.idle_poll_ms.max(1)));
        config.hit_batch_size = self.hit_batch_size;
        config
    }
}
