//! The per-thread worker loop.
//!
//! A worker lives for the whole life of the node. Between searches it sleeps
//! in the start barrier. After each release it checks the shutdown flag, does
//! per-search setup if the search generation changed, then scans until
//! neither the front end nor the back end has anything left for it, publishes
//! its hits, and parks again.
//!
//! Shutdown and failure are observed only at record boundaries; a comparison
//! that has started always runs to completion.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::backend::{BackendEntry, BackendQueue};
use super::barrier::StartBarrier;
use super::config::NodeConfig;
use super::coverage::CoverageCounter;
use super::dispatcher::{ClaimSource, Claimed, WorkDispatcher};
use super::handshake::WorkRequestHandshake;
use super::hits::{HitCollector, LocalHits};
use super::mode::{ModePolicy, ThreadMode, ThreadModeController};
use super::pipeline::{FilterOutcome, PipelineStage, SearchQuery, ShardInfo, ShardProvider};
use super::search_state::SearchState;
use crate::errors::NodeError;
use crate::progress::ProgressTracker;

/// Minimum backoff duration in microseconds.
pub const MIN_BACKOFF_US: u64 = 10;
/// Maximum backoff duration in microseconds (1ms).
pub const MAX_BACKOFF_US: u64 = 1000;

/// Per-thread counters for one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    /// Records run through the front-end filter.
    pub records_filtered: u64,
    /// Front-end survivors pushed onto the back-end queue.
    pub comparisons_queued: u64,
    /// Back-end comparisons run by this thread (own or others' entries).
    pub backend_scored: u64,
    /// Hits this thread produced.
    pub hits: u64,
    /// Chunks taken from the global queue.
    pub chunks_taken: u64,
    /// Successful steals from peers.
    pub steals: u64,
    /// Times this thread moved to the back end.
    pub promotions: u64,
    /// Times this thread moved back to the front end.
    pub demotions: u64,
}

impl ThreadStats {
    /// Add another set of counters into this one.
    pub fn accumulate(&mut self, other: &Self) {
        self.records_filtered += other.records_filtered;
        self.comparisons_queued += other.comparisons_queued;
        self.backend_scored += other.backend_scored;
        self.hits += other.hits;
        self.chunks_taken += other.chunks_taken;
        self.steals += other.steals;
        self.promotions += other.promotions;
        self.demotions += other.demotions;
    }
}

/// State every worker and the controlling path share.
pub(crate) struct SharedState<S> {
    pub config: NodeConfig,
    pub shard: Arc<S>,
    pub shard_info: ShardInfo,
    pub dispatcher: WorkDispatcher,
    pub backend: BackendQueue,
    pub modes: ThreadModeController,
    pub barrier: StartBarrier,
    pub hits: HitCollector,
    pub search: SearchState,
    pub handshake: WorkRequestHandshake,
    pub coverage: CoverageCounter,
    pub progress: ProgressTracker,
    pub shutdown: AtomicBool,
    /// Set once a worker has died; every later lifecycle call reports it.
    pub fatal: Mutex<Option<NodeError>>,
    /// Counters published by each thread when it parks.
    pub stats: Vec<Mutex<ThreadStats>>,
    /// Node-wide count of records run through the front-end filter.
    pub records_processed: AtomicU64,
}

impl<S: ShardProvider> SharedState<S> {
    pub fn new(config: NodeConfig, shard: Arc<S>, shard_info: ShardInfo) -> Self {
        let num_threads = config.num_threads;
        let progress = ProgressTracker::new("Filtered records")
            .with_interval(config.progress_interval.max(1));
        Self {
            dispatcher: WorkDispatcher::new(num_threads, config.chunk_size),
            backend: BackendQueue::new(),
            modes: ThreadModeController::new(ModePolicy::from_config(&config), num_threads),
            barrier: StartBarrier::new(num_threads),
            hits: HitCollector::new(num_threads, config.hit_batch_size),
            search: SearchState::new(),
            handshake: WorkRequestHandshake::new(),
            coverage: CoverageCounter::new(),
            progress,
            shutdown: AtomicBool::new(false),
            fatal: Mutex::new(None),
            stats: (0..num_threads).map(|_| Mutex::new(ThreadStats::default())).collect(),
            records_processed: AtomicU64::new(0),
            config,
            shard,
            shard_info,
        }
    }

    /// Record that a worker died. The in-flight search fails with the same
    /// error.
    pub fn set_fatal(&self, error: NodeError) {
        log::error!("{error}");
        self.search.fail(error.clone());
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub fn fatal_error(&self) -> Option<NodeError> {
        self.fatal.lock().clone()
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Extract a message from a panic payload.
#[must_use]
pub fn extract_panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Turn a caught worker panic into a fatal node error.
pub(crate) fn handle_worker_panic<S: ShardProvider>(
    shared: &SharedState<S>,
    thread_id: usize,
    panic_info: Box<dyn std::any::Any + Send>,
) {
    let message = extract_panic_message(panic_info);
    shared.set_fatal(NodeError::WorkerPanicked { thread_id, message });
}

/// Adaptive backoff for a back-end thread waiting on an empty queue.
#[derive(Debug)]
struct Backoff {
    backoff_us: u64,
}

impl Backoff {
    fn new() -> Self {
        Self { backoff_us: MIN_BACKOFF_US }
    }

    fn reset(&mut self) {
        self.backoff_us = MIN_BACKOFF_US;
    }

    fn increase(&mut self) {
        self.backoff_us = (self.backoff_us * 2).min(MAX_BACKOFF_US);
    }

    /// Sleep for the current backoff with +/-25% jitter; yield at the minimum.
    fn sleep(&self) {
        if self.backoff_us <= MIN_BACKOFF_US {
            std::thread::yield_now();
        } else {
            let jitter_range = self.backoff_us / 4;
            let jitter_seed = u64::from(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.subsec_nanos())
                    .unwrap_or(0),
            );
            let jitter_offset = (jitter_seed % (jitter_range * 2)).saturating_sub(jitter_range);
            let actual_us = self.backoff_us.saturating_add(jitter_offset).max(MIN_BACKOFF_US);
            std::thread::sleep(std::time::Duration::from_micros(actual_us));
        }
    }
}

/// State owned exclusively by one worker thread.
pub(crate) struct ThreadState<P> {
    thread_id: usize,
    stage: P,
    mode: ThreadMode,
    /// Search generation this thread last did per-search setup for.
    setup_generation: u64,
    hits: LocalHits,
    stats: ThreadStats,
    backoff: Backoff,
}

impl<P: PipelineStage> ThreadState<P> {
    pub fn new(thread_id: usize, stage: P) -> Self {
        Self {
            thread_id,
            stage,
            mode: ThreadMode::Frontend,
            setup_generation: 0,
            hits: LocalHits::new(),
            stats: ThreadStats::default(),
            backoff: Backoff::new(),
        }
    }

    /// Run until the shutdown flag is seen after a barrier release.
    pub fn run<S: ShardProvider>(&mut self, shared: &SharedState<S>) {
        log::debug!("Worker thread {} starting", self.thread_id);
        loop {
            shared.barrier.wait();
            if shared.is_shutting_down() {
                break;
            }
            let snapshot = shared.search.snapshot();
            let Some(query) = snapshot.query else {
                continue;
            };
            if self.setup_generation != snapshot.generation {
                log::trace!(
                    "Thread {} setting up for {} (phase {})",
                    self.thread_id,
                    query.kind,
                    snapshot.phase
                );
                self.stage.begin_search(&query);
                self.setup_generation = snapshot.generation;
            }
            self.scan(shared, &query);
            self.park(shared);
        }
        log::debug!("Worker thread {} finished", self.thread_id);
    }

    /// Process work until there is none left for this thread.
    fn scan<S: ShardProvider>(&mut self, shared: &SharedState<S>, query: &SearchQuery) {
        loop {
            if shared.search.is_failed() || shared.is_shutting_down() {
                return;
            }
            match self.mode {
                ThreadMode::Frontend => {
                    if let Some(claimed) = shared.dispatcher.next_record(self.thread_id) {
                        self.front_end(shared, query, claimed);
                    } else if let Some(entry) = shared.backend.pop() {
                        // No front-end work left: help drain before parking.
                        self.back_end(shared, entry);
                    } else {
                        return;
                    }
                }
                ThreadMode::Backend => {
                    if let Some(entry) = shared.backend.pop() {
                        self.back_end(shared, entry);
                        self.backoff.reset();
                        if shared.modes.try_demote(shared.backend.depth()) {
                            self.switch_to(ThreadMode::Frontend);
                        }
                    } else if shared.modes.try_demote(0) {
                        self.switch_to(ThreadMode::Frontend);
                    } else if !shared.dispatcher.has_remaining_work() {
                        return;
                    } else {
                        self.backoff.sleep();
                        self.backoff.increase();
                    }
                }
            }
        }
    }

    fn front_end<S: ShardProvider>(
        &mut self,
        shared: &SharedState<S>,
        query: &SearchQuery,
        claimed: Claimed,
    ) {
        let record_id = claimed.record_id;
        match claimed.source {
            ClaimSource::Own => {}
            ClaimSource::Queue => {
                self.stats.chunks_taken += 1;
                if shared.dispatcher.queue().len() < shared.config.work_request_threshold
                    && shared.handshake.queue_low()
                {
                    log::debug!("Thread {} raised a work request", self.thread_id);
                }
            }
            ClaimSource::Stolen => self.stats.steals += 1,
        }
        if shared.config.track_coverage {
            shared.coverage.record(record_id);
        }

        let Some(record) = shared.shard.fetch_record(query.database, record_id) else {
            let records = shared.shard.num_records(query.database).unwrap_or(0);
            shared.search.fail(NodeError::InvalidRange {
                start: record_id,
                end: record_id,
                records,
            });
            return;
        };

        self.stats.records_filtered += 1;
        shared.records_processed.fetch_add(1, Ordering::Relaxed);
        if shared.config.progress_interval > 0 {
            shared.progress.log_if_needed(1);
        }

        let FilterOutcome::Pass(scores) = self.stage.front_end_filter(record) else {
            return;
        };
        let mut entry = shared.backend.acquire_entry();
        if let Err(e) = entry.load(record, record_id, self.thread_id, scores) {
            shared.backend.release_entry(entry);
            shared.search.fail(e);
            return;
        }
        let depth = shared.backend.push(entry);
        self.stats.comparisons_queued += 1;
        if shared.modes.try_promote(depth) {
            self.switch_to(ThreadMode::Backend);
        }
    }

    fn back_end<S: ShardProvider>(&mut self, shared: &SharedState<S>, entry: BackendEntry) {
        let mut hit = self.hits.take_empty(shared.hits.pool(), shared.hits.batch_size());
        let reported =
            self.stage.back_end_score(&entry.record, entry.record_id, entry.scores, &mut hit);
        if reported {
            hit.record_id = entry.record_id;
            self.hits.insert(hit);
            self.stats.hits += 1;
        } else {
            self.hits.return_empty(hit);
        }
        self.stats.backend_scored += 1;
        shared.backend.release_entry(entry);
    }

    fn switch_to(&mut self, mode: ThreadMode) {
        log::debug!("Thread {} switching {} -> {}", self.thread_id, self.mode, mode);
        match mode {
            ThreadMode::Backend => self.stats.promotions += 1,
            ThreadMode::Frontend => self.stats.demotions += 1,
        }
        self.mode = mode;
        self.backoff.reset();
    }

    /// Hand everything shared back before waiting in the barrier.
    fn park<S: ShardProvider>(&mut self, shared: &SharedState<S>) {
        if self.mode == ThreadMode::Backend {
            shared.modes.force_demote();
            self.stats.demotions += 1;
            self.mode = ThreadMode::Frontend;
        }
        shared.hits.publish(self.thread_id, &mut self.hits);
        shared.stats[self.thread_id].lock().accumulate(&self.stats);
        self.stats = ThreadStats::default();
        log::trace!("Thread {} parking", self.thread_id);
    }
}
