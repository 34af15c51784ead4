//! The worker node lifecycle API.
//!
//! A [`WorkerNode`] owns a fixed set of worker threads, created once by
//! [`WorkerNode::create_threads`] and reused for every search until
//! [`WorkerNode::destroy`]. All lifecycle calls come from one controlling
//! thread (the host process or [`run_node`](super::coordinator::run_node));
//! the workers only ever read the search state it publishes.
//!
//! ```text
//! setup -> create_threads -> { start_* -> add_work* -> end_search }* -> destroy
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::config::NodeConfig;
use super::coverage::CoverageReport;
use super::handshake::RequestState;
use super::hits::Hit;
use super::pipeline::{PipelineFactory, SearchKind, SearchQuery, ShardInfo, ShardProvider};
use super::pool::PoolStats;
use super::range::RecordRange;
use super::search_state::SearchPhase;
use super::worker::{SharedState, ThreadState, ThreadStats, handle_worker_panic};
use crate::errors::{NodeError, Result};
use crate::logging::log_search_summary;

/// How long `end_search` waits between progress messages while threads finish.
const PARK_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// What the node's threads are doing, as seen by the controlling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeActivity {
    /// No search is running.
    Idle,
    /// At least one thread is scanning.
    Working,
    /// Every thread is parked and no work is queued or claimed.
    Drained,
    /// Every thread is parked after the search failed.
    Failed,
}

/// Counters for the node's three pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePoolStats {
    /// Work-chunk pool.
    pub chunks: PoolStats,
    /// Back-end entry pool.
    pub backend: PoolStats,
    /// Hit pool.
    pub hits: PoolStats,
}

impl NodePoolStats {
    /// Objects checked out of any pool.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.chunks.outstanding() + self.backend.outstanding() + self.hits.outstanding()
    }
}

/// Outcome of one completed search.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Direction of the search.
    pub kind: SearchKind,
    /// Database that was searched.
    pub database: u32,
    /// Merged hits, score descending then record id ascending.
    pub hits: Vec<Hit>,
    /// Records run through the front-end filter.
    pub records_processed: u64,
    /// Front-end survivors sent to the back end.
    pub comparisons_queued: u64,
    /// Deepest the back-end queue got.
    pub backend_peak_depth: usize,
    /// Successful steals across all threads.
    pub steals: u64,
    /// Per-thread counters, indexed by thread id.
    pub thread_stats: Vec<ThreadStats>,
    /// Per-record coverage, when coverage tracking is enabled.
    pub coverage: Option<CoverageReport>,
    /// Wall time from start to end of the search.
    pub elapsed: Duration,
}

impl SearchResults {
    /// Number of hits in the merged list.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }
}

/// A worker node: long-lived threads searching one shard.
pub struct WorkerNode<S: ShardProvider, F: PipelineFactory> {
    shared: Arc<SharedState<S>>,
    factory: Arc<F>,
    num_databases: usize,
    handles: Vec<JoinHandle<()>>,
    /// Ranges assigned to the running search, for coverage reporting.
    assigned: Vec<RecordRange>,
    started_at: Option<Instant>,
    destroyed: bool,
}

impl<S: ShardProvider, F: PipelineFactory> WorkerNode<S, F> {
    /// Validate the configuration and the shard, without starting threads.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidParameter`] for a bad configuration and
    /// [`NodeError::DatabaseMismatch`] if the shard does not hold
    /// `num_databases` databases.
    pub fn setup(
        num_databases: usize,
        shard: Arc<S>,
        shard_info: ShardInfo,
        config: NodeConfig,
        factory: F,
    ) -> Result<Self> {
        config.validate()?;
        let actual = shard.num_databases();
        if actual != num_databases {
            return Err(NodeError::DatabaseMismatch { expected: num_databases, actual });
        }
        if shard_info.my_shard >= shard_info.num_shards {
            return Err(NodeError::InvalidParameter {
                parameter: "shard".to_string(),
                reason: format!(
                    "shard {} is out of range for {} shards",
                    shard_info.my_shard, shard_info.num_shards
                ),
            });
        }
        log::info!(
            "Setting up worker node for shard {}/{}: {} database(s), {} threads",
            shard_info.my_shard + 1,
            shard_info.num_shards,
            num_databases,
            config.num_threads
        );
        Ok(Self {
            shared: Arc::new(SharedState::new(config, shard, shard_info)),
            factory: Arc::new(factory),
            num_databases,
            handles: Vec::new(),
            assigned: Vec::new(),
            started_at: None,
            destroyed: false,
        })
    }

    /// Spawn the worker threads. They wait in the barrier until a search starts.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ThreadSpawn`] if a thread cannot be created; any
    /// threads already created are shut down again.
    pub fn create_threads(&mut self) -> Result<()> {
        self.check_usable()?;
        if !self.handles.is_empty() {
            return Err(NodeError::ProtocolViolation {
                operation: "CreateThreads",
                phase: "threads already running".to_string(),
            });
        }
        let num_threads = self.shared.config.num_threads;
        log::debug!("Spawning {num_threads} worker threads");
        for thread_id in 0..num_threads {
            let shared = Arc::clone(&self.shared);
            let factory = Arc::clone(&self.factory);
            let spawned = std::thread::Builder::new()
                .name(format!("hmmnode-worker-{thread_id}"))
                .spawn(move || {
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        let stage = factory.create_stage(thread_id);
                        let mut state = ThreadState::new(thread_id, stage);
                        state.run(&shared);
                    }));
                    if let Err(panic_info) = result {
                        handle_worker_panic(&*shared, thread_id, panic_info);
                    }
                    shared.barrier.retire();
                });
            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    // The threads that never started count as gone for the barrier.
                    for _ in thread_id..num_threads {
                        self.shared.barrier.retire();
                    }
                    self.shutdown_threads();
                    return Err(NodeError::ThreadSpawn { thread_id, reason: e.to_string() });
                }
            }
        }
        Ok(())
    }

    /// Release the barrier once every thread is waiting in it.
    ///
    /// Blocks until all threads have parked. Returns the barrier generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is destroyed, has lost a worker, or has no
    /// threads.
    pub fn release_threads(&self) -> Result<u64> {
        self.check_usable()?;
        self.check_threads("ReleaseThreads")?;
        Ok(self.shared.barrier.release())
    }

    /// Start a one-model many-sequence search over `range` of `database`.
    ///
    /// # Errors
    ///
    /// See [`WorkerNode::start_model_vs_range`].
    pub fn start_range_vs_model(
        &mut self,
        database: u32,
        range: RecordRange,
        model: impl Into<Arc<[u8]>>,
    ) -> Result<()> {
        self.start(SearchQuery::new(database, SearchKind::Sequence, model), range)
    }

    /// Start a one-sequence many-model search over `range` of `database`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProtocolViolation`] if a search is running or the
    /// threads were never created, [`NodeError::UnknownDatabase`] or
    /// [`NodeError::InvalidRange`] if the range is not in the shard, and the
    /// fatal error if a worker has died.
    pub fn start_model_vs_range(
        &mut self,
        database: u32,
        range: RecordRange,
        sequence: impl Into<Arc<[u8]>>,
    ) -> Result<()> {
        self.start(SearchQuery::new(database, SearchKind::Hmm, sequence), range)
    }

    fn start(&mut self, query: SearchQuery, range: RecordRange) -> Result<()> {
        self.check_usable()?;
        self.check_threads("StartSearch")?;
        let phase = self.shared.search.phase();
        if phase.is_active() {
            return Err(NodeError::ProtocolViolation {
                operation: "StartSearch",
                phase: phase.to_string(),
            });
        }
        let records = self.check_range(query.database, range)?;

        let shared = &*self.shared;
        for slot in &shared.stats {
            *slot.lock() = ThreadStats::default();
        }
        shared.records_processed.store(0, Ordering::Relaxed);
        shared.progress.reset();
        shared.backend.reset_peak();
        if shared.config.track_coverage {
            shared.coverage.reset(records);
        }
        shared.handshake.reset();

        let kind = query.kind;
        let database = query.database;
        let generation = shared.search.begin(query)?;
        let chunks = shared.dispatcher.initialize_search(range);
        self.assigned = vec![range];
        self.started_at = Some(Instant::now());
        log::info!(
            "Starting {kind} search #{generation} on database {database}: {records} records \
             in {chunks} chunks",
            records = range.len()
        );
        shared.barrier.release();
        Ok(())
    }

    /// Append a macro-chunk from the coordinator to the running search.
    ///
    /// Wakes the threads if they had all parked waiting for work.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProtocolViolation`] if no search is running and
    /// [`NodeError::InvalidRange`] if the range is not in the shard.
    pub fn add_work(&mut self, range: RecordRange) -> Result<()> {
        self.check_usable()?;
        let snapshot = self.shared.search.snapshot();
        let Some(query) = snapshot.query else {
            return Err(NodeError::ProtocolViolation {
                operation: "AddWork",
                phase: snapshot.phase.to_string(),
            });
        };
        self.check_range(query.database, range)?;
        let phase = self.shared.search.continue_search()?;
        self.shared.handshake.work_arrived();
        let chunks = self.shared.dispatcher.add_work(range);
        self.assigned.push(range);
        log::debug!("Added {} records in {chunks} chunks ({phase})", range.len());
        self.release_if_parked();
        Ok(())
    }

    /// Release the threads if they all parked while work is still queued.
    ///
    /// Returns true if the barrier was released.
    pub fn release_if_parked(&self) -> bool {
        let shared = &*self.shared;
        if self.handles.is_empty()
            || !shared.search.phase().is_active()
            || shared.search.is_failed()
            || !shared.barrier.all_waiting()
            || !shared.dispatcher.has_remaining_work()
        {
            return false;
        }
        shared.barrier.release();
        true
    }

    /// Check on the threads, waking them if they parked with work pending.
    #[must_use]
    pub fn poll(&self) -> NodeActivity {
        let shared = &*self.shared;
        if !shared.search.phase().is_active() {
            return NodeActivity::Idle;
        }
        if self.release_if_parked() || !shared.barrier.all_waiting() {
            return NodeActivity::Working;
        }
        if shared.search.is_failed() {
            NodeActivity::Failed
        } else if shared.dispatcher.has_remaining_work() {
            NodeActivity::Working
        } else {
            NodeActivity::Drained
        }
    }

    /// Raise a work request even though no thread saw the queue run low, e.g.
    /// when the node drained before any chunk crossed the threshold.
    ///
    /// Returns true if a new request was raised.
    pub fn raise_work_request(&self) -> bool {
        self.shared.search.phase().is_active() && self.shared.handshake.queue_low()
    }

    /// Consume a pending work request. Returns true once per request raised.
    pub fn take_work_request(&self) -> bool {
        self.shared.handshake.take_request()
    }

    /// The coordinator has no more work for the running search.
    pub fn no_more_work(&self) {
        log::debug!("Coordinator has no more work for this search");
        self.shared.handshake.no_more_work();
    }

    /// End the running search and collect its results.
    ///
    /// Any work still queued or claimed is discarded. Waits for every thread
    /// to park, drains the back-end queue, merges the hits, returns every
    /// pooled object, and puts the node back in `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProtocolViolation`] if no search is running, the
    /// failure that aborted the search (the node is still usable afterwards),
    /// or the fatal error if a worker died.
    pub fn end_search(&mut self) -> Result<SearchResults> {
        if self.destroyed {
            return Err(NodeError::ShutDown);
        }
        let snapshot = self.shared.search.snapshot();
        let Some(query) = snapshot.query else {
            return Err(NodeError::ProtocolViolation {
                operation: "EndSearch",
                phase: snapshot.phase.to_string(),
            });
        };
        let shared = &*self.shared;

        let discarded = shared.dispatcher.reset();
        if discarded > 0 && !shared.search.is_failed() {
            log::warn!("Ending search with {discarded} records unprocessed");
        }
        while !shared.barrier.wait_until_all_waiting(PARK_WAIT_INTERVAL) {
            log::debug!(
                "Waiting for threads to park ({} of {} parked)",
                shared.barrier.waiting() + shared.barrier.retired(),
                shared.config.num_threads
            );
        }

        let drained = shared.backend.drain();
        if drained > 0 {
            log::debug!("Drained {drained} unscored back-end entries");
        }
        let failure = shared.search.take_failure();
        let fatal = shared.fatal_error();
        let hits = if failure.is_some() || fatal.is_some() {
            // Partial hits of a failed search go straight back to the pool.
            shared.hits.reset();
            Vec::new()
        } else {
            let hit_count = shared.hits.merge();
            let hits = shared.hits.take_results();
            debug_assert_eq!(hits.len() as u64, hit_count);
            hits
        };

        let thread_stats: Vec<ThreadStats> = shared
            .stats
            .iter()
            .map(|slot| std::mem::take(&mut *slot.lock()))
            .collect();
        let coverage =
            shared.config.track_coverage.then(|| shared.coverage.report(&self.assigned));
        let results = SearchResults {
            kind: query.kind,
            database: query.database,
            hits,
            records_processed: shared.records_processed.load(Ordering::Relaxed),
            comparisons_queued: thread_stats.iter().map(|s| s.comparisons_queued).sum(),
            backend_peak_depth: shared.backend.peak_depth(),
            steals: shared.dispatcher.steal_count(),
            thread_stats,
            coverage,
            elapsed: self.started_at.take().map_or(Duration::ZERO, |t| t.elapsed()),
        };

        shared.modes.reset();
        shared.handshake.reset();
        self.assigned.clear();
        let ended = shared.search.finish();
        log::debug!("Search ended in phase {ended}");

        if let Some(fatal) = fatal {
            return Err(fatal);
        }
        if let Some(failure) = failure {
            log::warn!("Search aborted: {failure}");
            return Err(failure);
        }
        if shared.config.progress_interval > 0 {
            shared.progress.log_final();
        }
        log_search_summary(&results);
        Ok(results)
    }

    /// Abort the running search, if any, discarding its results.
    ///
    /// Used when the coordinator breaks protocol. Returns true if a search
    /// was running.
    ///
    /// # Errors
    ///
    /// Returns the node's fatal error (for example
    /// [`NodeError::WorkerPanicked`]) if the node can no longer search. The
    /// `error` the search was aborted with is not returned.
    pub fn abort_search(&mut self, error: NodeError) -> Result<bool> {
        if !self.shared.search.phase().is_active() {
            return Ok(false);
        }
        self.shared.search.fail(error);
        match self.end_search() {
            Err(e) if e.is_fatal() => Err(e),
            _ => Ok(true),
        }
    }

    /// Shut the threads down and join them.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ShutDown`] if the node was already destroyed and
    /// [`NodeError::WorkerPanicked`] if a worker died during the node's life.
    pub fn destroy(mut self) -> Result<()> {
        if self.destroyed {
            return Err(NodeError::ShutDown);
        }
        log::info!("Shutting down worker node");
        self.shutdown_threads();
        match self.shared.fatal_error() {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }

    fn shutdown_threads(&mut self) {
        self.destroyed = true;
        self.shared.shutdown.store(true, Ordering::Release);
        if self.shared.search.phase().is_active() {
            self.shared.search.fail(NodeError::ShutDown);
        }
        if self.handles.is_empty() {
            return;
        }
        self.shared.barrier.release();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread panicked outside its catch guard");
            }
        }
        log::debug!("All worker threads joined");
    }

    fn check_usable(&self) -> Result<()> {
        if self.destroyed {
            return Err(NodeError::ShutDown);
        }
        match self.shared.fatal_error() {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }

    fn check_threads(&self, operation: &'static str) -> Result<()> {
        if self.handles.is_empty() {
            return Err(NodeError::ProtocolViolation {
                operation,
                phase: "threads not created".to_string(),
            });
        }
        Ok(())
    }

    /// Check `range` against the database; returns the database's record count.
    fn check_range(&self, database: u32, range: RecordRange) -> Result<u64> {
        let records = self
            .shared
            .shard
            .num_records(database)
            .ok_or(NodeError::UnknownDatabase { database, available: self.num_databases })?;
        if !range.is_empty() && range.end >= records {
            return Err(NodeError::InvalidRange { start: range.start, end: range.end, records });
        }
        Ok(records)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.shared.config.num_threads
    }

    /// The node's configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Which shard this node serves.
    #[must_use]
    pub fn shard_info(&self) -> ShardInfo {
        self.shared.shard_info
    }

    /// Current search phase.
    #[must_use]
    pub fn phase(&self) -> SearchPhase {
        self.shared.search.phase()
    }

    /// State of the work-request handshake.
    #[must_use]
    pub fn work_request_state(&self) -> RequestState {
        self.shared.handshake.state()
    }

    /// Threads currently in back-end mode.
    #[must_use]
    pub fn backend_threads(&self) -> usize {
        self.shared.modes.backend_threads()
    }

    /// Current back-end queue depth.
    #[must_use]
    pub fn backend_depth(&self) -> usize {
        self.shared.backend.depth()
    }

    /// Chunks waiting in the global queue.
    #[must_use]
    pub fn queued_chunks(&self) -> usize {
        self.shared.dispatcher.queue().len()
    }

    /// Returns true if no two threads currently claim the same record id.
    #[must_use]
    pub fn descriptors_disjoint(&self) -> bool {
        self.shared.dispatcher.descriptors_disjoint()
    }

    /// Counters for the chunk, back-end, and hit pools.
    #[must_use]
    pub fn pool_stats(&self) -> NodePoolStats {
        NodePoolStats {
            chunks: self.shared.dispatcher.queue().pool_stats(),
            backend: self.shared.backend.pool_stats(),
            hits: self.shared.hits.pool_stats(),
        }
    }
}

impl<S: ShardProvider, F: PipelineFactory> Drop for WorkerNode<S, F> {
    fn drop(&mut self) {
        if !self.destroyed {
            self.shutdown_threads();
        }
    }
}
