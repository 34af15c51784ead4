//! The worker-node concurrency core.
//!
//! A worker node searches one shard of a sequence or profile-HMM database
//! with a fixed pool of long-lived threads. Work arrives from a coordinator
//! as macro-chunks of record ids, is split into chunks on the
//! [`GlobalWorkQueue`], and is claimed one record at a time from per-thread
//! [`WorkDescriptor`]s. Idle threads refill from the queue or steal half of
//! the largest range a peer still holds.
//!
//! Each record runs through a cheap front-end filter; survivors go onto the
//! [`BackendQueue`] for the expensive back-end score. The
//! [`ThreadModeController`] moves threads between the two stages as that
//! queue grows and drains. Hits are kept per thread and merged once per
//! search by the [`HitCollector`].
//!
//! # Lock ordering
//!
//! - The global queue lock is never acquired while any descriptor lock is
//!   held (checked at runtime by [`lock_order`]).
//! - The back-end queue lock and back-end pool lock are independent leaves.
//! - The hit-list lock and hit pool lock are independent leaves.
//! - The backend-thread-count lock guards only the promotion counter.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hmmnode_lib::simulate::{KmerPipeline, SyntheticShard};
//! use hmmnode_lib::worker_node::{NodeActivity, NodeConfig, RecordRange, ShardInfo, WorkerNode};
//!
//! let shard = Arc::new(SyntheticShard::builder().databases(1).records(10_000).build());
//! let mut node =
//!     WorkerNode::setup(1, shard, ShardInfo::default(), NodeConfig::new(4), KmerPipeline::new(3))
//!         .unwrap();
//! node.create_threads().unwrap();
//! node.start_range_vs_model(0, RecordRange::new(0, 9_999), b"ACDEFGHIKL".to_vec()).unwrap();
//! while node.poll() == NodeActivity::Working {
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! let results = node.end_search().unwrap();
//! println!("{} hits", results.hit_count());
//! node.destroy().unwrap();
//! ```

pub mod backend;
pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod coverage;
pub mod dispatcher;
pub mod handshake;
pub mod hits;
pub mod lock_order;
pub mod mode;
pub mod node;
pub mod pipeline;
pub mod pool;
pub mod range;
pub mod search_state;
pub mod work_queue;
mod worker;

pub use backend::{BackendEntry, BackendQueue};
pub use barrier::StartBarrier;
pub use config::NodeConfig;
pub use coordinator::{CoordinatorMessage, NodeMessage, run_node};
pub use coverage::{CoverageCounter, CoverageReport};
pub use dispatcher::{ClaimSource, Claimed, WorkDispatcher};
pub use handshake::{RequestState, WorkRequestHandshake};
pub use hits::{Hit, HitCollector, LocalHits, is_ranked};
pub use mode::{ModeDecision, ModePolicy, ThreadMode, ThreadModeController};
pub use node::{NodeActivity, NodePoolStats, SearchResults, WorkerNode};
pub use pipeline::{
    FilterOutcome, FilterScores, InMemoryShard, PipelineFactory, PipelineStage, SearchKind,
    SearchQuery, ShardInfo, ShardProvider,
};
pub use pool::{ObjectPool, PoolStats, Poolable};
pub use range::{RecordRange, WorkChunk, WorkDescriptor};
pub use search_state::{SearchPhase, SearchSnapshot, SearchState};
pub use work_queue::GlobalWorkQueue;
pub use worker::{ThreadStats, extract_panic_message};
