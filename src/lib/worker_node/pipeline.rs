//! Interfaces to the node's external collaborators.
//!
//! The worker node does not know how records are stored or scored. A
//! [`ShardProvider`] hands out record bytes by id, and each thread owns a
//! [`PipelineStage`] built by a [`PipelineFactory`] that runs the cheap
//! front-end filter and the expensive back-end score.

use std::fmt;
use std::sync::Arc;

use super::hits::Hit;

/// Direction of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    /// One model compared against a range of sequences.
    Sequence,
    /// One sequence compared against a range of models.
    Hmm,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "model-vs-sequences"),
            Self::Hmm => write!(f, "sequence-vs-models"),
        }
    }
}

/// What a search compares the database against.
///
/// Published once per search and shared read-only by every thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Database searched.
    pub database: u32,
    /// Search direction.
    pub kind: SearchKind,
    /// The model (for [`SearchKind::Sequence`]) or sequence (for
    /// [`SearchKind::Hmm`]) in the pipeline's own encoding.
    pub query: Arc<[u8]>,
}

impl SearchQuery {
    /// Create a query.
    #[must_use]
    pub fn new(database: u32, kind: SearchKind, query: impl Into<Arc<[u8]>>) -> Self {
        Self { database, kind, query: query.into() }
    }
}

/// Intermediate scores the front end passes on to the back end.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterScores {
    /// Forward filter score.
    pub forward: f32,
    /// Null model score.
    pub null: f32,
}

/// Result of the front-end filter for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutcome {
    /// The record survives and needs a back-end comparison.
    Pass(FilterScores),
    /// The record is rejected.
    Fail,
}

/// Which shard of the full database this node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardInfo {
    /// Number of shards each database is split into.
    pub num_shards: u32,
    /// This node's shard.
    pub my_shard: u32,
}

impl Default for ShardInfo {
    fn default() -> Self {
        Self { num_shards: 1, my_shard: 0 }
    }
}

/// Read access to the records of this node's shard.
pub trait ShardProvider: Send + Sync + 'static {
    /// Number of databases loaded in the shard.
    fn num_databases(&self) -> usize;

    /// Number of records of `database` held by this shard.
    fn num_records(&self, database: u32) -> Option<u64>;

    /// Bytes of one record.
    fn fetch_record(&self, database: u32, record_id: u64) -> Option<&[u8]>;
}

/// One thread's instance of the comparison pipeline.
pub trait PipelineStage: Send {
    /// Per-search setup, e.g. taking a local copy of the query model.
    fn begin_search(&mut self, query: &SearchQuery);

    /// Cheap filter that rejects most records.
    fn front_end_filter(&mut self, record: &[u8]) -> FilterOutcome;

    /// Full comparison for a front-end survivor.
    ///
    /// On a reportable hit, fills `hit` (an empty hit from the pool) and
    /// returns true.
    fn back_end_score(
        &mut self,
        record: &[u8],
        record_id: u64,
        scores: FilterScores,
        hit: &mut Hit,
    ) -> bool;
}

/// Builds the per-thread pipeline stages.
pub trait PipelineFactory: Send + Sync + 'static {
    /// The stage type each thread owns.
    type Stage: PipelineStage + 'static;

    /// Create the stage for `thread_id`.
    fn create_stage(&self, thread_id: usize) -> Self::Stage;
}

/// A shard held entirely in memory: `databases[db][record_id]`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShard {
    databases: Vec<Vec<Vec<u8>>>,
}

impl InMemoryShard {
    /// Create a shard from per-database record lists.
    #[must_use]
    pub fn new(databases: Vec<Vec<Vec<u8>>>) -> Self {
        Self { databases }
    }
}

impl ShardProvider for InMemoryShard {
    fn num_databases(&self) -> usize {
        self.databases.len()
    }

    fn num_records(&self, database: u32) -> Option<u64> {
        self.databases.get(database as usize).map(|records| records.len() as u64)
    }

    fn fetch_record(&self, database: u32, record_id: u64) -> Option<&[u8]> {
        let records = self.databases.get(database as usize)?;
        records.get(usize::try_from(record_id).ok()?).map(Vec::as_slice)
    }
}
