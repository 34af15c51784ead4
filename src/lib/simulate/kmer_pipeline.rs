//! A toy two-stage comparison pipeline for simulation and testing.
//!
//! The front end counts query k-mers that occur in the record and passes
//! records sharing at least `min_shared` of them. The back end finds the best
//! ungapped local alignment between query and record along any diagonal and
//! reports a hit when it reaches `min_score`.

use ahash::AHashSet;
use std::sync::Arc;

use crate::worker_node::{
    FilterOutcome, FilterScores, Hit, PipelineFactory, PipelineStage, SearchQuery,
};

/// Longest k-mer that packs into a `u64` key.
pub const MAX_K: usize = 8;

/// Score for an identical residue pair.
const MATCH_SCORE: i32 = 2;
/// Score for a differing residue pair.
const MISMATCH_SCORE: i32 = -1;

/// Builds one [`KmerStage`] per worker thread.
#[derive(Debug, Clone, Copy)]
pub struct KmerPipeline {
    k: usize,
    min_shared: usize,
    min_score: i32,
}

impl KmerPipeline {
    /// Pipeline with word size `k` (clamped to `1..=MAX_K`), passing records
    /// that share one k-mer and reporting alignments scoring at least `4 * k`.
    #[must_use]
    pub fn new(k: usize) -> Self {
        let k = k.clamp(1, MAX_K);
        Self { k, min_shared: 1, min_score: i32::try_from(4 * k).unwrap_or(i32::MAX) }
    }

    /// Minimum number of shared k-mers for a record to pass the front end.
    #[must_use]
    pub fn with_min_shared(mut self, min_shared: usize) -> Self {
        self.min_shared = min_shared.max(1);
        self
    }

    /// Minimum alignment score for a hit.
    #[must_use]
    pub fn with_min_score(mut self, min_score: i32) -> Self {
        self.min_score = min_score;
        self
    }
}

impl PipelineFactory for KmerPipeline {
    type Stage = KmerStage;

    fn create_stage(&self, _thread_id: usize) -> KmerStage {
        KmerStage {
            k: self.k,
            min_shared: self.min_shared,
            min_score: self.min_score,
            query: Arc::from(Vec::new()),
            kmers: AHashSet::new(),
        }
    }
}

/// One thread's copy of the pipeline, holding its own query k-mer index.
#[derive(Debug)]
pub struct KmerStage {
    k: usize,
    min_shared: usize,
    min_score: i32,
    query: Arc<[u8]>,
    kmers: AHashSet<u64>,
}

impl KmerStage {
    /// Number of distinct k-mers indexed from the current query.
    #[must_use]
    pub fn indexed_kmers(&self) -> usize {
        self.kmers.len()
    }
}

fn pack(word: &[u8]) -> u64 {
    word.iter().fold(0_u64, |key, &b| (key << 8) | u64::from(b))
}

impl PipelineStage for KmerStage {
    fn begin_search(&mut self, query: &SearchQuery) {
        self.query = Arc::clone(&query.query);
        self.kmers.clear();
        self.kmers.extend(self.query.windows(self.k).map(pack));
    }

    #[allow(clippy::cast_precision_loss)]
    fn front_end_filter(&mut self, record: &[u8]) -> FilterOutcome {
        if record.len() < self.k || self.kmers.is_empty() {
            return FilterOutcome::Fail;
        }
        let shared = record.windows(self.k).filter(|w| self.kmers.contains(&pack(w))).count();
        if shared < self.min_shared {
            return FilterOutcome::Fail;
        }
        // Expected chance matches against a uniform 20-letter alphabet.
        let positions = (record.len() - self.k + 1) as f32;
        let null = positions * self.kmers.len() as f32 / 20_f32.powi(self.k as i32);
        FilterOutcome::Pass(FilterScores { forward: shared as f32, null })
    }

    #[allow(clippy::cast_precision_loss)]
    fn back_end_score(
        &mut self,
        record: &[u8],
        record_id: u64,
        _scores: FilterScores,
        hit: &mut Hit,
    ) -> bool {
        let Some(best) = best_diagonal(&self.query, record) else {
            return false;
        };
        if best.score < self.min_score {
            return false;
        }
        hit.score = best.score as f32;
        hit.record_id = record_id;
        hit.payload.extend_from_slice(
            format!("q{}-t{}-len{}", best.query_start, best.target_start, best.length).as_bytes(),
        );
        true
    }
}

/// Best ungapped local alignment found on one diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagonalHit {
    /// Alignment score.
    pub score: i32,
    /// First aligned query position.
    pub query_start: usize,
    /// First aligned target position.
    pub target_start: usize,
    /// Aligned length.
    pub length: usize,
}

/// Highest-scoring ungapped local alignment of `query` against `target`.
///
/// Scans every diagonal with Kadane's maximum-subarray rule. Ties keep the
/// first alignment found.
#[must_use]
pub fn best_diagonal(query: &[u8], target: &[u8]) -> Option<DiagonalHit> {
    if query.is_empty() || target.is_empty() {
        return None;
    }
    let mut best: Option<DiagonalHit> = None;
    let diagonals = (0..target.len()).map(|t| (0, t)).chain((1..query.len()).map(|q| (q, 0)));
    for (q0, t0) in diagonals {
        let mut run = 0;
        let mut run_start = 0;
        let steps = (query.len() - q0).min(target.len() - t0);
        for i in 0..steps {
            let pair = if query[q0 + i] == target[t0 + i] { MATCH_SCORE } else { MISMATCH_SCORE };
            if run <= 0 {
                run = pair;
                run_start = i;
            } else {
                run += pair;
            }
            if run > 0 && best.is_none_or(|b| run > b.score) {
                best = Some(DiagonalHit {
                    score: run,
                    query_start: q0 + run_start,
                    target_start: t0 + run_start,
                    length: i + 1 - run_start,
                });
            }
        }
    }
    best
}
