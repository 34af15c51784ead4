//! Simulation utilities for exercising a worker node without real databases.
//!
//! # Modules
//!
//! - [`rng`] - Seeded random number generator utilities
//! - [`shard`] - Synthetic protein shards with planted motifs
//! - [`kmer_pipeline`] - A toy k-mer front end and ungapped back end
//! - [`coordinator`] - A scripted coordinator driving a node over channels

pub mod coordinator;
pub mod kmer_pipeline;
pub mod rng;
pub mod shard;

pub use coordinator::{ScriptedCoordinator, SearchScript};
pub use kmer_pipeline::{KmerPipeline, KmerStage, best_diagonal};
pub use rng::{AMINO_ACIDS, create_rng, random_protein};
pub use shard::{SyntheticShard, SyntheticShardBuilder};
