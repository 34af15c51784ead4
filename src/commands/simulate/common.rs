//! Shared CLI arguments for simulation commands.

use clap::{Args, ValueEnum};

use hmmnode_lib::simulate::SyntheticShard;
use hmmnode_lib::worker_node::SearchKind;

/// Synthetic shard options shared across all simulate subcommands.
#[derive(Args, Debug, Clone)]
pub struct ShardArgs {
    /// Random seed for reproducibility
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Number of databases in the shard
    #[arg(long = "databases", default_value = "1")]
    pub databases: usize,

    /// Records per database
    #[arg(short = 'n', long = "records", default_value = "10000")]
    pub records: usize,

    /// Mean record length in residues
    #[arg(long = "length-mean", default_value = "300.0")]
    pub length_mean: f64,

    /// Record length standard deviation
    #[arg(long = "length-stddev", default_value = "80.0")]
    pub length_stddev: f64,

    /// Motif planted into a fraction of the records
    #[arg(long = "motif")]
    pub motif: Option<String>,

    /// Fraction of records carrying the motif
    #[arg(long = "plant-fraction", default_value = "0.01")]
    pub plant_fraction: f64,
}

impl ShardArgs {
    /// Generate the shard.
    pub fn build_shard(&self) -> SyntheticShard {
        let mut builder = SyntheticShard::builder()
            .databases(self.databases)
            .records(self.records)
            .lengths(self.length_mean, self.length_stddev)
            .seed(self.seed);
        if let Some(motif) = &self.motif {
            builder = builder.plant(motif.as_bytes().to_vec(), self.plant_fraction);
        }
        builder.build()
    }
}

/// Toy pipeline options.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Word size of the k-mer front-end filter
    #[arg(short = 'k', long = "kmer-size", default_value = "3")]
    pub kmer_size: usize,

    /// Shared k-mers needed to pass the front end
    #[arg(long = "min-shared", default_value = "2")]
    pub min_shared: usize,

    /// Minimum ungapped alignment score for a hit (defaults to 4 * k)
    #[arg(long = "min-score")]
    pub min_score: Option<i32>,
}

impl PipelineArgs {
    /// Build the pipeline factory.
    pub fn to_pipeline(&self) -> hmmnode_lib::simulate::KmerPipeline {
        let pipeline = hmmnode_lib::simulate::KmerPipeline::new(self.kmer_size)
            .with_min_shared(self.min_shared);
        match self.min_score {
            Some(score) => pipeline.with_min_score(score),
            None => pipeline,
        }
    }
}

/// Search direction on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindArg {
    /// One model against a range of sequences
    #[default]
    Sequence,
    /// One sequence against a range of models
    Hmm,
}

impl From<KindArg> for SearchKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Sequence => SearchKind::Sequence,
            KindArg::Hmm => SearchKind::Hmm,
        }
    }
}
