//! Synthetic shards of random protein records.
//!
//! Record lengths are drawn from a normal distribution and clamped. A query
//! can be planted into a fraction of the records so searches have something
//! to find.

use rand::{Rng, RngExt};
use rand_distr::{Distribution, Normal};

use super::rng::{create_rng, random_protein};
use crate::worker_node::ShardProvider;

/// Shortest record generated.
const MIN_RECORD_LENGTH: usize = 20;

/// A shard of synthetic protein databases held in memory.
#[derive(Debug, Clone)]
pub struct SyntheticShard {
    databases: Vec<Vec<Vec<u8>>>,
    planted: Vec<Vec<u64>>,
}

impl SyntheticShard {
    /// Start building a shard.
    #[must_use]
    pub fn builder() -> SyntheticShardBuilder {
        SyntheticShardBuilder::default()
    }

    /// Ids of the records that carry the planted motif in `database`.
    #[must_use]
    pub fn planted_ids(&self, database: u32) -> &[u64] {
        self.planted.get(database as usize).map_or(&[], Vec::as_slice)
    }

    /// Total residues across every database.
    #[must_use]
    pub fn total_residues(&self) -> u64 {
        self.databases.iter().flatten().map(|r| r.len() as u64).sum()
    }
}

impl ShardProvider for SyntheticShard {
    fn num_databases(&self) -> usize {
        self.databases.len()
    }

    fn num_records(&self, database: u32) -> Option<u64> {
        self.databases.get(database as usize).map(|db| db.len() as u64)
    }

    fn fetch_record(&self, database: u32, record_id: u64) -> Option<&[u8]> {
        let records = self.databases.get(database as usize)?;
        records.get(usize::try_from(record_id).ok()?).map(Vec::as_slice)
    }
}

/// Builder for [`SyntheticShard`].
#[derive(Debug, Clone)]
pub struct SyntheticShardBuilder {
    databases: usize,
    records: usize,
    mean_length: f64,
    length_sd: f64,
    motif: Option<Vec<u8>>,
    plant_fraction: f64,
    seed: Option<u64>,
}

impl Default for SyntheticShardBuilder {
    fn default() -> Self {
        Self {
            databases: 1,
            records: 1_000,
            mean_length: 300.0,
            length_sd: 80.0,
            motif: None,
            plant_fraction: 0.0,
            seed: None,
        }
    }
}

impl SyntheticShardBuilder {
    /// Number of databases.
    #[must_use]
    pub fn databases(mut self, databases: usize) -> Self {
        self.databases = databases;
        self
    }

    /// Records per database.
    #[must_use]
    pub fn records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// Mean and standard deviation of record length.
    #[must_use]
    pub fn lengths(mut self, mean: f64, sd: f64) -> Self {
        self.mean_length = mean;
        self.length_sd = sd;
        self
    }

    /// Copy `motif` into roughly `fraction` of the records.
    #[must_use]
    pub fn plant(mut self, motif: impl Into<Vec<u8>>, fraction: f64) -> Self {
        self.motif = Some(motif.into());
        self.plant_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Seed for reproducible shards.
    #[must_use]
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Generate the shard.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build(self) -> SyntheticShard {
        let mut rng = create_rng(self.seed);
        let lengths = Normal::new(self.mean_length, self.length_sd.max(0.0)).ok();
        let mut databases = Vec::with_capacity(self.databases);
        let mut planted = Vec::with_capacity(self.databases);
        for _ in 0..self.databases {
            let mut records = Vec::with_capacity(self.records);
            let mut carriers = Vec::new();
            for id in 0..self.records {
                let length = lengths
                    .as_ref()
                    .map_or(self.mean_length, |d| d.sample(&mut rng))
                    .round()
                    .max(MIN_RECORD_LENGTH as f64) as usize;
                let mut record = random_protein(&mut rng, length);
                if let Some(motif) = &self.motif
                    && rng.random_bool(self.plant_fraction)
                {
                    plant_motif(&mut rng, &mut record, motif);
                    carriers.push(id as u64);
                }
                records.push(record);
            }
            databases.push(records);
            planted.push(carriers);
        }
        log::debug!(
            "Generated {} database(s) of {} records ({} planted)",
            self.databases,
            self.records,
            planted.iter().map(Vec::len).sum::<usize>()
        );
        SyntheticShard { databases, planted }
    }
}

/// Overwrite a random window of `record` with `motif`, growing the record if
/// it is shorter than the motif.
fn plant_motif(rng: &mut impl Rng, record: &mut Vec<u8>, motif: &[u8]) {
    if record.len() < motif.len() {
        record.resize(motif.len(), b'A');
    }
    let at = rng.random_range(0..=record.len() - motif.len());
    record[at..at + motif.len()].copy_from_slice(motif);
}
