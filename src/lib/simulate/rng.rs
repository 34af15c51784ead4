//! Random number generator utilities for simulation.
//!
//! Provides seeded RNG creation for reproducible shards and queries.

use rand::rngs::StdRng;
use rand::{Rng, RngExt, SeedableRng};

/// The twenty standard amino-acid residues.
pub const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// Create a random number generator, optionally seeded for reproducibility.
///
/// # Examples
///
/// ```
/// use hmmnode_lib::simulate::create_rng;
///
/// // Reproducible simulation
/// let mut rng1 = create_rng(Some(42));
/// let mut rng2 = create_rng(Some(42));
/// // rng1 and rng2 will produce identical sequences
///
/// // Random simulation (different each run)
/// let mut rng3 = create_rng(None);
/// ```
#[must_use]
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

/// Draw a random protein sequence of `length` residues.
pub fn random_protein(rng: &mut impl Rng, length: usize) -> Vec<u8> {
    (0..length).map(|_| AMINO_ACIDS[rng.random_range(0..AMINO_ACIDS.len())]).collect()
}
