//! Seeded random helpers shared by setup and the worker contexts.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Golden-ratio constant used to decorrelate derived seeds.
const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Salt for the key-digit stream so it never mirrors the value stream.
const KEY_STREAM: u64 = 0x6b65_7973;

pub fn seeded(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Mix the base seed with the worker id for a deterministic per-worker RNG.
pub fn worker_seed(base: u64, worker: usize) -> u64 {
    base ^ (worker as u64 + 1).wrapping_mul(SEED_MIX)
}

pub fn key_seed(base: u64) -> u64 {
    base ^ KEY_STREAM.wrapping_mul(SEED_MIX)
}

/// Uniform index in `[0, bound)`. `bound` must be non-zero.
pub fn random_index(rng: &mut impl Rng, bound: usize) -> usize {
    rng.gen_range(0..bound)
}
