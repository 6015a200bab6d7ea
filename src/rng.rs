//! Deterministic sub-seed derivation.
//!
//! Every operator in the crate receives an explicit RNG rather than reaching
//! for thread-local randomness (Design Notes: "RNG threading"). For the
//! evolutionary loop's parallel fitness evaluation, each worker must own an
//! independent stream; we derive that stream's seed from the coordinates
//! that identify the unit of work `(generation, species_index,
//! individual_index[, episode_index])` rather than sharing one RNG across
//! workers, so the result is identical whether evaluation runs sequentially
//! or in parallel.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Mixes a root seed with a tuple of coordinates into a new 64-bit seed.
///
/// Uses the SplitMix64 finalizer, which has good avalanche behavior for
/// small integer inputs and needs no external dependency.
fn mix(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}

fn combine(seed: u64, coords: &[u64]) -> u64 {
    let mut acc = mix(seed);
    for &c in coords {
        acc = mix(acc ^ mix(c));
    }
    acc
}

/// Derives a sub-seed for a given `(generation, species_index,
/// individual_index)` triple and builds a fresh [`StdRng`] from it.
pub fn sub_rng(root_seed: u64, generation: u64, species_index: u64, individual_index: u64) -> StdRng {
    let seed = combine(root_seed, &[generation, species_index, individual_index]);
    StdRng::seed_from_u64(seed)
}

/// Like [`sub_rng`] but additionally keyed by episode index, for
/// multi-episode fitness evaluation.
pub fn sub_rng_episode(
    root_seed: u64,
    generation: u64,
    species_index: u64,
    individual_index: u64,
    episode_index: u64,
) -> StdRng {
    let seed = combine(
        root_seed,
        &[generation, species_index, individual_index, episode_index],
    );
    StdRng::seed_from_u64(seed)
}
