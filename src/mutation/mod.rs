//! Mutation suite (spec.md §4.3) — two disjoint surfaces: per-individual
//! mutations here (topology-invariant), structural mutations in
//! [`structural`] (operate on a [`crate::topology::SpeciesSpec`] and the
//! population's weight arrays), plus complexity-based rate balancing and
//! weak-edge pruning in [`balance`].

pub mod balance;
pub mod structural;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::individual::{gaussian, Individual};
use crate::topology::SpeciesSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    pub weight_jitter: f32,
    pub weight_jitter_stddev: f32,
    pub weight_reset: f32,
    pub weight_l1_shrink: f32,
    pub l1_shrink_factor: f32,
    pub activation_swap: f32,
    pub node_param_mutate: f32,
    pub node_param_stddev: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        MutationConfig {
            weight_jitter: 0.8,
            weight_jitter_stddev: 0.1,
            weight_reset: 0.05,
            weight_l1_shrink: 0.02,
            l1_shrink_factor: 0.98,
            activation_swap: 0.02,
            node_param_mutate: 0.1,
            node_param_stddev: 0.05,
        }
    }
}

/// Applies every per-individual operator to `individual` in place, in the
/// order the spec lists them (jitter, reset, shrink, activation swap,
/// node-param mutate). Topology-invariant: `individual.weights.len()` and
/// node counts never change.
pub fn mutate_individual(
    individual: &mut Individual,
    spec: &SpeciesSpec,
    config: &MutationConfig,
    rng: &mut impl Rng,
) {
    weight_jitter(individual, config, rng);
    weight_reset(individual, config, rng);
    weight_l1_shrink(individual, config, rng);
    activation_swap(individual, spec, config, rng);
    node_param_mutate(individual, config, rng);
}

/// `w <- w + N(0, stddev * |w|)` for every weight, with probability
/// `config.weight_jitter` gating the whole operator (not per-weight).
fn weight_jitter(individual: &mut Individual, config: &MutationConfig, rng: &mut impl Rng) {
    if !rng.gen_bool(config.weight_jitter as f64) {
        return;
    }
    for w in individual.weights.iter_mut() {
        let noise = gaussian(config.weight_jitter_stddev * w.abs(), rng);
        *w += noise;
    }
}

/// Replaces one uniformly chosen weight with a uniform draw in `[-1, 1]`.
fn weight_reset(individual: &mut Individual, config: &MutationConfig, rng: &mut impl Rng) {
    if individual.weights.is_empty() || !rng.gen_bool(config.weight_reset as f64) {
        return;
    }
    let idx = rng.gen_range(0..individual.weights.len());
    individual.weights[idx] = rng.gen_range(-1.0..=1.0);
}

/// Multiplies every weight by `l1_shrink_factor` (sign preserved, magnitude
/// reduced).
fn weight_l1_shrink(individual: &mut Individual, config: &MutationConfig, rng: &mut impl Rng) {
    if !rng.gen_bool(config.weight_l1_shrink as f64) {
        return;
    }
    for w in individual.weights.iter_mut() {
        *w *= config.l1_shrink_factor;
    }
}

/// For each non-input node with more than one allowed activation in its
/// row, with probability `config.activation_swap` replaces its activation
/// with a uniformly chosen allowed alternative and resets its parameters to
/// that activation's defaults.
fn activation_swap(
    individual: &mut Individual,
    spec: &SpeciesSpec,
    config: &MutationConfig,
    rng: &mut impl Rng,
) {
    for node in spec.row_counts[0]..spec.total_nodes() {
        let row = spec.row_of(node).expect("node within bounds");
        let allowed = crate::activation::mask_members(spec.allowed_activations_per_row[row]);
        if allowed.len() <= 1 || !rng.gen_bool(config.activation_swap as f64) {
            continue;
        }
        let current = individual.activations[node];
        let alternatives: Vec<_> = allowed.into_iter().filter(|&a| a != current).collect();
        if alternatives.is_empty() {
            continue;
        }
        let chosen = alternatives[rng.gen_range(0..alternatives.len())];
        individual.activations[node] = chosen;
        individual.node_params[node] = chosen.default_parameters();
    }
}

/// For each node whose activation requires parameters, with probability
/// `config.node_param_mutate` adds `N(0, node_param_stddev)` to each
/// required slot, then clamps to `[-10, 10]`.
fn node_param_mutate(individual: &mut Individual, config: &MutationConfig, rng: &mut impl Rng) {
    for node in 0..individual.activations.len() {
        let act = individual.activations[node];
        let required = act.required_param_count();
        if required == 0 || !rng.gen_bool(config.node_param_mutate as f64) {
            continue;
        }
        for slot in individual.node_params[node].iter_mut().take(required) {
            *slot = (*slot + gaussian(config.node_param_stddev, rng)).clamp(-10.0, 10.0);
        }
    }
}
