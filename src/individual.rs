//! Per-individual mutable state (spec.md §3: `Individual`).
//!
//! An [`Individual`] carries everything an evaluator needs beyond the
//! shared [`crate::topology::SpeciesSpec`]: weights aligned to the spec's
//! canonical edge order, per-node biases, activation choices, and up to
//! four activation parameters per node. Individuals never share arrays —
//! cloning is always a deep copy, which is what elitism relies on.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::topology::SpeciesSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    pub node_params: Vec<[f32; 4]>,
    pub activations: Vec<ActivationType>,
    pub fitness: f32,
    pub age: u32,
}

impl Individual {
    /// Builds a freshly initialized individual matching `spec`'s current
    /// edge/node counts. Weights use Glorot-uniform by fan-in/fan-out of
    /// each node's row transition; every node starts with the first
    /// allowed activation in its row (or `Linear` if its mask is empty, as
    /// is conventional for the input row).
    pub fn random_for_spec(spec: &SpeciesSpec, rng: &mut impl Rng) -> Self {
        let total_nodes = spec.total_nodes();
        let mut activations = Vec::with_capacity(total_nodes);
        let mut node_params = Vec::with_capacity(total_nodes);
        for node in 0..total_nodes {
            let row = spec.row_of(node).expect("node within spec bounds");
            let act = default_activation_for_row(spec, row);
            node_params.push(act.default_parameters());
            activations.push(act);
        }

        let weights = spec
            .edges
            .iter()
            .map(|&(src, dst)| glorot_weight(spec, src, dst, rng))
            .collect();

        Individual {
            weights,
            biases: vec![0.0; total_nodes],
            node_params,
            activations,
            fitness: f32::MIN,
            age: 0,
        }
    }
}

/// First allowed activation in `row`'s mask, in enum declaration order, or
/// `Linear` if the mask is empty (the input row's convention, spec.md §3).
fn default_activation_for_row(spec: &SpeciesSpec, row: usize) -> ActivationType {
    crate::activation::mask_members(spec.allowed_activations_per_row[row])
        .into_iter()
        .next()
        .unwrap_or(ActivationType::Linear)
}

/// Glorot/Xavier-uniform initialization scaled by the fan-in of `dst`'s row
/// and the fan-out of `src`'s row (spec.md §4.3 "newly initialized weight
/// (Glorot)").
pub fn glorot_weight(spec: &SpeciesSpec, src: usize, dst: usize, rng: &mut impl Rng) -> f32 {
    let fan_in = spec.in_degree(dst).max(1);
    let src_row = spec.row_of(src).unwrap_or(0);
    let fan_out = spec
        .edges
        .iter()
        .filter(|&&(s, _)| spec.row_of(s).unwrap_or(usize::MAX) == src_row)
        .count()
        .max(1);
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    rng.gen_range(-limit..=limit)
}

/// Draws a small-amplitude weight in `U(-amplitude, amplitude)`, used to
/// initialize `EdgeSplitSmart`'s stabilization edges (spec.md §4.3, S8).
pub fn small_weight(amplitude: f32, rng: &mut impl Rng) -> f32 {
    rng.gen_range(-amplitude..=amplitude)
}

/// Gaussian sample with mean 0 and the given standard deviation, used by
/// weight jitter and node-param mutation.
pub fn gaussian(stddev: f32, rng: &mut impl Rng) -> f32 {
    if stddev <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, stddev)
        .expect("stddev is finite and positive")
        .sample(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::builder::SpeciesBuilder;

    #[test]
    fn random_individual_matches_spec_dimensions() {
        let spec = SpeciesBuilder::new()
            .add_input_row(2)
            .add_hidden_row(3, [ActivationType::ReLU, ActivationType::Tanh])
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(8)
            .fully_connect(0, 1)
            .fully_connect(1, 2)
            .build()
            .unwrap();
        let mut rng = rand::thread_rng();
        let ind = Individual::random_for_spec(&spec, &mut rng);
        assert_eq!(ind.weights.len(), spec.edges.len());
        assert_eq!(ind.biases.len(), spec.total_nodes());
        assert_eq!(ind.activations.len(), spec.total_nodes());
    }
}
