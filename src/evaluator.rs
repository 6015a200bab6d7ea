//! Row-plan evaluator (spec.md §4.2) — deterministic inference that
//! realizes an individual's weights/activations/biases on its species
//! topology.
//!
//! Exposed both as a free function and as an [`Evaluator`] trait
//! implemented by the unit struct [`RowPlanEvaluator`], matching the
//! teacher's `Backend` trait pattern of defining the contract once and
//! providing one concrete implementation (so the out-of-scope GPU batch
//! evaluator can plug in behind the same interface).

use crate::error::{EvoError, EvoResult};
use crate::individual::Individual;
use crate::topology::SpeciesSpec;

pub trait Evaluator {
    fn evaluate(
        &self,
        spec: &SpeciesSpec,
        individual: &Individual,
        inputs: &[f32],
    ) -> EvoResult<Vec<f32>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RowPlanEvaluator;

impl Evaluator for RowPlanEvaluator {
    fn evaluate(
        &self,
        spec: &SpeciesSpec,
        individual: &Individual,
        inputs: &[f32],
    ) -> EvoResult<Vec<f32>> {
        evaluate(spec, individual, inputs)
    }
}

/// Runs one forward pass. `spec.row_plans` must be up to date (i.e.
/// `build_row_plans` has been called since the last edge mutation) —
/// weight-array alignment depends on it.
#[tracing::instrument(level = "trace", skip(spec, individual, inputs), fields(nodes = spec.total_nodes(), edges = spec.edges.len()))]
pub fn evaluate(spec: &SpeciesSpec, individual: &Individual, inputs: &[f32]) -> EvoResult<Vec<f32>> {
    let input_row = &spec.row_plans[0];
    if inputs.len() != input_row.node_count {
        return Err(EvoError::InvalidInputSize {
            expected: input_row.node_count,
            got: inputs.len(),
        });
    }

    let total_nodes = spec.total_nodes();
    let mut values = vec![0.0f32; total_nodes];
    values[..inputs.len()].copy_from_slice(inputs);

    for row_plan in spec.row_plans.iter().skip(1) {
        for node in row_plan.node_start..row_plan.node_start + row_plan.node_count {
            let mut acc = individual.biases[node];
            for edge_idx in row_plan.edge_start..row_plan.edge_start + row_plan.edge_count {
                let (src, dst) = spec.edges[edge_idx];
                if dst != node {
                    continue;
                }
                acc += individual.weights[edge_idx] * values[src];
            }
            let act = individual.activations[node];
            values[node] = act.evaluate(acc, &individual.node_params[node]);
            if !values[node].is_finite() {
                return Err(EvoError::NonFiniteOutput { node });
            }
        }
    }

    let last = spec.row_plans.last().expect("at least one row");
    Ok(values[last.node_start..last.node_start + last.node_count].to_vec())
}
