//! `SpeciesBuilder` (spec.md §6) — the only constructor of a valid
//! [`SpeciesSpec`].

use rand::Rng;

use crate::activation::{mask_from, ActivationType};
use crate::error::EvoResult;

use super::SpeciesSpec;

pub struct SpeciesBuilder {
    row_counts: Vec<usize>,
    allowed_activations_per_row: Vec<u16>,
    edges: Vec<(usize, usize)>,
    max_in_degree: usize,
}

impl Default for SpeciesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeciesBuilder {
    pub fn new() -> Self {
        SpeciesBuilder {
            row_counts: Vec::new(),
            allowed_activations_per_row: Vec::new(),
            edges: Vec::new(),
            max_in_degree: usize::MAX,
        }
    }

    /// Row 0: `n` input nodes. The allowed-activation mask is 0 — inputs
    /// never apply an activation (spec.md §4.2 step 3).
    pub fn add_input_row(mut self, n: usize) -> Self {
        assert!(self.row_counts.is_empty(), "input row must be added first");
        self.row_counts.push(n);
        self.allowed_activations_per_row.push(0);
        self
    }

    pub fn add_hidden_row(
        mut self,
        n: usize,
        allowed_activations: impl IntoIterator<Item = ActivationType>,
    ) -> Self {
        self.row_counts.push(n);
        self.allowed_activations_per_row
            .push(mask_from(allowed_activations));
        self
    }

    pub fn add_output_row(
        mut self,
        n: usize,
        allowed_activations: impl IntoIterator<Item = ActivationType>,
    ) -> Self {
        self.row_counts.push(n);
        self.allowed_activations_per_row
            .push(mask_from(allowed_activations));
        self
    }

    pub fn with_max_in_degree(mut self, k: usize) -> Self {
        self.max_in_degree = k;
        self
    }

    pub fn add_edge(mut self, src: usize, dst: usize) -> Self {
        self.edges.push((src, dst));
        self
    }

    fn row_bounds(&self, row: usize) -> (usize, usize) {
        let start: usize = self.row_counts[..row].iter().sum();
        (start, start + self.row_counts[row])
    }

    /// Adds every `(src, dst)` pair between two rows (dense bipartite
    /// connection), respecting `max_in_degree` is the caller's job — this
    /// is the "fully connected" convenience and does not check the bound
    /// itself; `build()` will reject the result if it overflows.
    pub fn fully_connect(mut self, from_row: usize, to_row: usize) -> Self {
        let (from_start, from_end) = self.row_bounds(from_row);
        let (to_start, to_end) = self.row_bounds(to_row);
        for src in from_start..from_end {
            for dst in to_start..to_end {
                self.edges.push((src, dst));
            }
        }
        self
    }

    /// Minimum edge set that keeps every output reachable from an input:
    /// for each row transition, connects each destination node to one
    /// source node of the preceding row, cycling sources to spread fan-out.
    pub fn initialize_sparse(mut self, _rng: &mut impl Rng) -> Self {
        for row in 1..self.row_counts.len() {
            let (prev_start, prev_end) = self.row_bounds(row - 1);
            let (cur_start, cur_end) = self.row_bounds(row);
            let prev_len = prev_end - prev_start;
            for (i, dst) in (cur_start..cur_end).enumerate() {
                let src = prev_start + (i % prev_len);
                self.edges.push((src, dst));
            }
        }
        self
    }

    /// For each destination node, draws `max(1, round(density *
    /// prev_layer_size))` sources from the preceding row, without
    /// replacement, clamped to `max_in_degree`.
    pub fn initialize_dense(mut self, rng: &mut impl Rng, density: f64) -> Self {
        assert!(density > 0.0 && density <= 1.0, "density must be in (0, 1]");
        for row in 1..self.row_counts.len() {
            let (prev_start, prev_end) = self.row_bounds(row - 1);
            let (cur_start, cur_end) = self.row_bounds(row);
            let prev_len = prev_end - prev_start;
            let draws = ((density * prev_len as f64).round() as usize)
                .max(1)
                .min(prev_len)
                .min(self.max_in_degree.max(1));
            for dst in cur_start..cur_end {
                let mut pool: Vec<usize> = (prev_start..prev_end).collect();
                for i in 0..draws {
                    let j = rng.gen_range(i..pool.len());
                    pool.swap(i, j);
                    self.edges.push((pool[i], dst));
                }
            }
        }
        self
    }

    /// Runs `validate()` then `build_row_plans()`.
    pub fn build(self) -> EvoResult<SpeciesSpec> {
        let mut spec = SpeciesSpec {
            row_counts: self.row_counts,
            allowed_activations_per_row: self.allowed_activations_per_row,
            edges: self.edges,
            max_in_degree: self.max_in_degree,
            row_plans: Vec::new(),
        };
        spec.validate()?;
        spec.build_row_plans();
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;

    #[test]
    fn fully_connected_two_layer_builds() {
        let spec = SpeciesBuilder::new()
            .add_input_row(2)
            .add_output_row(3, [ActivationType::Linear])
            .with_max_in_degree(2)
            .fully_connect(0, 1)
            .build()
            .unwrap();
        assert_eq!(spec.edges.len(), 6);
        assert_eq!(spec.row_plans.len(), 2);
    }

    #[test]
    fn in_degree_violation_rejected() {
        let result = SpeciesBuilder::new()
            .add_input_row(3)
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(2)
            .fully_connect(0, 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn sparse_init_keeps_every_output_connected() {
        let mut rng = rand::thread_rng();
        let spec = SpeciesBuilder::new()
            .add_input_row(3)
            .add_hidden_row(4, [ActivationType::ReLU])
            .add_output_row(2, [ActivationType::Tanh])
            .with_max_in_degree(8)
            .initialize_sparse(&mut rng)
            .build()
            .unwrap();
        assert!(crate::topology::connectivity::validate_connectivity(&spec));
    }

    #[test]
    fn output_row_rejects_non_output_valid_activation() {
        let result = SpeciesBuilder::new()
            .add_input_row(1)
            .add_output_row(1, [ActivationType::ReLU])
            .with_max_in_degree(1)
            .add_edge(0, 1)
            .build();
        assert!(result.is_err());
    }
}
