//! Layered topology model (spec.md §3/§4.1: `SpeciesSpec`).
//!
//! A [`SpeciesSpec`] is the data contract shared by every individual in a
//! species: nodes are grouped into ordered rows, edges only run strictly
//! forward between rows (acyclic by construction), and per-row activation
//! whitelists constrain what each node may compute. Canonical edge order —
//! edges sorted by `(dest, src)` — is the single source of truth for weight
//! array alignment; no component stores an edge id anywhere else.

pub mod builder;
pub mod connectivity;

use serde::{Deserialize, Serialize};

use crate::activation::{mask_contains, ActivationMask, ActivationType};
use crate::error::{EvoError, EvoResult};

/// `(node_start, node_count, edge_start, edge_count)` for one row, derived by
/// [`SpeciesSpec::build_row_plans`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPlan {
    pub node_start: usize,
    pub node_count: usize,
    pub edge_start: usize,
    pub edge_count: usize,
}

/// Shared topology owned by a [`crate::population::Species`].
///
/// All individuals in the species align their `weights` array 1:1 with
/// `edges` in the order left by the most recent [`SpeciesSpec::build_row_plans`]
/// call; any operator that mutates `edges` must rebuild row plans and hand
/// back a remap so callers can reindex every individual (Design Notes:
/// "Cross-individual weight reindexing on spec mutation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub row_counts: Vec<usize>,
    pub allowed_activations_per_row: Vec<ActivationMask>,
    pub edges: Vec<(usize, usize)>,
    pub max_in_degree: usize,
    pub row_plans: Vec<RowPlan>,
}

impl SpeciesSpec {
    /// Total number of nodes across all rows.
    pub fn total_nodes(&self) -> usize {
        self.row_counts.iter().sum()
    }

    /// Index of the row a node belongs to. `O(rows)`.
    pub fn row_of(&self, node: usize) -> EvoResult<usize> {
        let mut start = 0;
        for (r, &count) in self.row_counts.iter().enumerate() {
            if node < start + count {
                return Ok(r);
            }
            start += count;
        }
        Err(EvoError::NodeOutOfRange {
            node,
            total: self.total_nodes(),
        })
    }

    /// First node index of `row`.
    pub fn row_start(&self, row: usize) -> usize {
        self.row_counts[..row].iter().sum()
    }

    pub fn is_input_row(&self, row: usize) -> bool {
        row == 0
    }

    pub fn is_output_row(&self, row: usize) -> bool {
        row + 1 == self.row_counts.len()
    }

    pub fn is_activation_allowed(&self, row: usize, act: ActivationType) -> bool {
        mask_contains(self.allowed_activations_per_row[row], act)
    }

    /// In-degree of `node`, counted over the current (possibly
    /// uncanonicalized) `edges` list.
    pub fn in_degree(&self, node: usize) -> usize {
        self.edges.iter().filter(|&&(_, d)| d == node).count()
    }

    /// Number of edges currently sharing `(src, dst)` (0, 1, or 2 by
    /// invariant — Q2: the parallel-edge ceiling is 2).
    pub fn parallel_count(&self, src: usize, dst: usize) -> usize {
        self.edges
            .iter()
            .filter(|&&(s, d)| s == src && d == dst)
            .count()
    }

    /// Enforces I1–I6. Does not require `row_plans` to be built.
    pub fn validate(&self) -> EvoResult<()> {
        if self.row_counts.is_empty() {
            return Err(EvoError::InvalidTopology {
                reason: "spec has no rows".into(),
            });
        }
        if self.row_counts.iter().any(|&c| c == 0) {
            return Err(EvoError::InvalidTopology {
                reason: "row count must be positive".into(),
            });
        }
        if self.allowed_activations_per_row.len() != self.row_counts.len() {
            return Err(EvoError::InvalidTopology {
                reason: "allowed_activations_per_row must have one entry per row".into(),
            });
        }

        let total = self.total_nodes();
        let mut in_degree = vec![0usize; total];
        for &(src, dst) in &self.edges {
            if src >= total || dst >= total {
                return Err(EvoError::InvalidTopology {
                    reason: format!("edge ({src}, {dst}) references a node outside [0, {total})"),
                });
            }
            let row_src = self.row_of(src)?;
            let row_dst = self.row_of(dst)?;
            if row_src >= row_dst {
                return Err(EvoError::InvalidTopology {
                    reason: format!(
                        "edge ({src}, {dst}) is not strictly forward (row {row_src} -> row {row_dst})"
                    ),
                });
            }
            in_degree[dst] += 1;
        }
        if let Some((node, &deg)) = in_degree
            .iter()
            .enumerate()
            .find(|&(_, &deg)| deg > self.max_in_degree)
        {
            return Err(EvoError::InvalidTopology {
                reason: format!(
                    "node {node} has in-degree {deg} exceeding max_in_degree {}",
                    self.max_in_degree
                ),
            });
        }

        let last = self.row_counts.len() - 1;
        let output_mask = self.allowed_activations_per_row[last];
        for act in crate::activation::mask_members(output_mask) {
            if !act.valid_for_output() {
                return Err(EvoError::InvalidTopology {
                    reason: format!("output row allows {act:?}, which is not valid_for_output"),
                });
            }
        }

        Ok(())
    }

    /// Sorts `edges` by `(dest, src)` ascending and fills `row_plans`.
    ///
    /// Returns the permutation `old_index -> new_index` so callers holding
    /// weight arrays aligned to the pre-sort order can reconcile them (I7).
    pub fn build_row_plans(&mut self) -> Vec<usize> {
        let mut indexed: Vec<(usize, (usize, usize))> =
            self.edges.iter().copied().enumerate().collect();
        indexed.sort_by_key(|&(_, (src, dst))| (dst, src));

        let mut remap = vec![0usize; indexed.len()];
        let mut new_edges = Vec::with_capacity(indexed.len());
        for (new_idx, &(old_idx, edge)) in indexed.iter().enumerate() {
            remap[old_idx] = new_idx;
            new_edges.push(edge);
        }
        self.edges = new_edges;

        let mut row_plans = Vec::with_capacity(self.row_counts.len());
        let mut node_start = 0;
        let mut edge_cursor = 0;
        for &row_count in &self.row_counts {
            let row_end = node_start + row_count;
            let edge_start = edge_cursor;
            while edge_cursor < self.edges.len() && self.edges[edge_cursor].1 < row_end {
                edge_cursor += 1;
            }
            row_plans.push(RowPlan {
                node_start,
                node_count: row_count,
                edge_start,
                edge_count: edge_cursor - edge_start,
            });
            node_start = row_end;
        }
        self.row_plans = row_plans;

        remap
    }
}
