//! Connectivity oracle (spec.md §4.4).
//!
//! Reachability from the input row and to the output row, used by structural
//! mutation operators to avoid disconnecting an output from every input.
//! No cycles are possible by construction (I3), so plain BFS suffices.

use std::collections::VecDeque;

use super::SpeciesSpec;

/// Forward reachability from the input row: nodes reachable by following
/// edges away from some input node.
fn forward_reachable(spec: &SpeciesSpec, edges: &[(usize, usize)]) -> Vec<bool> {
    let total = spec.total_nodes();
    let input_count = spec.row_counts[0];
    let mut reachable = vec![false; total];
    let mut queue = VecDeque::new();
    for n in 0..input_count {
        reachable[n] = true;
        queue.push_back(n);
    }
    while let Some(n) = queue.pop_front() {
        for &(src, dst) in edges {
            if src == n && !reachable[dst] {
                reachable[dst] = true;
                queue.push_back(dst);
            }
        }
    }
    reachable
}

/// Backward reachability from the output row: nodes that can reach some
/// output node by following edges forward.
fn backward_reachable(spec: &SpeciesSpec, edges: &[(usize, usize)]) -> Vec<bool> {
    let total = spec.total_nodes();
    let last_row = spec.row_counts.len() - 1;
    let output_start = spec.row_start(last_row);
    let mut reachable = vec![false; total];
    let mut queue = VecDeque::new();
    for n in output_start..total {
        reachable[n] = true;
        queue.push_back(n);
    }
    while let Some(n) = queue.pop_front() {
        for &(src, dst) in edges {
            if dst == n && !reachable[src] {
                reachable[src] = true;
                queue.push_back(src);
            }
        }
    }
    reachable
}

/// A node is active iff it is reachable both forward from an input and
/// backward from an output.
pub fn active_nodes(spec: &SpeciesSpec) -> Vec<bool> {
    active_nodes_with_edges(spec, &spec.edges)
}

/// Same as [`active_nodes`] but evaluated against a candidate edge list
/// rather than `spec.edges`, so callers can probe "what if edge `e` were
/// removed" without mutating the spec.
pub fn active_nodes_with_edges(spec: &SpeciesSpec, edges: &[(usize, usize)]) -> Vec<bool> {
    let fwd = forward_reachable(spec, edges);
    let bwd = backward_reachable(spec, edges);
    fwd.iter().zip(bwd.iter()).map(|(&f, &b)| f && b).collect()
}

/// Succeeds iff every output node is reachable from some input under
/// `edges` (i.e. has at least one active input-to-output path).
pub fn validate_connectivity_with_edges(spec: &SpeciesSpec, edges: &[(usize, usize)]) -> bool {
    let fwd = forward_reachable(spec, edges);
    let last_row = spec.row_counts.len() - 1;
    let output_start = spec.row_start(last_row);
    let total = spec.total_nodes();
    (output_start..total).all(|n| fwd[n])
}

pub fn validate_connectivity(spec: &SpeciesSpec) -> bool {
    validate_connectivity_with_edges(spec, &spec.edges)
}

/// Whether deleting edge at `edge_index` (in `spec.edges`) still leaves
/// every output reachable from some input.
pub fn can_delete_edge(spec: &SpeciesSpec, edge_index: usize) -> bool {
    let mut candidate = spec.edges.clone();
    candidate.remove(edge_index);
    validate_connectivity_with_edges(spec, &candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::builder::SpeciesBuilder;

    fn linear_spec() -> SpeciesSpec {
        SpeciesBuilder::new()
            .add_input_row(2)
            .add_hidden_row(2, [crate::activation::ActivationType::ReLU])
            .add_output_row(1, [crate::activation::ActivationType::Linear])
            .with_max_in_degree(4)
            .fully_connect(0, 1)
            .fully_connect(1, 2)
            .build()
            .unwrap()
    }

    #[test]
    fn fully_connected_spec_is_connected() {
        let spec = linear_spec();
        assert!(validate_connectivity(&spec));
        assert!(active_nodes(&spec).iter().all(|&a| a));
    }

    #[test]
    fn can_delete_redundant_edge_but_not_last_one() {
        let mut spec = linear_spec();
        spec.build_row_plans();
        // hidden->output has 2 edges (fully connected 2 hidden to 1 output).
        let hidden_to_out: Vec<usize> = spec
            .edges
            .iter()
            .enumerate()
            .filter(|(_, &(s, _))| s >= 2 && s < 4)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hidden_to_out.len(), 2);
        assert!(can_delete_edge(&spec, hidden_to_out[0]));
    }

    #[test]
    fn deleting_only_path_disconnects_output() {
        let spec = SpeciesBuilder::new()
            .add_input_row(1)
            .add_output_row(1, [crate::activation::ActivationType::Linear])
            .with_max_in_degree(1)
            .add_edge(0, 1)
            .build()
            .unwrap();
        assert!(!can_delete_edge(&spec, 0));
    }
}
