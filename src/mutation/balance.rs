//! Complexity-based rate balancing and weak-edge pruning (spec.md §4.3,
//! optional knobs).

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::individual::Individual;
use crate::topology::connectivity;
use crate::topology::SpeciesSpec;

use super::structural::{apply_edit, remove_edge_at, EdgeSlot};

/// Targets used to compute the complexity score `s` that scales
/// `edge_add`/`edge_delete_random` rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityTargets {
    pub target_hidden: usize,
    pub target_edges: usize,
    pub min_active_edges: usize,
}

/// Number of active (input-to-output-connected) hidden nodes and active
/// edges under `spec`.
pub fn active_complexity(spec: &SpeciesSpec) -> (usize, usize) {
    let active = connectivity::active_nodes(spec);
    let hidden_start = spec.row_counts[0];
    let hidden_end = spec.total_nodes() - *spec.row_counts.last().unwrap();
    let active_hidden = active[hidden_start..hidden_end].iter().filter(|&&a| a).count();
    let active_edges = spec
        .edges
        .iter()
        .filter(|&&(s, d)| active[s] && active[d])
        .count();
    (active_hidden, active_edges)
}

/// `s = 1/2 * active_hidden/target_hidden + 1/2 * active_edges/target_edges`.
pub fn complexity_score(spec: &SpeciesSpec, targets: &ComplexityTargets) -> f32 {
    let (active_hidden, active_edges) = active_complexity(spec);
    let hidden_term = active_hidden as f32 / targets.target_hidden.max(1) as f32;
    let edge_term = active_edges as f32 / targets.target_edges.max(1) as f32;
    0.5 * hidden_term + 0.5 * edge_term
}

/// Scales the base `edge_add`/`edge_delete_random` rates by the complexity
/// score: below `target_edges` additions are favored, above it deletions
/// are; below `min_active_edges` deletion is forced to 0 and addition is
/// boosted.
pub fn balanced_edge_rates(
    spec: &SpeciesSpec,
    targets: &ComplexityTargets,
    base_add: f32,
    base_delete: f32,
) -> (f32, f32) {
    let (_, active_edges) = active_complexity(spec);
    if active_edges < targets.min_active_edges {
        return (base_add * 2.0, 0.0);
    }
    let s = complexity_score(spec, targets);
    // s < 1: below target, favor growth. s > 1: above target, favor pruning.
    let add_rate = (base_add * (2.0 - s).max(0.0)).clamp(0.0, 1.0);
    let delete_rate = (base_delete * s).clamp(0.0, 1.0);
    (add_rate, delete_rate)
}

/// Weak-edge pruning configuration (spec.md §6
/// `weak_edge_pruning { enabled, threshold, base_prune_rate }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakEdgePruning {
    pub enabled: bool,
    pub threshold: f32,
    pub base_prune_rate: f32,
    /// Pruning is skipped entirely below this edge count.
    pub min_edge_count: usize,
}

impl Default for WeakEdgePruning {
    fn default() -> Self {
        WeakEdgePruning {
            enabled: false,
            threshold: 0.05,
            base_prune_rate: 0.1,
            min_edge_count: 8,
        }
    }
}

/// Mean absolute weight of each edge across `individuals`, indexed by
/// canonical edge index.
fn mean_abs_weights(individuals: &[Individual], edge_count: usize) -> Vec<f32> {
    let mut sums = vec![0.0f32; edge_count];
    for ind in individuals {
        for (i, &w) in ind.weights.iter().enumerate() {
            sums[i] += w.abs();
        }
    }
    let n = individuals.len().max(1) as f32;
    sums.into_iter().map(|s| s / n).collect()
}

/// Deletes a `base_prune_rate` fraction of candidate weak edges (mean
/// absolute weight below `threshold`) while preserving connectivity,
/// applying the resulting remap to every individual in the species.
///
/// Returns the number of edges actually deleted.
pub fn prune_weak_edges(
    spec: &mut SpeciesSpec,
    individuals: &mut [Individual],
    config: &WeakEdgePruning,
    rng: &mut impl Rng,
) -> usize {
    if !config.enabled || spec.edges.len() < config.min_edge_count {
        return 0;
    }
    let means = mean_abs_weights(individuals, spec.edges.len());
    let mut candidates: Vec<usize> = (0..spec.edges.len())
        .filter(|&i| means[i] < config.threshold)
        .collect();
    if candidates.is_empty() {
        return 0;
    }
    candidates.shuffle(rng);
    let target_count = ((candidates.len() as f32) * config.base_prune_rate).round() as usize;
    let target_count = target_count.max(1).min(candidates.len());

    let mut deleted = 0;
    for _ in 0..target_count {
        // Re-evaluate connectivity against the live spec each iteration
        // since earlier deletions change which edges are prunable.
        let Some(&idx) = candidates
            .iter()
            .find(|&&i| i < spec.edges.len() && connectivity::can_delete_edge(spec, i))
        else {
            break;
        };
        let edit = remove_edge_at(spec, idx);
        for ind in individuals.iter_mut() {
            apply_edit(ind, &edit, |_| 0.0);
        }
        deleted += 1;
        // Reindex the remaining candidates through the remap; the deleted
        // edge's old index simply drops out.
        candidates = candidates
            .iter()
            .filter(|&&i| i != idx)
            .filter_map(|&old_i| match edit.remap.get(old_i) {
                Some(EdgeSlot::Kept(new_i)) => Some(*new_i),
                _ => None,
            })
            .collect();
    }
    deleted
}
