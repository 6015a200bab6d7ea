//! Structural (topology) mutation operators (spec.md §4.3 surface B).
//!
//! Every operator here is a *try* operation (spec.md §7 `MutationInfeasible`):
//! it attempts a bounded number of candidate selections and, if none
//! satisfies the invariants, returns `None` without touching the spec. On
//! success it rebuilds row plans and returns an [`EdgeEditResult`] — an
//! explicit `old_index -> new_index` permutation (Design Notes:
//! "Cross-individual weight reindexing on spec mutation") — so the caller
//! can reindex every individual under the spec via [`apply_edit`] rather
//! than the operator reaching into individuals itself.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::individual::{glorot_weight, small_weight, Individual};
use crate::topology::connectivity;
use crate::topology::SpeciesSpec;

const DEFAULT_MAX_ATTEMPTS: usize = 50;

/// Fate of one pre-mutation edge index under an [`EdgeEditResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSlot {
    Kept(usize),
    Removed,
}

/// Result of a successful structural operator.
#[derive(Debug, Clone)]
pub struct EdgeEditResult {
    /// Indexed by pre-mutation edge index.
    pub remap: Vec<EdgeSlot>,
    /// Post-mutation indices of edges this operator introduced; callers
    /// initialize these with a fresh weight rather than carrying one over.
    pub new_edges: Vec<usize>,
    /// `(surviving_index, absorbed_index)` pairs from `EdgeMerge`: before
    /// applying `remap`, the caller must add `weights[absorbed_index]` into
    /// `weights[surviving_index]` (P8).
    pub merged_pairs: Vec<(usize, usize)>,
    /// New total edge count after this edit.
    pub new_edge_count: usize,
}

/// Applies `edit` to `individual.weights`, summing merged pairs first, then
/// remapping kept weights to their new slots, then initializing newly
/// introduced slots via `new_weight(new_index)`.
pub fn apply_edit(
    individual: &mut Individual,
    edit: &EdgeEditResult,
    mut new_weight: impl FnMut(usize) -> f32,
) {
    let mut working = individual.weights.clone();
    for &(keep, removed) in &edit.merged_pairs {
        working[keep] += working[removed];
    }
    let mut new_weights = vec![0.0f32; edit.new_edge_count];
    for (old_idx, slot) in edit.remap.iter().enumerate() {
        if let EdgeSlot::Kept(new_idx) = *slot {
            new_weights[new_idx] = working[old_idx];
        }
    }
    for &new_idx in &edit.new_edges {
        new_weights[new_idx] = new_weight(new_idx);
    }
    individual.weights = new_weights;
}

/// Accumulates a `(old_index_or_none, edge)` list starting from `spec`'s
/// current edges, then canonicalizes it into a fresh edge order and an
/// [`EdgeEditResult`], mutating `spec` in place.
struct EditBuilder {
    old_len: usize,
    entries: Vec<(Option<usize>, (usize, usize))>,
    merged_pairs: Vec<(usize, usize)>,
}

impl EditBuilder {
    fn from_spec(spec: &SpeciesSpec) -> Self {
        EditBuilder {
            old_len: spec.edges.len(),
            entries: spec.edges.iter().copied().enumerate().map(|(i, e)| (Some(i), e)).collect(),
            merged_pairs: Vec::new(),
        }
    }

    fn remove(&mut self, old_index: usize) {
        self.entries.retain(|&(idx, _)| idx != Some(old_index));
    }

    fn add_new(&mut self, edge: (usize, usize)) {
        self.entries.push((None, edge));
    }

    fn merge(&mut self, keep_old: usize, absorb_old: usize) {
        self.merged_pairs.push((keep_old, absorb_old));
        self.remove(absorb_old);
    }

    fn finish(mut self, spec: &mut SpeciesSpec) -> EdgeEditResult {
        self.entries.sort_by_key(|&(_, (src, dst))| (dst, src));
        let mut remap = vec![EdgeSlot::Removed; self.old_len];
        let mut new_edges = Vec::new();
        let mut edges = Vec::with_capacity(self.entries.len());
        for (new_idx, (old_idx, edge)) in self.entries.into_iter().enumerate() {
            match old_idx {
                Some(oi) => remap[oi] = EdgeSlot::Kept(new_idx),
                None => new_edges.push(new_idx),
            }
            edges.push(edge);
        }
        let new_edge_count = edges.len();
        spec.edges = edges;
        spec.build_row_plans();
        EdgeEditResult {
            remap,
            new_edges,
            merged_pairs: self.merged_pairs,
            new_edge_count,
        }
    }
}

fn parallel_count_excluding(spec: &SpeciesSpec, exclude: &[usize], src: usize, dst: usize) -> usize {
    spec.edges
        .iter()
        .enumerate()
        .filter(|&(i, &(s, d))| s == src && d == dst && !exclude.contains(&i))
        .count()
}

fn in_degree_excluding(spec: &SpeciesSpec, exclude: &[usize], node: usize) -> usize {
    spec.edges
        .iter()
        .enumerate()
        .filter(|&(i, &(_, d))| d == node && !exclude.contains(&i))
        .count()
}

/// Picks a random `(src, dst)` with `row(src) < row(dst)`, not already at
/// the 2-copy parallel-edge ceiling, with `dst`'s in-degree still below
/// `max_in_degree`. Inserts it and initializes the new weight with Glorot.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_add(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    let total = spec.total_nodes();
    let last_row = spec.row_counts.len() - 1;
    for _ in 0..DEFAULT_MAX_ATTEMPTS {
        let src_row = rng.gen_range(0..last_row);
        let dst_row = rng.gen_range(src_row + 1..=last_row);
        let src = spec.row_start(src_row) + rng.gen_range(0..spec.row_counts[src_row]);
        let dst = spec.row_start(dst_row) + rng.gen_range(0..spec.row_counts[dst_row]);
        if spec.parallel_count(src, dst) >= 2 {
            continue;
        }
        if spec.in_degree(dst) >= spec.max_in_degree {
            continue;
        }
        let _ = total;
        let mut builder = EditBuilder::from_spec(spec);
        builder.add_new((src, dst));
        let edit = builder.finish(spec);
        return Some(edit);
    }
    None
}

/// Deletes the edge at `index` unconditionally. Used by callers (weak-edge
/// pruning) that have already checked connectivity themselves.
pub fn remove_edge_at(spec: &mut SpeciesSpec, index: usize) -> EdgeEditResult {
    let mut builder = EditBuilder::from_spec(spec);
    builder.remove(index);
    builder.finish(spec)
}

/// Chooses an edge whose removal still leaves every output reachable from
/// an input (Connectivity Oracle), and deletes it.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_delete_random(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    if spec.edges.is_empty() {
        return None;
    }
    let mut candidates: Vec<usize> = (0..spec.edges.len()).collect();
    candidates.shuffle(rng);
    for idx in candidates.into_iter().take(DEFAULT_MAX_ATTEMPTS) {
        if connectivity::can_delete_edge(spec, idx) {
            let mut builder = EditBuilder::from_spec(spec);
            builder.remove(idx);
            return Some(builder.finish(spec));
        }
    }
    None
}

/// Node strictly between `row(a)` and `row(c)` that is currently inactive.
fn pick_inactive_intermediate(
    spec: &SpeciesSpec,
    row_a: usize,
    row_c: usize,
    rng: &mut impl Rng,
) -> Option<usize> {
    let active = connectivity::active_nodes(spec);
    let mut candidates: Vec<usize> = Vec::new();
    for row in row_a + 1..row_c {
        let start = spec.row_start(row);
        for n in start..start + spec.row_counts[row] {
            if !active[n] {
                candidates.push(n);
            }
        }
    }
    candidates.shuffle(rng);
    candidates.into_iter().next()
}

/// Chooses an edge `(a, c)` spanning at least two rows, replaces it with
/// `(a, b), (b, c)` for an inactive intermediate `b`. Net +1 edge.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_split(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    let mut candidates: Vec<usize> = (0..spec.edges.len()).collect();
    candidates.shuffle(rng);
    for idx in candidates.into_iter().take(DEFAULT_MAX_ATTEMPTS) {
        let (a, c) = spec.edges[idx];
        let row_a = spec.row_of(a).ok()?;
        let row_c = spec.row_of(c).ok()?;
        if row_c < row_a + 2 {
            continue;
        }
        let Some(b) = pick_inactive_intermediate(spec, row_a, row_c, rng) else {
            continue;
        };
        let mut builder = EditBuilder::from_spec(spec);
        builder.remove(idx);
        builder.add_new((a, b));
        builder.add_new((b, c));
        return Some(builder.finish(spec));
    }
    None
}

/// An active node in `row`, if any.
fn pick_active_in_row(spec: &SpeciesSpec, row: usize, active: &[bool], rng: &mut impl Rng) -> Option<usize> {
    let start = spec.row_start(row);
    let mut candidates: Vec<usize> = (start..start + spec.row_counts[row])
        .filter(|&n| active[n])
        .collect();
    candidates.shuffle(rng);
    candidates.into_iter().next()
}

/// Like [`try_edge_split`], but also bridges the newly activated
/// intermediate into the active graph with two low-weight stabilization
/// edges, minimizing the perturbation to the network's function (S8). Net:
/// remove 1 edge, add 4 edges.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_split_smart(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    let active = connectivity::active_nodes(spec);
    let mut candidates: Vec<usize> = (0..spec.edges.len()).collect();
    candidates.shuffle(rng);
    for idx in candidates.into_iter().take(DEFAULT_MAX_ATTEMPTS) {
        let (a, c) = spec.edges[idx];
        let row_a = spec.row_of(a).ok()?;
        let row_c = spec.row_of(c).ok()?;
        if row_c < row_a + 2 {
            continue;
        }
        let Some(b) = pick_inactive_intermediate(spec, row_a, row_c, rng) else {
            continue;
        };
        let row_b = spec.row_of(b).ok()?;
        let stabilize_in = if row_b > 0 {
            pick_active_in_row(spec, row_b - 1, &active, rng)
        } else {
            None
        };
        let stabilize_out = if row_b + 1 < spec.row_counts.len() {
            pick_active_in_row(spec, row_b + 1, &active, rng)
        } else {
            None
        };
        let (Some(stab_in), Some(stab_out)) = (stabilize_in, stabilize_out) else {
            continue;
        };
        let mut builder = EditBuilder::from_spec(spec);
        builder.remove(idx);
        builder.add_new((a, b));
        builder.add_new((b, c));
        builder.add_new((stab_in, b));
        builder.add_new((b, stab_out));
        return Some(builder.finish(spec));
    }
    None
}

/// Reassigns either the source or destination of a chosen edge to a
/// different node, preserving acyclicity, the parallel-edge ceiling, and
/// the in-degree bound.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_redirect(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    if spec.edges.is_empty() {
        return None;
    }
    let mut edge_order: Vec<usize> = (0..spec.edges.len()).collect();
    edge_order.shuffle(rng);
    for idx in edge_order.into_iter().take(DEFAULT_MAX_ATTEMPTS) {
        let (src, dst) = spec.edges[idx];
        let row_src = spec.row_of(src).ok()?;
        let row_dst = spec.row_of(dst).ok()?;
        let redirect_dst = rng.gen_bool(0.5);
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            let (new_src, new_dst) = if redirect_dst {
                let candidate_row = rng.gen_range(row_src + 1..spec.row_counts.len());
                let candidate = spec.row_start(candidate_row) + rng.gen_range(0..spec.row_counts[candidate_row]);
                (src, candidate)
            } else {
                let candidate_row = rng.gen_range(0..row_dst);
                let candidate = spec.row_start(candidate_row) + rng.gen_range(0..spec.row_counts[candidate_row]);
                (candidate, dst)
            };
            if new_src == src && new_dst == dst {
                continue;
            }
            if parallel_count_excluding(spec, &[idx], new_src, new_dst) >= 2 {
                continue;
            }
            if new_dst != dst && in_degree_excluding(spec, &[idx], new_dst) >= spec.max_in_degree {
                continue;
            }
            let mut builder = EditBuilder::from_spec(spec);
            builder.remove(idx);
            builder.add_new((new_src, new_dst));
            return Some(builder.finish(spec));
        }
    }
    None
}

/// Adds a second copy of an existing edge, up to the parallel-edge ceiling
/// of 2. The new slot is initialized independently (Glorot).
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_duplicate(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    if spec.edges.is_empty() {
        return None;
    }
    let mut candidates: Vec<usize> = (0..spec.edges.len())
        .filter(|&i| {
            let (s, d) = spec.edges[i];
            spec.parallel_count(s, d) < 2 && spec.in_degree(d) < spec.max_in_degree
        })
        .collect();
    candidates.shuffle(rng);
    let idx = candidates.into_iter().next()?;
    let edge = spec.edges[idx];
    let mut builder = EditBuilder::from_spec(spec);
    builder.add_new(edge);
    Some(builder.finish(spec))
}

/// Picks two edges and exchanges their destinations, preserving every
/// invariant.
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_swap(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    if spec.edges.len() < 2 {
        return None;
    }
    for _ in 0..DEFAULT_MAX_ATTEMPTS {
        let i = rng.gen_range(0..spec.edges.len());
        let j = rng.gen_range(0..spec.edges.len());
        if i == j {
            continue;
        }
        let (src_i, dst_i) = spec.edges[i];
        let (src_j, dst_j) = spec.edges[j];
        let row_src_i = spec.row_of(src_i).ok()?;
        let row_src_j = spec.row_of(src_j).ok()?;
        let row_dst_i = spec.row_of(dst_i).ok()?;
        let row_dst_j = spec.row_of(dst_j).ok()?;
        if row_src_i >= row_dst_j || row_src_j >= row_dst_i {
            continue;
        }
        let new_i = (src_i, dst_j);
        let new_j = (src_j, dst_i);
        if new_i == (src_i, dst_i) || new_j == (src_j, dst_j) {
            continue;
        }
        let exclude = [i, j];
        if parallel_count_excluding(spec, &exclude, new_i.0, new_i.1) >= 2 {
            continue;
        }
        if parallel_count_excluding(spec, &exclude, new_j.0, new_j.1) >= 2 {
            continue;
        }
        if in_degree_excluding(spec, &exclude, dst_j) + 1 > spec.max_in_degree {
            continue;
        }
        if in_degree_excluding(spec, &exclude, dst_i) + 1 > spec.max_in_degree {
            continue;
        }
        let _ = (row_dst_i, row_dst_j);
        let mut builder = EditBuilder::from_spec(spec);
        builder.remove(i);
        builder.remove(j);
        builder.add_new(new_i);
        builder.add_new(new_j);
        return Some(builder.finish(spec));
    }
    None
}

/// Collapses two parallel edges sharing `(src, dst)` into one; the
/// surviving weight slot is the sum of the two collapsed weights (P8).
#[tracing::instrument(level = "debug", skip(spec, rng))]
pub fn try_edge_merge(spec: &mut SpeciesSpec, rng: &mut impl Rng) -> Option<EdgeEditResult> {
    use std::collections::BTreeMap;
    // `BTreeMap` keeps groups in a fixed `(src, dst)` order regardless of
    // hasher/process state, so the same spec always yields the same
    // candidate list before `shuffle` draws from it (spec.md §4.5
    // "identical mutations across runs" determinism).
    let mut groups: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (i, &edge) in spec.edges.iter().enumerate() {
        groups.entry(edge).or_default().push(i);
    }
    let mut parallel_groups: Vec<Vec<usize>> = groups.into_values().filter(|g| g.len() >= 2).collect();
    parallel_groups.shuffle(rng);
    let group = parallel_groups.into_iter().next()?;
    let (keep, absorb) = (group[0], group[1]);
    let mut builder = EditBuilder::from_spec(spec);
    builder.merge(keep, absorb);
    Some(builder.finish(spec))
}

/// Initializes a newly introduced edge slot with Glorot scaling, given the
/// (already-mutated) spec and the new edge's endpoints.
pub fn glorot_init(spec: &SpeciesSpec, edge: (usize, usize), rng: &mut impl Rng) -> f32 {
    glorot_weight(spec, edge.0, edge.1, rng)
}

/// Initializes a newly introduced edge slot with the small amplitude used
/// for `EdgeSplitSmart`'s stabilization edges (S8: minimal disruption).
pub fn stabilization_init(amplitude: f32, rng: &mut impl Rng) -> f32 {
    small_weight(amplitude, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::topology::builder::SpeciesBuilder;
    use rand::SeedableRng;

    fn dense_spec() -> SpeciesSpec {
        SpeciesBuilder::new()
            .add_input_row(3)
            .add_hidden_row(4, [ActivationType::ReLU, ActivationType::Tanh])
            .add_hidden_row(4, [ActivationType::ReLU, ActivationType::Tanh])
            .add_output_row(2, [ActivationType::Linear])
            .with_max_in_degree(8)
            .fully_connect(0, 1)
            .fully_connect(1, 2)
            .fully_connect(2, 3)
            .build()
            .unwrap()
    }

    // P7: every structural operator either succeeds with a valid spec and
    // weights realigned, or fails leaving state unchanged.
    #[test]
    fn edge_add_then_spec_still_valid_and_weights_realign() {
        let mut spec = dense_spec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut ind = Individual::random_for_spec(&spec, &mut rng);
        let before_len = spec.edges.len();
        let edit = try_edge_add(&mut spec, &mut rng).expect("dense spec has room to add an edge");
        assert!(spec.validate().is_ok());
        assert_eq!(spec.edges.len(), before_len + 1);
        apply_edit(&mut ind, &edit, |_| glorot_init(&spec, (0, 0), &mut rng));
        assert_eq!(ind.weights.len(), spec.edges.len());
    }

    #[test]
    fn edge_delete_preserves_connectivity() {
        let mut spec = dense_spec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        if let Some(_edit) = try_edge_delete_random(&mut spec, &mut rng) {
            assert!(spec.validate().is_ok());
            assert!(connectivity::validate_connectivity(&spec));
        }
    }

    #[test]
    fn edge_split_smart_reports_four_new_edges() {
        let mut spec = SpeciesBuilder::new()
            .add_input_row(2)
            .add_hidden_row(3, [ActivationType::ReLU])
            .add_hidden_row(3, [ActivationType::ReLU])
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(8)
            .add_edge(0, 6)
            .add_edge(1, 6)
            .build()
            .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        if let Some(edit) = try_edge_split_smart(&mut spec, &mut rng) {
            assert_eq!(edit.new_edges.len(), 4);
            assert!(spec.validate().is_ok());
        }
    }

    #[test]
    fn edge_merge_sums_weights() {
        let mut spec = SpeciesBuilder::new()
            .add_input_row(1)
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(2)
            .add_edge(0, 1)
            .add_edge(0, 1)
            .build()
            .unwrap();
        let mut ind = Individual {
            weights: vec![0.3, 0.7],
            biases: vec![0.0, 0.0],
            node_params: vec![[0.0; 4]; 2],
            activations: vec![ActivationType::Linear, ActivationType::Linear],
            fitness: 0.0,
            age: 0,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let edit = try_edge_merge(&mut spec, &mut rng).expect("two parallel edges present");
        apply_edit(&mut ind, &edit, |_| 0.0);
        assert_eq!(spec.edges.len(), 1);
        assert!((ind.weights[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn structural_operators_never_exceed_parallel_ceiling() {
        let mut spec = dense_spec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let _ = try_edge_duplicate(&mut spec, &mut rng);
            use std::collections::HashMap;
            let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
            for &e in &spec.edges {
                *counts.entry(e).or_default() += 1;
            }
            assert!(counts.values().all(|&c| c <= 2));
        }
    }
}
