//! Species culling & diversification (spec.md §4.6).
//!
//! (Q1) The primary source's culling predicate ANDs four conditions; a
//! diagnostic and test in the source hint an OR-based predicate suits
//! NEAT-like dynamics better. [`CullingMode`] makes the choice explicit and
//! configurable rather than guessing one.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::individual::{glorot_weight, Individual};
use crate::mutation::{self, MutationConfig};
use crate::topology::SpeciesSpec;

use super::{Species, SpeciesStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CullingMode {
    /// All four conditions must hold (the primary source's behavior).
    AllOf,
    /// Any one condition is enough (the NEAT-like alternative hinted at by
    /// the source's diagnostics).
    AnyOf,
}

impl Default for CullingMode {
    fn default() -> Self {
        CullingMode::AllOf
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CullingConfig {
    pub mode: CullingMode,
    pub grace_generations: u32,
    pub stagnation_threshold: u32,
    pub species_diversity_threshold: f32,
    pub relative_performance_threshold: f32,
    pub min_species_count: usize,
    /// Bounds on a hidden row's node count during diversification's
    /// row-size perturbation.
    pub min_hidden_row_size: usize,
    pub max_hidden_row_size: usize,
}

impl Default for CullingConfig {
    fn default() -> Self {
        CullingConfig {
            mode: CullingMode::AllOf,
            grace_generations: 5,
            stagnation_threshold: 15,
            species_diversity_threshold: 1e-4,
            relative_performance_threshold: 0.5,
            min_species_count: 2,
            min_hidden_row_size: 1,
            max_hidden_row_size: 64,
        }
    }
}

/// Tests the culling predicate for one species against the population-wide
/// best median fitness.
pub fn should_cull(species: &Species, global_best_median: f32, config: &CullingConfig) -> bool {
    let past_grace = species.age > config.grace_generations;
    let stagnant = species.stats.generations_since_improvement >= config.stagnation_threshold;
    let underperforming = species.stats.best_fitness_ever
        < config.relative_performance_threshold * global_best_median;
    let low_diversity = species.stats.fitness_variance < config.species_diversity_threshold;

    match config.mode {
        CullingMode::AllOf => past_grace && stagnant && underperforming && low_diversity,
        CullingMode::AnyOf => past_grace && (stagnant || underperforming || low_diversity),
    }
}

/// Selects indices of species to cull this generation, never dropping the
/// population below `min_species_count` (P9).
pub fn select_for_culling(all_species: &[Species], config: &CullingConfig) -> Vec<usize> {
    let global_best_median = all_species
        .iter()
        .map(|s| s.stats.median_fitness)
        .fold(f32::MIN, f32::max);

    let mut candidates: Vec<usize> = all_species
        .iter()
        .enumerate()
        .filter(|(_, s)| should_cull(s, global_best_median, config))
        .map(|(i, _)| i)
        .collect();

    let max_cullable = all_species.len().saturating_sub(config.min_species_count);
    candidates.truncate(max_cullable);
    candidates
}

/// Picks a founding species index, weighted by median fitness (fitnesses
/// are shifted so every species has non-negative weight even when negative
/// fitness values are in play, per spec.md §4.7).
fn pick_founder_index(candidates: &[&Species], rng: &mut impl Rng) -> usize {
    let min_median = candidates
        .iter()
        .map(|s| s.stats.median_fitness)
        .fold(f32::MAX, f32::min);
    let weights: Vec<f32> = candidates
        .iter()
        .map(|s| (s.stats.median_fitness - min_median) + 1e-6)
        .collect();
    let total: f32 = weights.iter().sum();
    let mut draw = rng.gen_range(0.0..total);
    for (i, &w) in weights.iter().enumerate() {
        if draw < w {
            return i;
        }
        draw -= w;
    }
    weights.len() - 1
}

/// Perturbs each hidden row's node count by -1/0/+1 within
/// `[min_hidden_row_size, max_hidden_row_size]`, drops edges referencing
/// removed nodes, shifts surviving edges' indices to match the new row
/// layout, and re-validates.
fn perturb_topology(spec: &SpeciesSpec, config: &CullingConfig, rng: &mut impl Rng) -> SpeciesSpec {
    let mut new_row_counts = spec.row_counts.clone();
    for row in 1..new_row_counts.len() - 1 {
        let delta: i32 = rng.gen_range(-1..=1);
        let next = (new_row_counts[row] as i32 + delta)
            .max(config.min_hidden_row_size as i32)
            .min(config.max_hidden_row_size as i32);
        new_row_counts[row] = next as usize;
    }

    // Map old node index -> new node index (or None if the node's row
    // shrank past it), by renumbering within each row independently.
    let mut old_to_new = vec![None; spec.total_nodes()];
    let mut old_start = 0;
    let mut new_start = 0;
    for (old_count, &new_count) in spec.row_counts.iter().copied().zip(new_row_counts.iter()) {
        for offset in 0..old_count {
            if offset < new_count {
                old_to_new[old_start + offset] = Some(new_start + offset);
            }
        }
        old_start += old_count;
        new_start += new_count;
    }

    let new_edges: Vec<(usize, usize)> = spec
        .edges
        .iter()
        .filter_map(|&(s, d)| match (old_to_new[s], old_to_new[d]) {
            (Some(ns), Some(nd)) => Some((ns, nd)),
            _ => None,
        })
        .collect();

    let mut new_spec = SpeciesSpec {
        row_counts: new_row_counts,
        allowed_activations_per_row: spec.allowed_activations_per_row.clone(),
        edges: new_edges,
        max_in_degree: spec.max_in_degree,
        row_plans: Vec::new(),
    };
    new_spec.build_row_plans();
    new_spec
}

/// Adapts `founder` to `new_spec`: edges whose `(src, dst)` tuple still
/// exists keep the founder's weight (matched by tuple, not index); the rest
/// are fresh-initialized with Glorot. Node-level arrays are resized to
/// match, defaulting new nodes to their row's first allowed activation.
fn adapt_individual(founder: &Individual, old_spec: &SpeciesSpec, new_spec: &SpeciesSpec, rng: &mut impl Rng) -> Individual {
    let mut old_weight_by_edge = std::collections::HashMap::new();
    for (i, &edge) in old_spec.edges.iter().enumerate() {
        old_weight_by_edge.entry(edge).or_insert(founder.weights[i]);
    }

    let weights = new_spec
        .edges
        .iter()
        .map(|edge| {
            old_weight_by_edge
                .get(edge)
                .copied()
                .unwrap_or_else(|| glorot_weight(new_spec, edge.0, edge.1, rng))
        })
        .collect();

    let total_nodes = new_spec.total_nodes();
    let mut activations = Vec::with_capacity(total_nodes);
    let mut node_params = Vec::with_capacity(total_nodes);
    let mut biases = Vec::with_capacity(total_nodes);
    for node in 0..total_nodes {
        if node < founder.activations.len() && node < old_spec.total_nodes() {
            activations.push(founder.activations[node]);
            node_params.push(founder.node_params[node]);
            biases.push(founder.biases[node]);
        } else {
            let row = new_spec.row_of(node).expect("node within bounds");
            let act = crate::activation::mask_members(new_spec.allowed_activations_per_row[row])
                .into_iter()
                .next()
                .unwrap_or(crate::activation::ActivationType::Linear);
            activations.push(act);
            node_params.push(act.default_parameters());
            biases.push(0.0);
        }
    }

    Individual {
        weights,
        biases,
        node_params,
        activations,
        fitness: f32::MIN,
        age: 0,
    }
}

/// Produces one newborn species by diversifying a weighted-random founding
/// survivor: perturbed topology, founder individual adapted to it, and
/// `individuals_per_species` children spawned from the adapted founder via
/// per-individual mutation.
pub fn diversify_new_species(
    survivors: &[&Species],
    individuals_per_species: usize,
    culling_config: &CullingConfig,
    mutation_config: &MutationConfig,
    rng: &mut impl Rng,
) -> Species {
    let founder_idx = pick_founder_index(survivors, rng);
    let founder_species = survivors[founder_idx];
    let new_topology = perturb_topology(&founder_species.topology, culling_config, rng);

    let founder_individual = founder_species
        .best_individual()
        .expect("species has at least one individual");
    let adapted = adapt_individual(founder_individual, &founder_species.topology, &new_topology, rng);

    let mut individuals = Vec::with_capacity(individuals_per_species);
    for _ in 0..individuals_per_species {
        let mut child = adapted.clone();
        mutation::mutate_individual(&mut child, &new_topology, mutation_config, rng);
        individuals.push(child);
    }

    Species {
        topology: new_topology,
        individuals,
        age: 0,
        stats: SpeciesStats::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::topology::builder::SpeciesBuilder;
    use rand::SeedableRng;

    fn base_species(fitness: f32) -> Species {
        let spec = SpeciesBuilder::new()
            .add_input_row(2)
            .add_hidden_row(3, [ActivationType::ReLU])
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(8)
            .fully_connect(0, 1)
            .fully_connect(1, 2)
            .build()
            .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let individual = Individual::random_for_spec(&spec, &mut rng);
        let mut individual = individual;
        individual.fitness = fitness;
        Species {
            topology: spec,
            individuals: vec![individual],
            age: 10,
            stats: SpeciesStats {
                best_fitness_ever: fitness,
                median_fitness: fitness,
                fitness_variance: 0.0,
                generations_since_improvement: 100,
            },
        }
    }

    #[test]
    fn allof_requires_every_condition() {
        let config = CullingConfig::default();
        let species = base_species(10.0);
        // best_fitness_ever (10.0) is not below 0.5 * global_best_median
        // (10.0), so AllOf should not cull.
        assert!(!should_cull(&species, 10.0, &config));
    }

    #[test]
    fn anyof_culls_on_stagnation_alone() {
        let config = CullingConfig {
            mode: CullingMode::AnyOf,
            ..Default::default()
        };
        let species = base_species(10.0);
        assert!(should_cull(&species, 10.0, &config));
    }

    #[test]
    fn never_culls_below_floor() {
        let config = CullingConfig {
            min_species_count: 2,
            ..Default::default()
        };
        let poor = base_species(0.0);
        let species = vec![poor.clone(), poor];
        let culled = select_for_culling(&species, &config);
        assert!(species.len() - culled.len() >= config.min_species_count);
    }

    #[test]
    fn diversified_species_is_valid() {
        let founder = base_species(5.0);
        let survivors = vec![&founder];
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let born = diversify_new_species(
            &survivors,
            4,
            &CullingConfig::default(),
            &MutationConfig::default(),
            &mut rng,
        );
        assert!(born.topology.validate().is_ok());
        assert_eq!(born.individuals.len(), 4);
        assert_eq!(born.age, 0);
        for ind in &born.individuals {
            assert_eq!(ind.weights.len(), born.topology.edges.len());
        }
    }
}
