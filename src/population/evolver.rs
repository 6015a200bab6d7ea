//! Evolver and per-generation reproduction (spec.md §4.5, §6 `Evolver`,
//! `EvolutionConfig`).

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::individual::Individual;
use crate::mutation::balance::{self, ComplexityTargets, WeakEdgePruning};
use crate::mutation::structural::{self, apply_edit, glorot_init, stabilization_init};
use crate::mutation::{self, MutationConfig};
use crate::rng::sub_rng;
use crate::topology::SpeciesSpec;

use super::culling::{self, CullingConfig};
use super::{Population, Species, SpeciesStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSizing {
    pub species_count: usize,
    pub individuals_per_species: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub elites: usize,
    pub tournament_size: usize,
    /// Top fraction of a species (by fitness) tournaments draw from.
    pub parent_pool_percentage: f32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            elites: 2,
            tournament_size: 3,
            parent_pool_percentage: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeMutationConfig {
    pub edge_add: f32,
    pub edge_delete_random: f32,
    pub edge_split: f32,
    pub edge_redirect: f32,
    pub edge_duplicate: f32,
    pub edge_swap: f32,
    pub weak_edge_pruning: WeakEdgePruning,
    pub complexity_targets: Option<ComplexityTargets>,
}

impl Default for EdgeMutationConfig {
    fn default() -> Self {
        EdgeMutationConfig {
            edge_add: 0.03,
            edge_delete_random: 0.03,
            edge_split: 0.03,
            edge_redirect: 0.03,
            edge_duplicate: 0.03,
            edge_swap: 0.03,
            weak_edge_pruning: WeakEdgePruning::default(),
            complexity_targets: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    pub population: PopulationSizing,
    pub selection: SelectionConfig,
    pub culling: CullingConfig,
    pub weight_mutation: MutationConfig,
    pub edge_mutation: EdgeMutationConfig,
    /// (Q4) Per-generation structural mutation is an explicit, disable-able
    /// opt-in distinct from species-birth diversification, which always
    /// applies structural repair regardless of this flag.
    pub structural_mutation_at_generation: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            population: PopulationSizing {
                species_count: 8,
                individuals_per_species: 30,
            },
            selection: SelectionConfig::default(),
            culling: CullingConfig::default(),
            weight_mutation: MutationConfig::default(),
            edge_mutation: EdgeMutationConfig::default(),
            structural_mutation_at_generation: false,
        }
    }
}

/// Seedable driver of the evolutionary loop. A single seed at construction
/// determines every downstream random choice: species topologies, weight
/// initializations, tournament draws, and mutations (spec.md §4.5
/// "Determinism").
pub struct Evolver {
    seed: u64,
}

impl Evolver {
    pub fn new(seed: u64) -> Self {
        Evolver { seed }
    }

    /// Founds `config.population.species_count` species, each an
    /// independent deep copy of `topology` with `individuals_per_species`
    /// freshly initialized individuals. Per Q3, `total_species_created`
    /// counts these founding species too.
    pub fn initialize_population(&self, config: &EvolutionConfig, topology: &SpeciesSpec) -> Population {
        let species_count = config.population.species_count;
        let mut all_species = Vec::with_capacity(species_count);
        for species_index in 0..species_count {
            let mut spec = topology.clone();
            spec.build_row_plans();
            let individuals = (0..config.population.individuals_per_species)
                .map(|individual_index| {
                    let mut ind_rng = sub_rng(self.seed, 0, species_index as u64, individual_index as u64);
                    Individual::random_for_spec(&spec, &mut ind_rng)
                })
                .collect();
            all_species.push(Species {
                topology: spec,
                individuals,
                age: 0,
                stats: SpeciesStats::default(),
            });
        }
        Population {
            all_species,
            generation: 0,
            total_species_created: species_count as u64,
        }
    }

    /// Runs one generation (spec.md §4.5 steps 2–5). Assumes the caller has
    /// already written fitness into every individual (step 1, the external
    /// `FitnessEvaluator`).
    #[tracing::instrument(level = "info", skip(self, population, config), fields(generation = population.generation, species = population.all_species.len()))]
    pub fn step_generation(&self, population: &mut Population, config: &EvolutionConfig) {
        for species in population.all_species.iter_mut() {
            let individuals = species.individuals.clone();
            species.stats.update(&individuals);
        }

        let culled_indices = culling::select_for_culling(&population.all_species, &config.culling);
        let culled_set: std::collections::HashSet<usize> = culled_indices.iter().copied().collect();

        if !culled_indices.is_empty() {
            let survivors: Vec<&Species> = population
                .all_species
                .iter()
                .enumerate()
                .filter(|(i, _)| !culled_set.contains(i))
                .map(|(_, s)| s)
                .collect();

            let mut replacements = Vec::with_capacity(culled_indices.len());
            for (k, _) in culled_indices.iter().enumerate() {
                let mut rng = sub_rng(self.seed, population.generation, 1_000_000 + k as u64, 0);
                let born = culling::diversify_new_species(
                    &survivors,
                    config.population.individuals_per_species,
                    &config.culling,
                    &config.weight_mutation,
                    &mut rng,
                );
                replacements.push(born);
            }
            for (&idx, replacement) in culled_indices.iter().zip(replacements.into_iter()) {
                population.all_species[idx] = replacement;
            }
            population.total_species_created += culled_indices.len() as u64;
        }

        for (species_index, species) in population.all_species.iter_mut().enumerate() {
            build_next_generation(species, species_index as u64, population.generation, self.seed, config);
            species.age += 1;
        }

        population.generation += 1;
    }
}

/// Replaces `species.individuals` with the next generation: top `elites`
/// copied verbatim, the rest filled by tournament selection + mutation
/// from the top `parent_pool_percentage` fraction (spec.md §4.5 step 4).
fn build_next_generation(
    species: &mut Species,
    species_index: u64,
    generation: u64,
    root_seed: u64,
    config: &EvolutionConfig,
) {
    let target_size = config.population.individuals_per_species;
    let mut ranked = species.individuals.clone();
    ranked.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).expect("fitness is never NaN"));

    let elite_count = config.selection.elites.min(ranked.len());
    let mut next_generation: Vec<Individual> = ranked[..elite_count].to_vec();

    let pool_size = ((ranked.len() as f32) * config.selection.parent_pool_percentage)
        .ceil()
        .max(1.0) as usize;
    let pool = &ranked[..pool_size.min(ranked.len())];

    while next_generation.len() < target_size {
        let individual_index = next_generation.len() as u64;
        let mut rng = sub_rng(root_seed, generation, species_index, individual_index);
        let parent = tournament_select(pool, config.selection.tournament_size, &mut rng);
        let mut child = parent.clone();
        child.fitness = f32::MIN;
        child.age = 0;

        mutation::mutate_individual(&mut child, &species.topology, &config.weight_mutation, &mut rng);

        next_generation.push(child);
    }

    // Structural mutation is species-scoped (spec.md §4.3 surface B): it
    // changes the shared topology, so it is attempted at most once per
    // generation against the whole next generation in one shot, never
    // against a single child mid-assembly — two edits against the same
    // topology in one call would desync `next_generation`'s still-old-sized
    // weight arrays from the already-grown `species.topology`.
    if config.structural_mutation_at_generation {
        let mut rng = sub_rng(root_seed, generation, species_index, u64::MAX - 1);
        apply_structural_mutation(species, &mut next_generation, &config.edge_mutation, &mut rng);
    }

    species.individuals = next_generation;

    if config.edge_mutation.weak_edge_pruning.enabled {
        let mut rng = sub_rng(root_seed, generation, species_index, u64::MAX);
        balance::prune_weak_edges(
            &mut species.topology,
            &mut species.individuals,
            &config.edge_mutation.weak_edge_pruning,
            &mut rng,
        );
    }
}

/// Draws `tournament_size` individuals uniformly with replacement from
/// `pool` and returns the fittest.
fn tournament_select<'a>(pool: &'a [Individual], tournament_size: usize, rng: &mut impl Rng) -> &'a Individual {
    let mut best = &pool[rng.gen_range(0..pool.len())];
    for _ in 1..tournament_size {
        let candidate = &pool[rng.gen_range(0..pool.len())];
        if candidate.fitness > best.fitness {
            best = candidate;
        }
    }
    best
}

/// Applies at most one structural operator to `species.topology`, drawn
/// from the edge-mutation rates, and reindexes every individual in
/// `next_generation` when it succeeds — a structural edit changes the
/// shared topology, so every individual destined for it must stay aligned.
/// Operates on the freshly assembled next generation rather than the
/// (stale, pre-edit-sized) `species.individuals`, and applies at most one
/// edit per call so the reindex pass below never has to chase a second
/// permutation against an already-reindexed population.
fn apply_structural_mutation(
    species: &mut Species,
    next_generation: &mut [Individual],
    config: &EdgeMutationConfig,
    rng: &mut impl Rng,
) {
    let (add_rate, delete_rate) = match &config.complexity_targets {
        Some(targets) => balance::balanced_edge_rates(&species.topology, targets, config.edge_add, config.edge_delete_random),
        None => (config.edge_add, config.edge_delete_random),
    };

    let roll: f32 = rng.gen_range(0.0..1.0);
    let mut cumulative = 0.0;
    let ops: [(f32, StructuralOp); 6] = [
        (add_rate, StructuralOp::Add),
        (delete_rate, StructuralOp::Delete),
        (config.edge_split, StructuralOp::Split),
        (config.edge_redirect, StructuralOp::Redirect),
        (config.edge_duplicate, StructuralOp::Duplicate),
        (config.edge_swap, StructuralOp::Swap),
    ];

    let mut chosen = None;
    for &(rate, op) in &ops {
        cumulative += rate;
        if roll < cumulative {
            chosen = Some(op);
            break;
        }
    }
    let Some(op) = chosen else { return };

    let edit = match op {
        StructuralOp::Add => structural::try_edge_add(&mut species.topology, rng),
        StructuralOp::Delete => structural::try_edge_delete_random(&mut species.topology, rng),
        StructuralOp::Split => structural::try_edge_split(&mut species.topology, rng),
        StructuralOp::Redirect => structural::try_edge_redirect(&mut species.topology, rng),
        StructuralOp::Duplicate => structural::try_edge_duplicate(&mut species.topology, rng),
        StructuralOp::Swap => structural::try_edge_swap(&mut species.topology, rng),
    };

    let Some(edit) = edit else { return };

    let topology = &species.topology;
    for individual in next_generation.iter_mut() {
        let mut local_rng = StdRng::seed_from_u64(rng.gen());
        apply_edit(individual, &edit, |new_idx| {
            let &(src, dst) = topology
                .edges
                .get(new_idx)
                .expect("new edge index is within the rebuilt edge list");
            if op == StructuralOp::Split {
                stabilization_init(0.3, &mut local_rng)
            } else {
                glorot_init(topology, (src, dst), &mut local_rng)
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructuralOp {
    Add,
    Delete,
    Split,
    Redirect,
    Duplicate,
    Swap,
}
