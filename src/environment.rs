//! Environment contract & fitness glue (spec.md §4.7, §6, §2g/h).
//!
//! `Environment` is the external collaborator's contract: concrete
//! benchmarks (XOR, spiral, cartpole, ...) are out of scope for this crate
//! and implement this trait elsewhere. [`FitnessEvaluator`] visits every
//! individual in every species, runs it against the environment, and
//! writes the returned scalar into `Individual::fitness`.

use crate::evaluator::{self, Evaluator, RowPlanEvaluator};
use crate::individual::Individual;
use crate::population::Population;
use crate::rng::sub_rng_episode;
use crate::topology::SpeciesSpec;

/// A pure function from a species' inputs to its outputs, closed over one
/// individual's weights/biases/activations on a fixed topology.
pub trait Policy {
    fn act(&self, inputs: &[f32]) -> Vec<f32>;
}

/// The evaluator-backed policy every `Individual` realizes on its species'
/// topology.
pub struct EvaluatedPolicy<'a> {
    pub spec: &'a SpeciesSpec,
    pub individual: &'a Individual,
}

impl<'a> Policy for EvaluatedPolicy<'a> {
    fn act(&self, inputs: &[f32]) -> Vec<f32> {
        match evaluator::evaluate(self.spec, self.individual, inputs) {
            Ok(outputs) => outputs,
            // spec.md §7: a non-finite activation discards the individual
            // for this episode rather than propagating.
            Err(_) => vec![f32::MIN; self.spec.row_plans.last().map_or(0, |p| p.node_count)],
        }
    }
}

/// External collaborator contract: an environment exposes its input/output
/// dimensions and a `run` that scores one policy.
pub trait Environment: Sync {
    fn input_size(&self) -> usize;
    fn output_size(&self) -> usize;

    /// Runs one episode of `policy` with the given seed and returns its
    /// fitness. Higher is better; negative values are allowed (e.g. MSE
    /// encoded as its negation).
    fn run(&self, policy: &dyn Policy, seed: u64) -> f32;
}

/// Runs one or more episodes per individual and writes the mean into
/// `Individual::fitness`.
pub struct FitnessEvaluator {
    pub episodes: usize,
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        FitnessEvaluator { episodes: 1 }
    }
}

impl FitnessEvaluator {
    /// Evaluates every individual in every species of `population` against
    /// `environment`, deriving each individual's (and each episode's)
    /// random stream from `(generation, species_index, individual_index[,
    /// episode_index])` so sequential and `rayon`-parallel evaluation
    /// produce identical fitness vectors (spec.md §5, P10).
    pub fn evaluate_population(&self, population: &mut Population, environment: &dyn Environment, seed: u64) {
        let generation = population.generation;
        let episodes = self.episodes.max(1);

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            population
                .all_species
                .par_iter_mut()
                .enumerate()
                .for_each(|(species_index, species)| {
                    let spec = species.topology.clone();
                    species.individuals.par_iter_mut().enumerate().for_each(|(individual_index, individual)| {
                        individual.fitness = run_episodes(
                            environment,
                            &spec,
                            individual,
                            seed,
                            generation,
                            species_index as u64,
                            individual_index as u64,
                            episodes,
                        );
                    });
                });
        }

        #[cfg(not(feature = "rayon"))]
        {
            for (species_index, species) in population.all_species.iter_mut().enumerate() {
                let spec = species.topology.clone();
                for (individual_index, individual) in species.individuals.iter_mut().enumerate() {
                    individual.fitness = run_episodes(
                        environment,
                        &spec,
                        individual,
                        seed,
                        generation,
                        species_index as u64,
                        individual_index as u64,
                        episodes,
                    );
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_episodes(
    environment: &dyn Environment,
    spec: &SpeciesSpec,
    individual: &Individual,
    root_seed: u64,
    generation: u64,
    species_index: u64,
    individual_index: u64,
    episodes: usize,
) -> f32 {
    let policy = EvaluatedPolicy { spec, individual };
    let mut total = 0.0f32;
    for episode_index in 0..episodes {
        let mut episode_rng = sub_rng_episode(
            root_seed,
            generation,
            species_index,
            individual_index,
            episode_index as u64,
        );
        let episode_seed: u64 = rand::Rng::gen(&mut episode_rng);
        total += environment.run(&policy, episode_seed);
    }
    total / episodes as f32
}

/// Convenience wrapper over the default [`RowPlanEvaluator`], exposed for
/// callers constructing a [`Policy`] directly without going through
/// [`FitnessEvaluator`].
pub fn policy_for<'a>(spec: &'a SpeciesSpec, individual: &'a Individual) -> EvaluatedPolicy<'a> {
    let _ = RowPlanEvaluator;
    EvaluatedPolicy { spec, individual }
}
