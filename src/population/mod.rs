//! Speciated population model (spec.md §3: `Population`, `Species`).

pub mod culling;
pub mod evolver;

use serde::{Deserialize, Serialize};

use crate::individual::Individual;
use crate::topology::SpeciesSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesStats {
    pub best_fitness_ever: f32,
    pub median_fitness: f32,
    pub fitness_variance: f32,
    pub generations_since_improvement: u32,
}

impl Default for SpeciesStats {
    /// `best_fitness_ever` starts at `f32::MIN`, not `0.0` — fitness is
    /// allowed to be negative (spec.md §4.7, e.g. MSE encoded as its
    /// negation), and a `0.0` floor would make an all-negative species
    /// never register an improvement.
    fn default() -> Self {
        SpeciesStats {
            best_fitness_ever: f32::MIN,
            median_fitness: 0.0,
            fitness_variance: 0.0,
            generations_since_improvement: 0,
        }
    }
}

impl SpeciesStats {
    /// Recomputes `median_fitness`/`fitness_variance` from the current
    /// population and updates `best_fitness_ever`/
    /// `generations_since_improvement` against the new best.
    pub fn update(&mut self, individuals: &[Individual]) {
        let mut fitnesses: Vec<f32> = individuals.iter().map(|i| i.fitness).collect();
        fitnesses.sort_by(|a, b| a.partial_cmp(b).expect("fitness is never NaN"));

        let median = if fitnesses.is_empty() {
            0.0
        } else if fitnesses.len() % 2 == 1 {
            fitnesses[fitnesses.len() / 2]
        } else {
            let mid = fitnesses.len() / 2;
            (fitnesses[mid - 1] + fitnesses[mid]) / 2.0
        };

        let mean: f32 = if fitnesses.is_empty() {
            0.0
        } else {
            fitnesses.iter().sum::<f32>() / fitnesses.len() as f32
        };
        let variance: f32 = if fitnesses.is_empty() {
            0.0
        } else {
            fitnesses.iter().map(|f| (f - mean).powi(2)).sum::<f32>() / fitnesses.len() as f32
        };

        self.median_fitness = median;
        self.fitness_variance = variance;

        let current_best = fitnesses.last().copied().unwrap_or(f32::MIN);
        if current_best > self.best_fitness_ever {
            self.best_fitness_ever = current_best;
            self.generations_since_improvement = 0;
        } else {
            self.generations_since_improvement += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub topology: SpeciesSpec,
    pub individuals: Vec<Individual>,
    pub age: u32,
    pub stats: SpeciesStats,
}

impl Species {
    pub fn best_individual(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).expect("fitness is never NaN"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub all_species: Vec<Species>,
    pub generation: u64,
    pub total_species_created: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PopulationStatistics {
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub median_fitness: f32,
    pub worst_fitness: f32,
}

impl Population {
    pub fn all_individuals(&self) -> impl Iterator<Item = &Individual> {
        self.all_species.iter().flat_map(|s| s.individuals.iter())
    }

    pub fn get_best_individual(&self) -> Option<&Individual> {
        self.all_individuals()
            .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).expect("fitness is never NaN"))
    }

    pub fn get_statistics(&self) -> PopulationStatistics {
        let mut fitnesses: Vec<f32> = self.all_individuals().map(|i| i.fitness).collect();
        if fitnesses.is_empty() {
            return PopulationStatistics::default();
        }
        fitnesses.sort_by(|a, b| a.partial_cmp(b).expect("fitness is never NaN"));

        let best = *fitnesses.last().unwrap();
        let worst = fitnesses[0];
        let mean = fitnesses.iter().sum::<f32>() / fitnesses.len() as f32;
        let median = if fitnesses.len() % 2 == 1 {
            fitnesses[fitnesses.len() / 2]
        } else {
            let mid = fitnesses.len() / 2;
            (fitnesses[mid - 1] + fitnesses[mid]) / 2.0
        };

        PopulationStatistics {
            best_fitness: best,
            mean_fitness: mean,
            median_fitness: median,
            worst_fitness: worst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::topology::builder::SpeciesBuilder;

    fn dummy_individual(fitness: f32) -> Individual {
        Individual {
            weights: vec![],
            biases: vec![0.0],
            node_params: vec![[0.0; 4]],
            activations: vec![ActivationType::Linear],
            fitness,
            age: 0,
        }
    }

    #[test]
    fn statistics_over_multiple_species() {
        let spec = SpeciesBuilder::new()
            .add_input_row(1)
            .add_output_row(1, [ActivationType::Linear])
            .with_max_in_degree(1)
            .add_edge(0, 1)
            .build()
            .unwrap();
        let population = Population {
            all_species: vec![
                Species {
                    topology: spec.clone(),
                    individuals: vec![dummy_individual(1.0), dummy_individual(3.0)],
                    age: 0,
                    stats: SpeciesStats::default(),
                },
                Species {
                    topology: spec,
                    individuals: vec![dummy_individual(2.0), dummy_individual(4.0)],
                    age: 0,
                    stats: SpeciesStats::default(),
                },
            ],
            generation: 0,
            total_species_created: 2,
        };
        let stats = population.get_statistics();
        assert_eq!(stats.best_fitness, 4.0);
        assert_eq!(stats.worst_fitness, 1.0);
        assert_eq!(stats.mean_fitness, 2.5);
        assert_eq!(population.get_best_individual().unwrap().fitness, 4.0);
    }

    #[test]
    fn species_stats_track_stagnation() {
        let mut stats = SpeciesStats::default();
        stats.update(&[dummy_individual(1.0), dummy_individual(2.0)]);
        assert_eq!(stats.best_fitness_ever, 2.0);
        assert_eq!(stats.generations_since_improvement, 0);
        stats.update(&[dummy_individual(1.0), dummy_individual(1.5)]);
        assert_eq!(stats.best_fitness_ever, 2.0);
        assert_eq!(stats.generations_since_improvement, 1);
    }
}
