//! Minimal `Environment` implementation plus an end-to-end evolutionary
//! run, exercising the full loop: topology construction, population
//! initialization, fitness evaluation, and generation stepping.

use neuroevolve::activation::ActivationType;
use neuroevolve::environment::{Environment, FitnessEvaluator, Policy};
use neuroevolve::population::evolver::{EvolutionConfig, Evolver};
use neuroevolve::SpeciesBuilder;

struct Xor;

const CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

impl Environment for Xor {
    fn input_size(&self) -> usize {
        2
    }

    fn output_size(&self) -> usize {
        1
    }

    fn run(&self, policy: &dyn Policy, _seed: u64) -> f32 {
        let mut sq_error = 0.0f32;
        for (inputs, target) in CASES {
            let out = policy.act(&inputs);
            sq_error += (out[0] - target).powi(2);
        }
        -sq_error
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let topology = SpeciesBuilder::new()
        .add_input_row(2)
        .add_hidden_row(4, [ActivationType::ReLU, ActivationType::Tanh])
        .add_output_row(1, [ActivationType::Tanh])
        .with_max_in_degree(4)
        .fully_connect(0, 1)
        .fully_connect(1, 2)
        .build()
        .expect("xor topology is valid");

    let evolver = Evolver::new(42);
    let config = EvolutionConfig::default();
    let mut population = evolver.initialize_population(&config, &topology);

    let fitness_evaluator = FitnessEvaluator { episodes: 1 };
    for generation in 0..200 {
        fitness_evaluator.evaluate_population(&mut population, &Xor, 7);
        if generation % 20 == 0 {
            let stats = population.get_statistics();
            tracing::info!(generation, best = stats.best_fitness, "progress");
        }
        evolver.step_generation(&mut population, &config);
    }

    let best = population.get_best_individual().expect("population is non-empty");
    println!("best fitness: {}", best.fitness);
}
