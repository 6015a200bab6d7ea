//! Speciated neuroevolution of feed-forward networks.
//!
//! The core co-designs four pieces that only make sense together: the
//! layered topology model ([`topology`]), the deterministic row-plan
//! evaluator ([`evaluator`]), the mutation suite ([`mutation`]), and the
//! speciated evolutionary loop ([`population`]). Concrete benchmarks, a
//! GPU-backed batch evaluator, and CLI/test harnesses are external
//! collaborators specified only by the [`environment::Environment`]
//! contract they implement against this crate.

pub mod activation;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod individual;
pub mod mutation;
pub mod population;
pub mod rng;
pub mod topology;

pub use activation::ActivationType;
pub use environment::{Environment, FitnessEvaluator, Policy};
pub use error::{EvoError, EvoResult};
pub use evaluator::{evaluate, Evaluator, RowPlanEvaluator};
pub use individual::Individual;
pub use population::evolver::{EvolutionConfig, Evolver};
pub use population::{Population, PopulationStatistics, Species};
pub use topology::builder::SpeciesBuilder;
pub use topology::SpeciesSpec;
