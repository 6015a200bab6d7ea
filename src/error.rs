use thiserror::Error;

/// Error taxonomy for the neuroevolution core.
///
/// `MutationInfeasible` and `NonFiniteOutput` are recovered locally by their
/// callers (the mutation suite and the fitness evaluator, respectively) and
/// should rarely reach an application; the other variants are caller bugs or
/// malformed input and are expected to propagate.
#[derive(Error, Debug)]
pub enum EvoError {
    #[error("invalid topology: {reason}")]
    InvalidTopology { reason: String },

    #[error("invalid input size: expected {expected}, got {got}")]
    InvalidInputSize { expected: usize, got: usize },

    #[error("node {node} out of range for {total} nodes")]
    NodeOutOfRange { node: usize, total: usize },

    #[error("structural mutation infeasible: {op} after {attempts} attempts")]
    MutationInfeasible { op: &'static str, attempts: usize },

    #[error("activation produced a non-finite value at node {node}")]
    NonFiniteOutput { node: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EvoResult<T> = Result<T, EvoError>;
