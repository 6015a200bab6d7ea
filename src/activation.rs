//! Closed-enum activation functions.
//!
//! Modeled as a tagged variant rather than a trait object: the set is fixed
//! at 11 members, dispatch is a single `match`, and there is no need to plug
//! in externally-defined activations (Design Notes: "Polymorphism over
//! activations").

use serde::{Deserialize, Serialize};

/// Bitmask over [`ActivationType`] variants, used by
/// [`crate::topology::SpeciesSpec`] to whitelist activations per row.
pub type ActivationMask = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationType {
    Linear,
    Tanh,
    Sigmoid,
    ReLU,
    LeakyReLU,
    ELU,
    Softsign,
    Softplus,
    Sin,
    Gaussian,
    GELU,
}

pub const ALL_ACTIVATIONS: [ActivationType; 11] = [
    ActivationType::Linear,
    ActivationType::Tanh,
    ActivationType::Sigmoid,
    ActivationType::ReLU,
    ActivationType::LeakyReLU,
    ActivationType::ELU,
    ActivationType::Softsign,
    ActivationType::Softplus,
    ActivationType::Sin,
    ActivationType::Gaussian,
    ActivationType::GELU,
];

impl ActivationType {
    /// Bit position of this variant within an [`ActivationMask`].
    pub fn bit(self) -> ActivationMask {
        1 << (self as u32)
    }

    /// Number of scalar parameters this activation consumes from a node's
    /// 4-slot parameter array.
    pub fn required_param_count(self) -> usize {
        match self {
            ActivationType::LeakyReLU | ActivationType::ELU => 1,
            _ => 0,
        }
    }

    /// Default parameter values used when a node adopts this activation
    /// (via construction or an activation-swap mutation).
    pub fn default_parameters(self) -> [f32; 4] {
        match self {
            ActivationType::LeakyReLU => [0.01, 0.0, 0.0, 0.0],
            ActivationType::ELU => [1.0, 0.0, 0.0, 0.0],
            _ => [0.0, 0.0, 0.0, 0.0],
        }
    }

    /// Whether this activation may appear in an output row's allowed mask.
    pub fn valid_for_output(self) -> bool {
        matches!(self, ActivationType::Linear | ActivationType::Tanh)
    }

    /// Evaluate the activation at a pre-activation value, using up to the
    /// first `required_param_count()` slots of `params`.
    pub fn evaluate(self, pre_activation: f32, params: &[f32; 4]) -> f32 {
        match self {
            ActivationType::Linear => pre_activation,
            ActivationType::Tanh => pre_activation.tanh(),
            ActivationType::Sigmoid => 1.0 / (1.0 + (-pre_activation).exp()),
            ActivationType::ReLU => pre_activation.max(0.0),
            ActivationType::LeakyReLU => {
                let alpha = params[0];
                if pre_activation >= 0.0 {
                    pre_activation
                } else {
                    alpha * pre_activation
                }
            }
            ActivationType::ELU => {
                let alpha = params[0];
                if pre_activation >= 0.0 {
                    pre_activation
                } else {
                    alpha * (pre_activation.exp() - 1.0)
                }
            }
            ActivationType::Softsign => pre_activation / (1.0 + pre_activation.abs()),
            ActivationType::Softplus => (1.0 + pre_activation.exp()).ln(),
            ActivationType::Sin => pre_activation.sin(),
            ActivationType::Gaussian => (-pre_activation * pre_activation).exp(),
            ActivationType::GELU => {
                0.5 * pre_activation
                    * (1.0 + erf_approx(pre_activation / std::f32::consts::SQRT_2))
            }
        }
    }
}

/// Abramowitz & Stegun 7.1.26 approximation of the error function, accurate
/// to ~1.5e-7 — sufficient for GELU's tail and keeps the crate dependency
/// free for this one function.
fn erf_approx(x: f32) -> f32 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f32 = 0.254829592;
    const A2: f32 = -0.284496736;
    const A3: f32 = 1.421413741;
    const A4: f32 = -1.453152027;
    const A5: f32 = 1.061405429;
    const P: f32 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

pub fn mask_contains(mask: ActivationMask, act: ActivationType) -> bool {
    mask & act.bit() != 0
}

pub fn mask_from(activations: impl IntoIterator<Item = ActivationType>) -> ActivationMask {
    activations.into_iter().fold(0, |acc, a| acc | a.bit())
}

/// All activations set in `mask`, in enum declaration order.
pub fn mask_members(mask: ActivationMask) -> Vec<ActivationType> {
    ALL_ACTIVATIONS
        .into_iter()
        .filter(|a| mask_contains(mask, *a))
        .collect()
}
