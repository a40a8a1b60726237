//! Update rules applied to a parameter given its averaged gradient.

use crate::core::{Matrix, Result};

/// Mutates a parameter value in place from an averaged gradient.
///
/// The name is stable and is what a distributed worker sends along with a
/// pushed gradient so the remote service can apply the same rule.
pub trait UpdateRule: Send + Sync {
    /// Stable identifier used for remote routing.
    fn name(&self) -> &str;

    /// Apply `gradient` to `value` in place.
    fn apply(&self, key: &str, value: &mut Matrix, gradient: &Matrix) -> Result<()>;
}

/// Plain stochastic gradient descent.
#[derive(Clone, Debug)]
pub struct Sgd {
    /// Step size
    pub learning_rate: f32,
}

impl Sgd {
    pub const NAME: &'static str = "sgd";

    /// Create an SGD rule with the given learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl UpdateRule for Sgd {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, _key: &str, value: &mut Matrix, gradient: &Matrix) -> Result<()> {
        value.sub_scaled_assign(gradient, self.learning_rate)
    }
}
