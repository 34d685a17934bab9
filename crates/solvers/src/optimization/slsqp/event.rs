use braid_core::{ConstraintValues, Jacobian};

/// Events emitted by the SLSQP driver.
///
/// Each event is emitted after the workflow has been evaluated at `x` and
/// before the solver sees the result.
#[derive(Debug)]
pub enum Event<'a> {
    /// The objective and constraints were evaluated.
    FunctionEvaluated {
        /// Major iteration the evaluation belongs to.
        iteration: usize,

        x: &'a [f64],

        objective: f64,

        /// Raw constraint values, as registered.
        constraints: &'a ConstraintValues,
    },

    /// The Jacobian was assembled.
    GradientEvaluated {
        iteration: usize,

        x: &'a [f64],

        jacobian: &'a Jacobian,

        /// Components whose partials were all treated as zero.
        inert: &'a [String],
    },
}

impl Event<'_> {
    /// Returns the point that was evaluated.
    #[must_use]
    pub fn x(&self) -> &[f64] {
        match self {
            Self::FunctionEvaluated { x, .. } | Self::GradientEvaluated { x, .. } => x,
        }
    }

    /// Returns the major iteration of the event.
    #[must_use]
    pub fn iteration(&self) -> usize {
        match self {
            Self::FunctionEvaluated { iteration, .. } | Self::GradientEvaluated { iteration, .. } => {
                *iteration
            }
        }
    }
}
