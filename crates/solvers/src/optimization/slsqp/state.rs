use super::SolverCode;

/// Lifecycle of a [`Driver`](super::Driver).
///
/// A driver starts in `Init`, alternates between the two evaluation states
/// while the solver works, and ends in one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created but not started.
    Init,

    /// The objective and constraints must be evaluated at the current `x`.
    NeedFunction,

    /// Gradients must be evaluated at the current `x`.
    NeedGradient,

    /// The solver met its accuracy target.
    Converged,

    /// The solver stopped with an error code.
    Error(SolverCode),

    /// A component failed or produced a non-finite objective.
    Aborted,

    /// An observer stopped the run.
    Stopped,
}

impl State {
    /// Returns `true` once no further steps will be taken.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Converged | Self::Error(_) | Self::Aborted | Self::Stopped
        )
    }
}
