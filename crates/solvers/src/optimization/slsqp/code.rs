use std::fmt;

/// Raw mode: the first call, made after the initial function and gradient.
pub(super) const START: i32 = 0;

/// Raw mode: converged, or (on input) the first call.
pub(super) const CONVERGED: i32 = 0;

/// Raw mode: evaluate the objective and constraints at the new `x`.
pub(super) const FUNCTION: i32 = 1;

/// Raw mode: evaluate the gradients at the current `x`.
pub(super) const GRADIENT: i32 = -1;

/// A terminal failure reported by the SLSQP core.
///
/// Each variant carries the integer code of the classic SLSQP routine so
/// logs and output files stay comparable with other implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverCode {
    /// More equality constraints than design variables.
    TooManyEqualities,

    /// The non-negative least squares inner loop hit its `3 * n` cap.
    SubproblemIterations,

    /// The linearized inequality constraints have no common solution.
    IncompatibleConstraints,

    /// The least squares matrix of the QP subproblem is singular.
    SingularE,

    /// The equality constraint matrix of the QP subproblem is singular.
    SingularC,

    /// The equality constrained least squares problem is rank deficient.
    RankDeficient,

    /// The search direction is not a descent direction for the merit function.
    PositiveDirectionalDerivative,

    /// The iteration limit was reached.
    IterationLimit,
}

impl SolverCode {
    /// Returns the classic integer code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::TooManyEqualities => 2,
            Self::SubproblemIterations => 3,
            Self::IncompatibleConstraints => 4,
            Self::SingularE => 5,
            Self::SingularC => 6,
            Self::RankDeficient => 7,
            Self::PositiveDirectionalDerivative => 8,
            Self::IterationLimit => 9,
        }
    }

    /// Maps a classic integer code back to its variant.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            2 => Self::TooManyEqualities,
            3 => Self::SubproblemIterations,
            4 => Self::IncompatibleConstraints,
            5 => Self::SingularE,
            6 => Self::SingularC,
            7 => Self::RankDeficient,
            8 => Self::PositiveDirectionalDerivative,
            9 => Self::IterationLimit,
            _ => return None,
        })
    }

    /// Returns the human-readable message for this code.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::TooManyEqualities => "More equality constraints than independent variables",
            Self::SubproblemIterations => "More than 3*n iterations in LSQ subproblem",
            Self::IncompatibleConstraints => "Inequality constraints incompatible",
            Self::SingularE => "Singular matrix E in LSQ subproblem",
            Self::SingularC => "Singular matrix C in LSQ subproblem",
            Self::RankDeficient => "Rank-deficient equality constraint subproblem HFTI",
            Self::PositiveDirectionalDerivative => "Positive directional derivative for linesearch",
            Self::IterationLimit => "Iteration limit exceeded",
        }
    }
}

impl fmt::Display for SolverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit mode {})", self.message(), self.code())
    }
}

/// Returns the message for any raw mode, including the request modes.
pub(super) fn mode_message(mode: i32) -> &'static str {
    match mode {
        GRADIENT => "Gradient evaluation required (g & a)",
        CONVERGED => "Optimization terminated successfully",
        FUNCTION => "Function evaluation required (f & c)",
        other => SolverCode::from_code(other).map_or("Unknown exit mode", SolverCode::message),
    }
}
