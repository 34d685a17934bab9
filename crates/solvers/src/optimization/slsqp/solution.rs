use braid_core::ConstraintValues;

/// Indicates how a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// Converged to the requested accuracy.
    Converged,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of an SLSQP run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct Solution {
    pub status: Status,

    /// Final design vector.
    pub x: Vec<f64>,

    /// Objective value at `x`.
    pub objective: f64,

    /// Raw constraint values at `x`.
    pub constraints: ConstraintValues,

    /// Major iterations performed.
    pub iters: usize,

    /// Objective and constraint evaluations.
    pub func_count: usize,

    /// Gradient evaluations.
    pub grad_count: usize,
}
