use std::{io, path::PathBuf};

use braid_core::{ConfigError, ExecutionError, WorkflowError};

use super::SolverCode;

/// Errors that can occur during an SLSQP run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The workflow, registry, or workspace is not set up for a run.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A component failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("cannot open output file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The objective evaluated to NaN or infinity.
    #[error("numerical overflow in the objective: f = {value} at x = {x:?}")]
    NonFiniteObjective { x: Vec<f64>, value: f64 },

    /// The solver terminated without converging.
    #[error("{code}")]
    Solver {
        code: SolverCode,
        x: Vec<f64>,
        objective: f64,
        iters: usize,
    },

    /// The solver core returned a mode outside its documented set.
    #[error("solver core returned unknown mode {mode}")]
    UnknownMode { mode: i32 },
}

impl From<WorkflowError> for Error {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Config(err) => Self::Config(err),
            WorkflowError::Execution(err) => Self::Execution(err),
        }
    }
}
