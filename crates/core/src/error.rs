use std::fmt;

use thiserror::Error;

use crate::path::{Path, PathError};

/// An error returned by an analysis component.
///
/// Components wrap whatever failure their underlying solver produced.
pub type ComponentError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while assembling a workflow, registry, or driver.
///
/// Every configuration error is fatal and is raised before any solver call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("component `{0}` is already registered")]
    DuplicateComponent(String),

    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    #[error("component `{component}` has no input slot `{slot}`")]
    UnknownInput { component: String, slot: String },

    #[error("component `{component}` has no output slot `{slot}`")]
    UnknownOutput { component: String, slot: String },

    #[error("`{path}` does not address a scalar element")]
    NotScalar { path: Path },

    #[error("index out of range in `{path}` (slot length {len})")]
    IndexOutOfRange { path: Path, len: usize },

    #[error("cannot connect `{from}` to `{to}`: {reason}")]
    ShapeMismatch { from: Path, to: Path, reason: String },

    #[error("input `{target}` is driven by more than one connection")]
    MultipleSources { target: Path },

    #[error("cycle detected among components: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("workflow must be configured before it can run")]
    NotConfigured,

    #[error("component `{0}` has not been evaluated yet")]
    NotEvaluated(String),

    #[error("`{path}` is driven by a connection and cannot be a design variable")]
    DrivenInput { path: Path },

    #[error("`{path}` is already a design variable target")]
    DuplicateTarget { path: Path },

    #[error("a parameter group needs at least one target")]
    EmptyGroup,

    #[error("invalid bounds [{low}, {high}]")]
    InvalidBounds { low: f64, high: f64 },

    #[error("invalid expression `{text}`: {reason}")]
    Expression { text: String, reason: String },

    #[error("{0}")]
    Constraint(String),

    #[error("an objective is already registered")]
    DuplicateObjective,

    #[error("no objective registered")]
    MissingObjective,

    #[error("no design variables registered")]
    NoDesignVariables,

    #[error("registry is frozen once iteration starts")]
    Frozen,

    #[error("design vector has length {actual}, expected {expected}")]
    VectorLength { expected: usize, actual: usize },

    #[error("{0}")]
    Invalid(String),
}

/// Which component method was running when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Evaluate,
    Linearize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluate => f.write_str("evaluate"),
            Self::Linearize => f.write_str("linearize"),
        }
    }
}

/// A component failed during a workflow pass.
///
/// Wraps the component's own error together with its name and the phase, so
/// the failure can be traced back to one node of the workflow.
#[derive(Debug, Error)]
#[error("component `{component}` failed during {phase}: {source}")]
pub struct ExecutionError {
    pub component: String,
    pub phase: Phase,
    #[source]
    pub source: ComponentError,
}

impl ExecutionError {
    pub(crate) fn new(component: &str, phase: Phase, source: impl Into<ComponentError>) -> Self {
        Self {
            component: component.to_owned(),
            phase,
            source: source.into(),
        }
    }
}

/// Errors from running a workflow pass.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
