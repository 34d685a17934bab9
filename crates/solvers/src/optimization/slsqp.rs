//! Sequential least squares quadratic programming (SLSQP).
//!
//! # Algorithm
//!
//! SLSQP minimizes a smooth objective subject to equality constraints,
//! inequality constraints, and variable bounds. Each major iteration solves
//! a quadratic subproblem built from a quasi-Newton approximation of the
//! Lagrangian Hessian and the linearized constraints, then searches along
//! the result with an L1 penalty merit function. The Hessian approximation is
//! kept as packed `L D Lᵀ` factors and refreshed with damped BFGS updates.
//!
//! The core follows Kraft's reverse-communication design: it never calls
//! the model itself. It returns to the [`Driver`] asking for either a
//! function or a gradient evaluation, and the driver answers by running the
//! workflow. The integer modes of the classic interface stay inside the
//! boundary adapter; callers see [`State`] and [`SolverCode`].
//!
//! # Sign Conventions
//!
//! Constraints are registered as `c(x) = 0` or `c(x) <= 0`. The driver
//! negates values and gradients before handing them to the core.
//!
//! # Observer Events
//!
//! The driver emits one [`Event`] per evaluation:
//!
//! - [`Event::FunctionEvaluated`]: the objective and constraints at `x`
//! - [`Event::GradientEvaluated`]: the assembled Jacobian at `x`
//!
//! Observers can return [`Action::StopEarly`] to end the run with
//! [`Status::StoppedByObserver`].

mod action;
mod boundary;
mod code;
mod config;
mod driver;
mod error;
mod event;
mod report;
mod solution;
mod sqp;
mod state;
mod workspace;


pub use action::Action;
pub use code::SolverCode;
pub use config::{Config, ConfigError, DEFAULT_OUTPUT_FILE, Output, PrintLevel};
pub use driver::Driver;
pub use error::Error;
pub use event::Event;
pub use solution::{Solution, Status};
pub use state::State;
pub use workspace::{Workspace, WorkspaceSize};

use braid_core::{Observer, Registry, Workflow};

/// Minimizes the registered objective with SLSQP.
///
/// The registry is frozen when the run starts. On return the workflow holds
/// the outputs of the last evaluated point.
///
/// # Errors
///
/// Returns an error if the run cannot start, a component fails, the
/// objective is not finite, or the solver terminates with an error code.
pub fn minimize<Obs>(
    workflow: &mut Workflow,
    registry: &mut Registry,
    config: &Config,
    observer: Obs,
) -> Result<Solution, Error>
where
    Obs: for<'a> Observer<Event<'a>, Action>,
{
    Driver::new(workflow, registry, config.clone()).run(observer)
}

/// Minimizes the registered objective without observer support.
///
/// This is a convenience wrapper around [`minimize`] that uses a no-op observer.
///
/// # Errors
///
/// Returns an error if the run cannot start, a component fails, the
/// objective is not finite, or the solver terminates with an error code.
pub fn minimize_unobserved(
    workflow: &mut Workflow,
    registry: &mut Registry,
    config: &Config,
) -> Result<Solution, Error> {
    minimize(workflow, registry, config, ())
}
