//! Solvers for constrained optimization of component workflows.
//!
//! A [`Registry`] names the design variables, objective, and constraints of
//! a [`Workflow`]. Solvers in this module move the design variables toward a
//! constrained minimum, evaluating the workflow whenever they need new
//! values or derivatives.
//!
//! # Solvers
//!
//! - [`slsqp`]: sequential least squares quadratic programming for smooth
//!   problems with equality, inequality, and bound constraints
//!
//! [`Registry`]: braid_core::Registry
//! [`Workflow`]: braid_core::Workflow

pub mod slsqp;
