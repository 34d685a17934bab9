//! Core types for coupling analysis components into optimization workflows.
//!
//! This crate defines the pieces a gradient-based driver builds on:
//!
//! - [`Component`]: an opaque analysis unit with named input and output
//!   slots, optional partial derivatives, and declared derivative kinds
//! - [`Workflow`]: a directed acyclic graph of components, executed in
//!   dependency order
//! - [`Registry`]: design variables with bounds, the objective, and
//!   constraints expressed over component outputs
//! - [`jacobian::assemble`]: chains per-component partials into one dense
//!   Jacobian over the design vector
//! - [`workdir`]: scoped scratch directories for file-based components
//! - [`Observer`]: receives driver events and optionally returns actions

mod component;
mod error;
mod observer;
mod path;
mod value;

pub mod expression;
pub mod jacobian;
pub mod partials;
pub mod registry;
pub mod workdir;
pub mod workflow;

pub use component::Component;
pub use error::{ComponentError, ConfigError, ExecutionError, Phase, WorkflowError};
pub use jacobian::Jacobian;
pub use observer::Observer;
pub use partials::{DerivativeKind, PartialDeclaration, Partials};
pub use path::{Connection, Path, PathError};
pub use registry::{ConstraintKind, ConstraintValues, Registry};
pub use value::{Shape, SlotError, SlotSpec, Slots, Value};
pub use workflow::{Linearization, Workflow};
