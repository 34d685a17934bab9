//! Optimization drivers for Braid workflows.

pub mod optimization;
