//! Core types for the Spindle equation solvers.
//!
//! This crate defines what a unit operation hands to a solver:
//!
//! - [`DaeModel`] and [`NlModel`] — ordered variable registries with
//!   tolerances, constraints, and scales
//! - [`DaeSystem`] and [`NlSystem`] — the two-method callback contract
//!   (evaluate, publish) implemented by unit models
//! - [`Constraint`] and [`Strategy`] — closed sets of variable constraints and
//!   nonlinear solution strategies

mod constraint;
mod models;
mod strategy;
mod system;
mod tolerance;

pub use constraint::Constraint;
pub use models::{DaeModel, NlModel, NlVariable, StateVariable, VariableError};
pub use strategy::{Strategy, StrategyFamily};
pub use system::{DaeFn, DaeSystem, NlFn, NlSystem};
pub use tolerance::{DEFAULT_ATOL, DEFAULT_RTOL, Tolerances};
