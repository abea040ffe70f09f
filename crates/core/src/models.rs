//! Variable registries of the unit models handed to the solvers.
//!
//! - [`DaeModel`] — differential and algebraic state variables, tolerances,
//!   and a [`DaeSystem`](crate::DaeSystem)
//! - [`NlModel`] — scaled unknowns of a nonlinear system, the active
//!   [`Strategy`](crate::Strategy), and an [`NlSystem`](crate::NlSystem)

mod dae;
mod nl;

use thiserror::Error;

pub use dae::{DaeModel, StateVariable};
pub use nl::{NlModel, NlVariable};

/// Errors returned by bulk variable registration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VariableError {
    #[error("{values} initial values but {derivatives} initial derivatives")]
    LengthMismatch { values: usize, derivatives: usize },
}
