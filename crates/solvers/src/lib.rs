//! Equation solvers for the Spindle framework.
//!
//! - [`dae::DaeSolver`] — implicit BDF integration of `F(t, y, y') = 0` with
//!   stop-time control and full-state checkpoints
//! - [`nl::NlSolver`] — Newton, line-search, fixed-point and Picard solves of
//!   nonlinear algebraic systems
//!
//! Both solvers own the model they are attached to and keep the most recent
//! failure in an [`ErrorSlot`].

mod bridge;
mod linear;
mod report;

pub mod dae;
pub mod nl;

pub use bridge::{CallbackStatus, FunctionFn, ResidualFn};
pub use linear::{DenseLinearSolver, LinearError};
pub use report::{ErrorSlot, SolverError};
