use thiserror::Error;

/// Failure outcomes of the DAE integrator.
///
/// Each flag carries the integer code reported through
/// [`SolverError::code`](crate::SolverError).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DaeFlag {
    #[error("the maximum number of internal steps was taken before reaching the stop time")]
    TooMuchWork,

    #[error("the error test failed repeatedly or with the minimum step size")]
    ErrorTestFailure,

    #[error("the corrector failed to converge repeatedly or with the minimum step size")]
    ConvergenceFailure,

    #[error("the residual function failed")]
    ResidualFailure,

    #[error("the inequality constraints could not be met")]
    ConstraintFailure,

    #[error("consistent initial conditions could not be computed")]
    InitialConditionFailure,

    #[error("illegal input")]
    IllegalInput,

    #[error("no model is attached")]
    NotAttached,
}

impl DaeFlag {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            DaeFlag::TooMuchWork => -1,
            DaeFlag::ErrorTestFailure => -3,
            DaeFlag::ConvergenceFailure => -4,
            DaeFlag::ResidualFailure => -8,
            DaeFlag::ConstraintFailure => -11,
            DaeFlag::InitialConditionFailure => -12,
            DaeFlag::IllegalInput => -22,
            DaeFlag::NotAttached => -30,
        }
    }
}
