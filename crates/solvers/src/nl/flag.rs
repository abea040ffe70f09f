use thiserror::Error;

/// Successful outcomes of a nonlinear solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The scaled function norm dropped below tolerance.
    Success,
    /// The initial guess already satisfied the tolerance; no iteration ran.
    InitialGuessOk,
    /// The scaled step became too small to make further progress.
    StepBelowTolerance,
}

impl Outcome {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::InitialGuessOk => 1,
            Outcome::StepBelowTolerance => 2,
        }
    }
}

/// Failure outcomes of a nonlinear solve.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NlFlag {
    #[error("the line search could not find an acceptable step")]
    LinesearchNonConvergence,

    #[error("the maximum number of iterations was reached")]
    MaxIterations,

    #[error("five consecutive steps were truncated to the maximum step length")]
    MaxNewtonStep5x,

    #[error("the linear solve failed")]
    LinearSolveFailure,

    #[error("the system function failed")]
    FunctionFailure,

    #[error("illegal input")]
    IllegalInput,

    #[error("no model is attached")]
    NotAttached,
}

impl NlFlag {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            NlFlag::LinesearchNonConvergence => -5,
            NlFlag::MaxIterations => -6,
            NlFlag::MaxNewtonStep5x => -7,
            NlFlag::LinearSolveFailure => -9,
            NlFlag::FunctionFailure => -13,
            NlFlag::IllegalInput => -22,
            NlFlag::NotAttached => -30,
        }
    }
}
