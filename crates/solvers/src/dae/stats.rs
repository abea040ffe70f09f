/// Work counters kept inside the integrator record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct Counters {
    /// Accepted internal steps.
    pub(super) steps: usize,
    /// Residual evaluations.
    pub(super) residual_evals: usize,
    /// Iteration matrices built.
    pub(super) jacobian_evals: usize,
    /// Corrector iterations.
    pub(super) newton_iters: usize,
    /// Steps rejected by the corrector.
    pub(super) convergence_failures: usize,
    /// Steps rejected by the local error test.
    pub(super) error_test_failures: usize,
    /// Steps rejected by a violated constraint.
    pub(super) constraint_failures: usize,
}

/// A summary of the integrator's work since the model was attached.
///
/// Counters are part of the checkpoint, so [`load_state`] rolls them back.
///
/// [`load_state`]: super::DaeSolver::load_state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    pub steps: usize,
    pub residual_evals: usize,
    /// Finite-difference iteration matrices built.
    pub jacobian_evals: usize,
    pub newton_iters: usize,
    pub convergence_failures: usize,
    pub error_test_failures: usize,
    pub constraint_failures: usize,
    /// Order used on the last accepted step.
    pub last_order: usize,
    /// Order to be tried on the next step.
    pub current_order: usize,
    pub last_step: f64,
    pub current_step: f64,
    pub current_time: f64,
}
