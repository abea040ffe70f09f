use crate::linear::DenseLinearSolver;

use super::stats::{Counters, Statistics};

/// Highest BDF order the integrator uses.
pub const MAX_ORDER: usize = 5;

/// Newton rate estimate used right after the iteration matrix is rebuilt.
pub(super) const INITIAL_NEWTON_RATE: f64 = 20.0;

/// The complete internal state of the integrator.
///
/// Everything that influences the next internal step lives here, so copying
/// a record and later copying it back reproduces the same trajectory.
#[derive(Debug)]
pub struct IntegratorRecord {
    /// Accepted solutions, most recent first. Always `MAX_ORDER + 1` vectors.
    pub(super) history: Vec<Vec<f64>>,
    pub(super) history_times: Vec<f64>,
    /// Number of valid entries in `history`.
    pub(super) history_len: usize,
    pub(super) order: usize,
    pub(super) last_order: usize,
    pub(super) steps_at_order: usize,
    /// Step to try next; zero until the first step picks one.
    pub(super) step: f64,
    pub(super) last_step: f64,
    pub(super) time: f64,
    pub(super) stop_time: Option<f64>,
    pub(super) cj: f64,
    /// The `cj` the iteration matrix was built with.
    pub(super) cj_jacobian: f64,
    pub(super) jacobian_age: usize,
    pub(super) force_jacobian: bool,
    pub(super) newton_rate: f64,
    pub(super) counters: Counters,
    pub(super) linear: DenseLinearSolver,
    pub(super) vars: Vec<f64>,
    pub(super) ders: Vec<f64>,
}

impl IntegratorRecord {
    /// Creates a record at `t = 0` sized for `vars.len()` variables.
    pub(super) fn new(vars: &[f64], ders: &[f64]) -> Self {
        let n = vars.len();
        let mut history = vec![vec![0.0; n]; MAX_ORDER + 1];
        history[0].copy_from_slice(vars);

        Self {
            history,
            history_times: vec![0.0; MAX_ORDER + 1],
            history_len: 1,
            order: 1,
            last_order: 0,
            steps_at_order: 0,
            step: 0.0,
            last_step: 0.0,
            time: 0.0,
            stop_time: None,
            cj: 0.0,
            cj_jacobian: 0.0,
            jacobian_age: 0,
            force_jacobian: true,
            newton_rate: INITIAL_NEWTON_RATE,
            counters: Counters::default(),
            linear: DenseLinearSolver::new(n),
            vars: vars.to_vec(),
            ders: ders.to_vec(),
        }
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn vars(&self) -> &[f64] {
        &self.vars
    }

    #[must_use]
    pub fn ders(&self) -> &[f64] {
        &self.ders
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let Counters {
            steps,
            residual_evals,
            jacobian_evals,
            newton_iters,
            convergence_failures,
            error_test_failures,
            constraint_failures,
        } = self.counters;

        Statistics {
            steps,
            residual_evals,
            jacobian_evals,
            newton_iters,
            convergence_failures,
            error_test_failures,
            constraint_failures,
            last_order: self.last_order,
            current_order: self.order,
            last_step: self.last_step,
            current_step: self.step,
            current_time: self.time,
        }
    }

    /// Makes `vars` the only history point at the current time.
    pub(super) fn restart_history(&mut self) {
        self.history[0].copy_from_slice(&self.vars);
        self.history_times[0] = self.time;
        self.history_len = 1;
        self.order = 1;
        self.steps_at_order = 0;
    }
}

impl Clone for IntegratorRecord {
    fn clone(&self) -> Self {
        Self {
            history: self.history.clone(),
            history_times: self.history_times.clone(),
            history_len: self.history_len,
            order: self.order,
            last_order: self.last_order,
            steps_at_order: self.steps_at_order,
            step: self.step,
            last_step: self.last_step,
            time: self.time,
            stop_time: self.stop_time,
            cj: self.cj,
            cj_jacobian: self.cj_jacobian,
            jacobian_age: self.jacobian_age,
            force_jacobian: self.force_jacobian,
            newton_rate: self.newton_rate,
            counters: self.counters,
            linear: self.linear.clone(),
            vars: self.vars.clone(),
            ders: self.ders.clone(),
        }
    }

    /// Copies `source` into `self`, reusing the existing allocations.
    fn clone_from(&mut self, source: &Self) {
        // Destructured so a new field cannot be skipped silently.
        let Self {
            history,
            history_times,
            history_len,
            order,
            last_order,
            steps_at_order,
            step,
            last_step,
            time,
            stop_time,
            cj,
            cj_jacobian,
            jacobian_age,
            force_jacobian,
            newton_rate,
            counters,
            linear,
            vars,
            ders,
        } = source;

        self.history.clone_from(history);
        self.history_times.clone_from(history_times);
        self.history_len = *history_len;
        self.order = *order;
        self.last_order = *last_order;
        self.steps_at_order = *steps_at_order;
        self.step = *step;
        self.last_step = *last_step;
        self.time = *time;
        self.stop_time = *stop_time;
        self.cj = *cj;
        self.cj_jacobian = *cj_jacobian;
        self.jacobian_age = *jacobian_age;
        self.force_jacobian = *force_jacobian;
        self.newton_rate = *newton_rate;
        self.counters = *counters;
        self.linear.clone_from(linear);
        self.vars.clone_from(vars);
        self.ders.clone_from(ders);
    }
}
