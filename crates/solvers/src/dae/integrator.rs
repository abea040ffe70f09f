//! One internal step of the variable-order, variable-step BDF method.

use spindle_core::Constraint;

use crate::bridge::ResidualFn;

use super::{
    coefficients,
    flag::DaeFlag,
    record::{INITIAL_NEWTON_RATE, IntegratorRecord, MAX_ORDER},
};

const EPS: f64 = f64::EPSILON;

/// Newton iterations allowed per corrector solve.
const MAX_NEWTON_ITERS: usize = 4;

/// Corrector convergence constant, in units of the error test.
const EPS_NEWTON: f64 = 0.33;

/// A Newton rate above this is treated as divergence.
const MAX_NEWTON_RATE: f64 = 0.9;

/// Iteration matrix is rebuilt when `cj` drifts this far from its build value.
const MAX_CJ_DRIFT: f64 = 0.25;

/// Iteration matrix is rebuilt after this many accepted steps.
const MAX_JACOBIAN_AGE: usize = 20;

const MAX_ERROR_TEST_FAILS: usize = 10;
const MAX_CONVERGENCE_FAILS: usize = 10;
const MAX_CONSTRAINT_FAILS: usize = 10;

const SAFETY: f64 = 0.9;
const FAILURE_CUT: f64 = 0.25;
const MIN_SHRINK: f64 = 0.5;
const MAX_SHRINK: f64 = 0.9;
const GROWTH: f64 = 2.0;

/// Per-solve settings handed to the integrator.
pub(super) struct Settings<'a> {
    pub(super) rtol: f64,
    pub(super) atol: &'a [f64],
    /// Zero leaves the step unbounded.
    pub(super) max_step: f64,
    pub(super) max_order: usize,
    pub(super) constraints: Option<&'a [Constraint]>,
    pub(super) differential: &'a [bool],
}

impl Settings<'_> {
    /// Fills `weights` with `1 / (rtol·|y| + atol)`.
    pub(super) fn weights(&self, vars: &[f64], weights: &mut [f64]) {
        for ((w, y), atol) in weights.iter_mut().zip(vars).zip(self.atol) {
            *w = 1.0 / (self.rtol * y.abs() + atol);
        }
    }

    fn bound(&self, step: f64) -> f64 {
        if self.max_step > 0.0 {
            step.min(self.max_step)
        } else {
            step
        }
    }

    pub(super) fn constraints_hold(&self, vars: &[f64]) -> bool {
        self.constraints.is_none_or(|constraints| {
            constraints
                .iter()
                .zip(vars)
                .all(|(c, &y)| c.is_satisfied(y))
        })
    }
}

/// Scratch vectors reused across steps. Never part of a checkpoint.
#[derive(Debug, Clone)]
pub(super) struct Workspace {
    pub(super) y: Vec<f64>,
    pub(super) yp: Vec<f64>,
    pub(super) y_pred: Vec<f64>,
    pub(super) res: Vec<f64>,
    pub(super) res_trial: Vec<f64>,
    pub(super) delta: Vec<f64>,
    pub(super) weights: Vec<f64>,
}

impl Workspace {
    pub(super) fn new(n: usize) -> Self {
        Self {
            y: vec![0.0; n],
            yp: vec![0.0; n],
            y_pred: vec![0.0; n],
            res: vec![0.0; n],
            res_trial: vec![0.0; n],
            delta: vec![0.0; n],
            weights: vec![0.0; n],
        }
    }
}

/// Weighted root-mean-square norm.
pub(super) fn wrms(values: &[f64], weights: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values
        .iter()
        .zip(weights)
        .map(|(v, w)| (v * w).powi(2))
        .sum();
    (sum / values.len() as f64).sqrt()
}

fn wrms_difference(a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .zip(weights)
        .map(|((x, y), w)| ((x - y) * w).powi(2))
        .sum();
    (sum / a.len() as f64).sqrt()
}

/// Why a corrector solve did not converge.
enum Correction {
    Diverged,
    Residual,
}

impl IntegratorRecord {
    /// Takes one internal step, never passing the stop time.
    ///
    /// On success the record holds the new solution point. On failure the
    /// last accepted point is left untouched.
    pub(super) fn step<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        settings: &Settings<'_>,
        work: &mut Workspace,
    ) -> Result<(), DaeFlag> {
        settings.weights(&self.vars, &mut work.weights);
        if self.step <= 0.0 {
            self.step = self.initial_step(settings, &work.weights);
        }
        self.order = self.order.min(settings.max_order);

        let mut error_fails = 0;
        let mut convergence_fails = 0;
        let mut constraint_fails = 0;

        loop {
            let proposed = settings.bound(self.step);
            if proposed <= 100.0 * EPS * self.time.abs().max(1.0) {
                return Err(if convergence_fails > 0 {
                    DaeFlag::ConvergenceFailure
                } else if constraint_fails > 0 {
                    DaeFlag::ConstraintFailure
                } else {
                    DaeFlag::ErrorTestFailure
                });
            }

            let (h, t_new, restricted) = match self.stop_time {
                Some(stop) if self.reaches(stop, proposed, settings) => {
                    (stop - self.time, stop, true)
                }
                _ => (proposed, self.time + proposed, false),
            };

            let k = self.order.min(self.history_len);
            let alpha = coefficients::corrector(t_new, &self.history_times, k);
            self.cj = alpha[0];
            self.predict(t_new, h, k, &alpha, work);

            match self.correct(residual, t_new, h, work) {
                Ok(()) => {}
                Err(Correction::Residual) => return Err(DaeFlag::ResidualFailure),
                Err(Correction::Diverged) => {
                    self.counters.convergence_failures += 1;
                    convergence_fails += 1;
                    if convergence_fails >= MAX_CONVERGENCE_FAILS {
                        return Err(DaeFlag::ConvergenceFailure);
                    }
                    log::trace!("corrector failed at t = {t_new}, cutting step {h}");
                    self.step = h * FAILURE_CUT;
                    continue;
                }
            }

            if !settings.constraints_hold(&work.y) {
                self.counters.constraint_failures += 1;
                constraint_fails += 1;
                if constraint_fails >= MAX_CONSTRAINT_FAILS {
                    return Err(DaeFlag::ConstraintFailure);
                }
                log::trace!("constraint violated at t = {t_new}, cutting step {h}");
                self.step = h * FAILURE_CUT;
                continue;
            }

            let error = wrms_difference(&work.y, &work.y_pred, &work.weights) / (k as f64 + 1.0);
            if error > 1.0 {
                self.counters.error_test_failures += 1;
                error_fails += 1;
                if error_fails >= MAX_ERROR_TEST_FAILS {
                    return Err(DaeFlag::ErrorTestFailure);
                }
                let factor = if error_fails == 1 {
                    (SAFETY * error.powf(-1.0 / (k as f64 + 1.0))).clamp(FAILURE_CUT, MAX_SHRINK)
                } else {
                    self.order = 1;
                    self.steps_at_order = 0;
                    FAILURE_CUT
                };
                log::trace!("error test failed at t = {t_new} (error {error:.3e})");
                self.step = h * factor;
                continue;
            }

            self.accept(t_new, h, k, error, restricted, settings, work);
            return Ok(());
        }
    }

    /// Whether a step of `proposed` should land on `stop` instead.
    ///
    /// A step that would leave a sliver under 1% of itself is stretched to
    /// the stop time, unless that breaks the user step bound.
    fn reaches(&self, stop: f64, proposed: f64, settings: &Settings<'_>) -> bool {
        let remaining = stop - self.time;
        if proposed >= remaining {
            return true;
        }
        let within_bound = settings.max_step <= 0.0 || remaining <= settings.max_step;
        1.01 * proposed >= remaining && within_bound
    }

    fn initial_step(&self, settings: &Settings<'_>, weights: &[f64]) -> f64 {
        let span = self.stop_time.map_or(1.0, |stop| (stop - self.time).abs());
        let mut h = if span > 0.0 { 0.001 * span } else { 1e-6 };

        let yp_norm = wrms(&self.ders, weights);
        if yp_norm * h > 0.5 {
            h = 0.5 / yp_norm;
        }
        settings.bound(h)
    }

    /// Fills the predicted solution and derivative for a step to `t_new`.
    fn predict(
        &self,
        t_new: f64,
        h: f64,
        order: usize,
        alpha: &[f64; MAX_ORDER + 1],
        work: &mut Workspace,
    ) {
        let degree = order.min(self.history_len - 1);
        if degree == 0 {
            for ((p, y), yp) in work.y_pred.iter_mut().zip(&self.vars).zip(&self.ders) {
                *p = y + h * yp;
            }
        } else {
            let weights = coefficients::extrapolation(t_new, &self.history_times, degree);
            work.y_pred.fill(0.0);
            for (point, w) in self.history[..=degree].iter().zip(weights) {
                for (p, y) in work.y_pred.iter_mut().zip(point) {
                    *p += w * y;
                }
            }
        }

        work.y.copy_from_slice(&work.y_pred);
        for (i, yp) in work.yp.iter_mut().enumerate() {
            *yp = alpha[0] * work.y[i]
                + (1..=order)
                    .map(|j| alpha[j] * self.history[j - 1][i])
                    .sum::<f64>();
        }
    }

    /// Modified Newton iteration on `F(t, y, a0·y + Σ aj·yj) = 0`.
    fn correct<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        t_new: f64,
        h: f64,
        work: &mut Workspace,
    ) -> Result<(), Correction> {
        let cj = self.cj;
        self.evaluate(residual, t_new, work)?;

        let refresh = self.force_jacobian
            || !self.linear.is_factorized()
            || self.jacobian_age >= MAX_JACOBIAN_AGE
            || (cj / self.cj_jacobian - 1.0).abs() > MAX_CJ_DRIFT;
        if refresh {
            self.update_jacobian(residual, t_new, h, work)?;
        }

        let scale = 2.0 / (1.0 + cj / self.cj_jacobian);
        let mut first_norm = 0.0;

        for m in 0..MAX_NEWTON_ITERS {
            self.counters.newton_iters += 1;

            for (d, r) in work.delta.iter_mut().zip(&work.res) {
                *d = -r;
            }
            if self.linear.solve(&mut work.delta).is_err() {
                self.force_jacobian = true;
                return Err(Correction::Diverged);
            }
            if (scale - 1.0).abs() > EPS {
                work.delta.iter_mut().for_each(|d| *d *= scale);
            }

            for ((y, yp), d) in work.y.iter_mut().zip(work.yp.iter_mut()).zip(&work.delta) {
                *y += d;
                *yp += cj * d;
            }

            let norm = wrms(&work.delta, &work.weights);
            if m == 0 {
                first_norm = norm;
            } else {
                let rate = (norm / first_norm).powf(1.0 / m as f64);
                if rate > MAX_NEWTON_RATE {
                    break;
                }
                self.newton_rate = rate / (1.0 - rate);
            }

            if self.newton_rate * norm <= EPS_NEWTON {
                return Ok(());
            }
            if m + 1 < MAX_NEWTON_ITERS {
                self.evaluate(residual, t_new, work)?;
            }
        }

        if !refresh {
            self.force_jacobian = true;
        }
        Err(Correction::Diverged)
    }

    fn evaluate<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        t: f64,
        work: &mut Workspace,
    ) -> Result<(), Correction> {
        self.counters.residual_evals += 1;
        if residual.eval(t, &work.y, &work.yp, &mut work.res).is_success() {
            Ok(())
        } else {
            Err(Correction::Residual)
        }
    }

    /// Builds `∂F/∂y + cj·∂F/∂y'` by forward differences and factorizes it.
    ///
    /// Expects `work.res` to hold the residual at `(work.y, work.yp)`.
    fn update_jacobian<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        t_new: f64,
        h: f64,
        work: &mut Workspace,
    ) -> Result<(), Correction> {
        let cj = self.cj;
        let n = work.y.len();
        let sqrt_eps = EPS.sqrt();
        self.counters.jacobian_evals += 1;

        for j in 0..n {
            let (y_j, yp_j) = (work.y[j], work.yp[j]);
            let scaled = (h * yp_j).abs();
            let mut inc = sqrt_eps * y_j.abs().max(scaled).max(1.0 / work.weights[j]);
            if h * yp_j < 0.0 {
                inc = -inc;
            }
            inc = (y_j + inc) - y_j;

            work.y[j] = y_j + inc;
            work.yp[j] = yp_j + cj * inc;
            self.counters.residual_evals += 1;
            let status = residual.eval(t_new, &work.y, &work.yp, &mut work.res_trial);
            work.y[j] = y_j;
            work.yp[j] = yp_j;
            if !status.is_success() {
                return Err(Correction::Residual);
            }

            let matrix = self.linear.matrix_mut();
            for i in 0..n {
                matrix[(i, j)] = (work.res_trial[i] - work.res[i]) / inc;
            }
        }

        self.cj_jacobian = cj;
        self.jacobian_age = 0;
        self.newton_rate = INITIAL_NEWTON_RATE;
        let factored = self.linear.factorize();
        self.force_jacobian = factored.is_err();
        log::trace!("iteration matrix rebuilt at t = {t_new} (cj = {cj:.3e})");
        factored.map_err(|_| Correction::Diverged)
    }

    #[allow(clippy::too_many_arguments)]
    fn accept(
        &mut self,
        t_new: f64,
        h: f64,
        order: usize,
        error: f64,
        restricted: bool,
        settings: &Settings<'_>,
        work: &Workspace,
    ) {
        self.history.rotate_right(1);
        self.history_times.rotate_right(1);
        self.history[0].copy_from_slice(&work.y);
        self.history_times[0] = t_new;
        self.history_len = (self.history_len + 1).min(MAX_ORDER + 1);

        self.vars.copy_from_slice(&work.y);
        self.ders.copy_from_slice(&work.yp);
        self.time = t_new;
        self.last_step = h;
        self.last_order = order;
        self.jacobian_age += 1;
        self.steps_at_order += 1;
        self.counters.steps += 1;

        if self.steps_at_order > order
            && order < settings.max_order
            && self.history_len >= order + 2
            && error < 0.5
        {
            self.order = order + 1;
            self.steps_at_order = 0;
        }

        let factor = if error > 0.0 {
            SAFETY * error.powf(-1.0 / (order as f64 + 1.0))
        } else {
            f64::INFINITY
        };
        self.step = if factor < 1.0 {
            h * factor.clamp(MIN_SHRINK, MAX_SHRINK)
        } else if restricted {
            self.step.max(h)
        } else if factor >= GROWTH {
            h * GROWTH
        } else {
            h
        };
        self.step = settings.bound(self.step);

        log::trace!(
            "step {} accepted: t = {t_new}, h = {h:.3e}, order {order}, error {error:.3e}",
            self.counters.steps
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::bridge::CallbackStatus;

    fn settings<'a>(atol: &'a [f64], differential: &'a [bool]) -> Settings<'a> {
        Settings {
            rtol: 1e-5,
            atol,
            max_step: 0.0,
            max_order: MAX_ORDER,
            constraints: None,
            differential,
        }
    }

    /// `y' = -y`
    fn decay(_t: f64, y: &[f64], yp: &[f64], res: &mut [f64]) -> CallbackStatus {
        res[0] = yp[0] + y[0];
        CallbackStatus::Success
    }

    #[test]
    fn wrms_of_unit_weights() {
        assert_relative_eq!(wrms(&[3.0, 4.0], &[1.0, 1.0]), (12.5_f64).sqrt());
        assert_relative_eq!(wrms(&[], &[]), 0.0);
    }

    #[test]
    fn steps_land_on_stop_time() {
        let atol = [1e-8];
        let differential = [true];
        let settings = settings(&atol, &differential);
        let mut record = IntegratorRecord::new(&[1.0], &[-1.0]);
        let mut work = Workspace::new(1);
        record.stop_time = Some(1.0);

        let mut residual = decay;
        while record.time < 1.0 {
            record.step(&mut residual, &settings, &mut work).unwrap();
        }

        assert_eq!(record.time, 1.0);
        assert_relative_eq!(record.vars[0], (-1.0_f64).exp(), max_relative = 1e-3);
        assert_relative_eq!(record.ders[0], -record.vars[0], max_relative = 1e-3);
        assert!(record.counters.steps > 1);
        assert!(record.order > 1);
    }

    #[test]
    fn residual_failure_leaves_point_untouched() {
        let atol = [1e-8];
        let differential = [true];
        let settings = settings(&atol, &differential);
        let mut record = IntegratorRecord::new(&[1.0], &[-1.0]);
        let mut work = Workspace::new(1);
        record.stop_time = Some(1.0);

        let mut failing = |_: f64, _: &[f64], _: &[f64], _: &mut [f64]| CallbackStatus::Failure;
        let result = record.step(&mut failing, &settings, &mut work);

        assert_eq!(result, Err(DaeFlag::ResidualFailure));
        assert_eq!(record.vars, vec![1.0]);
        assert_eq!(record.time, 0.0);
        assert_eq!(record.counters.steps, 0);
    }

    #[test]
    fn violated_constraint_exhausts_retries() {
        let atol = [1e-8];
        let differential = [true];
        let constraints = [Constraint::Negative];
        let settings = Settings {
            constraints: Some(&constraints),
            ..settings(&atol, &differential)
        };
        let mut record = IntegratorRecord::new(&[1.0], &[-1.0]);
        let mut work = Workspace::new(1);
        record.stop_time = Some(1.0);

        let mut residual = decay;
        let result = record.step(&mut residual, &settings, &mut work);

        assert_eq!(result, Err(DaeFlag::ConstraintFailure));
        assert!(record.counters.constraint_failures > 0);
    }
}
