//! Consistent initial conditions.
//!
//! Differential values stay fixed while the derivatives of differential
//! variables and the values of algebraic variables are adjusted until
//! `F(t0, y, y') = 0`.

use crate::bridge::ResidualFn;

use super::{
    flag::DaeFlag,
    integrator::{Settings, Workspace, wrms},
    record::IntegratorRecord,
};

const MAX_ITERS: usize = 20;

/// Newton steps below this weighted norm count as converged.
const TOLERANCE: f64 = 0.0033;

const ARMIJO: f64 = 1e-4;
const MIN_LAMBDA: f64 = 1e-5;

impl IntegratorRecord {
    /// Replaces the algebraic values and differential derivatives with a
    /// consistent set and restarts the history from it.
    ///
    /// Only legal before the first internal step.
    pub(super) fn initial_conditions<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        settings: &Settings<'_>,
        work: &mut Workspace,
    ) -> Result<(), DaeFlag> {
        if self.counters.steps > 0 {
            return Err(DaeFlag::IllegalInput);
        }

        let t = self.time;
        let n = self.vars.len();
        settings.weights(&self.vars, &mut work.weights);
        work.y.copy_from_slice(&self.vars);
        work.yp.copy_from_slice(&self.ders);

        self.evaluate_ic(residual, t, work)?;
        let mut merit = half_square(&work.res);

        let mut converged = merit == 0.0;
        for _ in 0..MAX_ITERS {
            if converged {
                break;
            }

            self.build_ic_jacobian(residual, t, settings, work)?;
            if self.linear.factorize().is_err() {
                return Err(DaeFlag::InitialConditionFailure);
            }
            for (d, r) in work.delta.iter_mut().zip(&work.res) {
                *d = -r;
            }
            if self.linear.solve(&mut work.delta).is_err() {
                return Err(DaeFlag::InitialConditionFailure);
            }
            let step_norm = wrms(&work.delta, &work.weights);
            if step_norm <= TOLERANCE {
                apply(settings.differential, &mut work.y, &mut work.yp, &work.delta, 1.0);
                converged = true;
                break;
            }

            // Backtrack along the Newton direction until the merit drops.
            let mut lambda = 1.0;
            loop {
                apply(settings.differential, &mut work.y, &mut work.yp, &work.delta, lambda);
                self.counters.residual_evals += 1;
                let status = residual.eval(t, &work.y, &work.yp, &mut work.res_trial);
                if !status.is_success() {
                    return Err(DaeFlag::ResidualFailure);
                }

                let trial = half_square(&work.res_trial);
                if trial <= (1.0 - 2.0 * ARMIJO * lambda) * merit {
                    merit = trial;
                    work.res.copy_from_slice(&work.res_trial);
                    break;
                }

                apply(settings.differential, &mut work.y, &mut work.yp, &work.delta, -lambda);
                lambda *= 0.5;
                if lambda < MIN_LAMBDA {
                    return Err(DaeFlag::InitialConditionFailure);
                }
            }

            converged = lambda * step_norm <= TOLERANCE || merit == 0.0;
        }

        if !converged || !settings.constraints_hold(&work.y) {
            return Err(DaeFlag::InitialConditionFailure);
        }

        self.vars.copy_from_slice(&work.y);
        self.ders.copy_from_slice(&work.yp);
        self.restart_history();
        self.force_jacobian = true;
        log::debug!("consistent initial conditions found for {n} variables at t = {t}");
        Ok(())
    }

    fn evaluate_ic<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        t: f64,
        work: &mut Workspace,
    ) -> Result<(), DaeFlag> {
        self.counters.residual_evals += 1;
        if residual.eval(t, &work.y, &work.yp, &mut work.res).is_success() {
            Ok(())
        } else {
            Err(DaeFlag::ResidualFailure)
        }
    }

    /// Forward-difference Jacobian of `F` with respect to the unknowns.
    fn build_ic_jacobian<R: ResidualFn>(
        &mut self,
        residual: &mut R,
        t: f64,
        settings: &Settings<'_>,
        work: &mut Workspace,
    ) -> Result<(), DaeFlag> {
        let n = work.y.len();
        let sqrt_eps = f64::EPSILON.sqrt();
        self.counters.jacobian_evals += 1;

        for j in 0..n {
            let unknown = if settings.differential[j] {
                &mut work.yp[j]
            } else {
                &mut work.y[j]
            };
            let saved = *unknown;
            let mut inc = sqrt_eps * saved.abs().max(1.0 / work.weights[j]);
            inc = (saved + inc) - saved;
            *unknown = saved + inc;

            self.counters.residual_evals += 1;
            let status = residual.eval(t, &work.y, &work.yp, &mut work.res_trial);

            if settings.differential[j] {
                work.yp[j] = saved;
            } else {
                work.y[j] = saved;
            }
            if !status.is_success() {
                return Err(DaeFlag::ResidualFailure);
            }

            let matrix = self.linear.matrix_mut();
            for i in 0..n {
                matrix[(i, j)] = (work.res_trial[i] - work.res[i]) / inc;
            }
        }
        Ok(())
    }
}

fn half_square(values: &[f64]) -> f64 {
    0.5 * values.iter().map(|v| v * v).sum::<f64>()
}

/// Moves the unknowns by `lambda·delta`.
fn apply(differential: &[bool], y: &mut [f64], yp: &mut [f64], delta: &[f64], lambda: f64) {
    for (i, (&is_differential, d)) in differential.iter().zip(delta).enumerate() {
        if is_differential {
            yp[i] += lambda * d;
        } else {
            y[i] += lambda * d;
        }
    }
}
