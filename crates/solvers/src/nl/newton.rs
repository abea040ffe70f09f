//! Modified Newton iteration, with or without a backtracking line search.

use crate::{bridge::FunctionFn, linear::DenseLinearSolver};

use super::{
    flag::{NlFlag, Outcome},
    iteration::{Problem, Solve, evaluate, function_tolerance, scaled_l2, step_tolerance, update_jacobian},
};

/// Consecutive maximum-length steps tolerated before giving up.
const MAX_LONG_STEPS: usize = 5;

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO: f64 = 1e-4;

/// A checkpoint refreshes the Jacobian unless the residual dropped this much.
const CHECKPOINT_DECREASE: f64 = 0.9;

/// Scratch vectors for [`solve`].
#[derive(Debug, Clone)]
pub(super) struct NewtonWork {
    func: Vec<f64>,
    trial: Vec<f64>,
    func_trial: Vec<f64>,
    step: Vec<f64>,
}

impl NewtonWork {
    pub(super) fn new(n: usize) -> Self {
        Self {
            func: vec![0.0; n],
            trial: vec![0.0; n],
            func_trial: vec![0.0; n],
            step: vec![0.0; n],
        }
    }
}

/// Solves `F(u) = 0` from the iterate in `vars`.
///
/// The Jacobian is rebuilt every `max_setup_calls` iterations, at every
/// `max_sub_setup_calls` checkpoint where the residual did not drop by 10%,
/// and whenever a step with a stale Jacobian fails to reduce the residual.
pub(super) fn solve<F: FunctionFn>(
    function: &mut F,
    problem: &Problem<'_>,
    linear: &mut DenseLinearSolver,
    vars: &mut [f64],
    line_search: bool,
    work: &mut NewtonWork,
) -> Solve {
    let fnorm_tol = function_tolerance();
    let step_tol = step_tolerance();
    let newton = problem.config.newton();

    if let Err(flag) = evaluate(function, vars, &mut work.func) {
        return Solve::failed(0, flag);
    }
    if problem.function_norm(&work.func) <= 0.01 * fnorm_tol {
        return Solve::done(0, Outcome::InitialGuessOk);
    }

    let max_step = 1000.0 * scaled_l2(vars, problem.uscale).max(1.0);
    let mut fnorm = scaled_l2(&work.func, problem.fscale);

    let mut iterations = 0;
    let mut need_setup = true;
    let mut fresh = false;
    let mut setup_at = 0;
    let mut checkpoint_fnorm = fnorm;
    let mut long_steps = 0;

    loop {
        if iterations >= problem.config.max_iter() {
            return Solve::failed(iterations, NlFlag::MaxIterations);
        }

        if need_setup {
            if let Err(flag) = update_jacobian(
                function,
                linear,
                vars,
                &work.func,
                problem.uscale,
                &mut work.func_trial,
            ) {
                return Solve::failed(iterations, flag);
            }
            need_setup = false;
            fresh = true;
            setup_at = iterations;
            checkpoint_fnorm = fnorm;
        }

        iterations += 1;

        for (d, f) in work.step.iter_mut().zip(&work.func) {
            *d = -f;
        }
        if linear.solve(&mut work.step).is_err() {
            if fresh {
                return Solve::failed(iterations, NlFlag::LinearSolveFailure);
            }
            need_setup = true;
            continue;
        }

        let length = scaled_l2(&work.step, problem.uscale);
        if length > max_step {
            work.step.iter_mut().for_each(|d| *d *= max_step / length);
            long_steps += 1;
            if long_steps >= MAX_LONG_STEPS {
                return Solve::failed(iterations, NlFlag::MaxNewtonStep5x);
            }
        } else {
            long_steps = 0;
        }
        problem.limit_step(vars, &mut work.step);

        let lambda = if line_search {
            match search(function, problem, vars, fnorm, step_tol, work) {
                Ok(lambda) => lambda,
                Err(NlFlag::LinesearchNonConvergence) if !fresh => {
                    need_setup = true;
                    continue;
                }
                Err(flag) => return Solve::failed(iterations, flag),
            }
        } else {
            if let Err(flag) = try_step(function, vars, 1.0, work) {
                return Solve::failed(iterations, flag);
            }
            1.0
        };

        let trial_fnorm = scaled_l2(&work.func_trial, problem.fscale);
        if !line_search && trial_fnorm > fnorm && !fresh {
            log::trace!("residual rose with a stale Jacobian, rebuilding");
            need_setup = true;
            continue;
        }

        vars.copy_from_slice(&work.trial);
        std::mem::swap(&mut work.func, &mut work.func_trial);
        fnorm = trial_fnorm;
        fresh = false;

        log::trace!("newton iteration {iterations}: |F| = {fnorm:.3e}, lambda = {lambda}");

        if problem.function_norm(&work.func) <= fnorm_tol {
            return Solve::done(iterations, Outcome::Success);
        }
        if lambda * problem.step_norm(&work.step) <= step_tol {
            return Solve::done(iterations, Outcome::StepBelowTolerance);
        }

        let since_setup = iterations - setup_at;
        if since_setup >= newton.max_setup_calls() {
            need_setup = true;
        } else if since_setup % newton.max_sub_setup_calls() == 0 {
            if fnorm > CHECKPOINT_DECREASE * checkpoint_fnorm {
                need_setup = true;
            }
            checkpoint_fnorm = fnorm;
        }
    }
}

/// Sets `work.trial = vars + lambda·step` and evaluates it.
fn try_step<F: FunctionFn>(
    function: &mut F,
    vars: &[f64],
    lambda: f64,
    work: &mut NewtonWork,
) -> Result<(), NlFlag> {
    for ((t, u), d) in work.trial.iter_mut().zip(vars).zip(&work.step) {
        *t = u + lambda * d;
    }
    evaluate(function, &work.trial, &mut work.func_trial)
}

/// Backtracks along `work.step` until the Armijo condition holds.
///
/// Returns the accepted step fraction.
fn search<F: FunctionFn>(
    function: &mut F,
    problem: &Problem<'_>,
    vars: &[f64],
    fnorm: f64,
    step_tol: f64,
    work: &mut NewtonWork,
) -> Result<f64, NlFlag> {
    let merit = 0.5 * fnorm * fnorm;
    let slope = -fnorm * fnorm;
    let step_norm = problem.step_norm(&work.step);
    let mut lambda = 1.0;

    loop {
        try_step(function, vars, lambda, work)?;
        let trial = scaled_l2(&work.func_trial, problem.fscale);
        if 0.5 * trial * trial <= merit + ARMIJO * lambda * slope {
            return Ok(lambda);
        }

        // Minimizer of the quadratic through merit, slope, and the trial.
        let denominator = 2.0 * (0.5 * trial * trial - merit - lambda * slope);
        let quadratic = if denominator > 0.0 {
            -slope * lambda * lambda / denominator
        } else {
            0.5 * lambda
        };
        lambda = quadratic.clamp(0.1 * lambda, 0.5 * lambda);

        if lambda * step_norm <= step_tol {
            return Err(NlFlag::LinesearchNonConvergence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::{bridge::CallbackStatus, nl::config::Config};

    fn problem(config: &Config) -> Problem<'_> {
        Problem {
            uscale: &[1.0],
            fscale: &[1.0],
            constraints: None,
            config,
        }
    }

    fn square_minus_four(u: &[f64], f: &mut [f64]) -> CallbackStatus {
        f[0] = u[0] * u[0] - 4.0;
        CallbackStatus::Success
    }

    #[test]
    fn finds_square_root() {
        let config = Config::default();
        let mut linear = DenseLinearSolver::new(1);
        let mut work = NewtonWork::new(1);
        let mut vars = [1.0];

        let solve = solve(
            &mut square_minus_four,
            &problem(&config),
            &mut linear,
            &mut vars,
            false,
            &mut work,
        );

        assert!(solve.result.is_ok());
        assert!(solve.iterations > 0);
        assert_relative_eq!(vars[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn line_search_finds_square_root() {
        let config = Config::default();
        let mut linear = DenseLinearSolver::new(1);
        let mut work = NewtonWork::new(1);
        let mut vars = [1.0];

        let solve = solve(
            &mut square_minus_four,
            &problem(&config),
            &mut linear,
            &mut vars,
            true,
            &mut work,
        );

        assert!(solve.result.is_ok());
        assert_relative_eq!(vars[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn exact_guess_skips_iteration() {
        let config = Config::default();
        let mut linear = DenseLinearSolver::new(1);
        let mut work = NewtonWork::new(1);
        let mut vars = [2.0];

        let solve = solve(
            &mut square_minus_four,
            &problem(&config),
            &mut linear,
            &mut vars,
            false,
            &mut work,
        );

        assert_eq!(solve, Solve::done(0, Outcome::InitialGuessOk));
    }

    #[test]
    fn singular_jacobian_fails() {
        let config = Config::default();
        let mut linear = DenseLinearSolver::new(1);
        let mut work = NewtonWork::new(1);
        let mut vars = [1.0];
        let mut constant = |_: &[f64], f: &mut [f64]| {
            f[0] = 1.0;
            CallbackStatus::Success
        };

        let solve = solve(&mut constant, &problem(&config), &mut linear, &mut vars, false, &mut work);

        assert_eq!(solve.result, Err(NlFlag::LinearSolveFailure));
    }
}
