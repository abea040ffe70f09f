//! Fixed-point and Picard iterations.
//!
//! Both iterate `u ← G(u)`. For a fixed-point solve the system returns
//! `G(u)` directly. For Picard `G(u) = u − L⁻¹F(u)`, where `L` is the
//! Jacobian of `F` at the initial guess, kept frozen for the whole solve.

use crate::{bridge::FunctionFn, linear::DenseLinearSolver};

use super::{
    anderson::Anderson,
    flag::{NlFlag, Outcome},
    iteration::{Problem, Solve, evaluate, function_tolerance, update_jacobian},
};

/// Scratch vectors for [`solve`].
#[derive(Debug, Clone)]
pub(super) struct FixedPointWork {
    g: Vec<f64>,
    f: Vec<f64>,
    func: Vec<f64>,
    next: Vec<f64>,
}

impl FixedPointWork {
    pub(super) fn new(n: usize) -> Self {
        Self {
            g: vec![0.0; n],
            f: vec![0.0; n],
            func: vec![0.0; n],
            next: vec![0.0; n],
        }
    }
}

/// Which map is being iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Map {
    FixedPoint,
    Picard,
}

/// Evaluates `g = G(u)` and `f = G(u) − u`, returning the convergence norm.
///
/// For Picard the norm is taken on `F(u)`, for a fixed-point map on `f`.
fn apply_map<F: FunctionFn>(
    map: Map,
    function: &mut F,
    problem: &Problem<'_>,
    linear: &DenseLinearSolver,
    vars: &[f64],
    work: &mut FixedPointWork,
) -> Result<f64, NlFlag> {
    match map {
        Map::FixedPoint => {
            evaluate(function, vars, &mut work.g)?;
            for ((f, g), u) in work.f.iter_mut().zip(&work.g).zip(vars) {
                *f = g - u;
            }
            Ok(problem.function_norm(&work.f))
        }
        Map::Picard => {
            evaluate(function, vars, &mut work.func)?;
            for (f, func) in work.f.iter_mut().zip(&work.func) {
                *f = -func;
            }
            linear
                .solve(&mut work.f)
                .map_err(|_| NlFlag::LinearSolveFailure)?;
            for ((g, f), u) in work.g.iter_mut().zip(&work.f).zip(vars) {
                *g = u + f;
            }
            Ok(problem.function_norm(&work.func))
        }
    }
}

/// Iterates `map` from the iterate in `vars`.
pub(super) fn solve<F: FunctionFn>(
    map: Map,
    function: &mut F,
    problem: &Problem<'_>,
    linear: &mut DenseLinearSolver,
    vars: &mut [f64],
    work: &mut FixedPointWork,
) -> Solve {
    let fnorm_tol = function_tolerance();
    let settings = problem.config.fixed_point();
    let mut anderson = Anderson::new(settings.anderson_depth(), settings.anderson_damping());

    if map == Map::Picard {
        if let Err(flag) = evaluate(function, vars, &mut work.func) {
            return Solve::failed(0, flag);
        }
        if let Err(flag) = update_jacobian(
            function,
            linear,
            vars,
            &work.func,
            problem.uscale,
            &mut work.next,
        ) {
            return Solve::failed(0, flag);
        }
    }

    let mut norm = match apply_map(map, function, problem, linear, vars, work) {
        Ok(norm) => norm,
        Err(flag) => return Solve::failed(0, flag),
    };
    if norm <= 0.01 * fnorm_tol {
        return Solve::done(0, Outcome::InitialGuessOk);
    }

    for iteration in 1..=problem.config.max_iter() {
        if anderson.is_enabled() {
            anderson.next(&work.g, &work.f, &mut work.next);
        } else {
            for ((x, u), f) in work.next.iter_mut().zip(vars.iter()).zip(&work.f) {
                *x = u + settings.damping() * f;
            }
        }

        // Reuse `f` as the step so constraints can shorten it.
        for ((d, x), u) in work.f.iter_mut().zip(&work.next).zip(vars.iter()) {
            *d = x - u;
        }
        problem.limit_step(vars, &mut work.f);
        for (u, d) in vars.iter_mut().zip(&work.f) {
            *u += d;
        }

        norm = match apply_map(map, function, problem, linear, vars, work) {
            Ok(norm) => norm,
            Err(flag) => return Solve::failed(iteration, flag),
        };
        log::trace!("{map:?} iteration {iteration}: norm = {norm:.3e}");

        if norm <= fnorm_tol {
            return Solve::done(iteration, Outcome::Success);
        }
    }

    Solve::failed(problem.config.max_iter(), NlFlag::MaxIterations)
}
