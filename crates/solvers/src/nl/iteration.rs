//! Pieces shared by every nonlinear strategy.

use spindle_core::Constraint;

use crate::{bridge::FunctionFn, linear::DenseLinearSolver};

use super::{
    config::Config,
    flag::{NlFlag, Outcome},
};

/// Function-norm tolerance, `ε^(1/3)`.
pub(super) fn function_tolerance() -> f64 {
    f64::EPSILON.cbrt()
}

/// Scaled-step tolerance, `ε^(2/3)`.
pub(super) fn step_tolerance() -> f64 {
    f64::EPSILON.powf(2.0 / 3.0)
}

/// The fixed inputs of one solve.
pub(super) struct Problem<'a> {
    pub(super) uscale: &'a [f64],
    pub(super) fscale: &'a [f64],
    pub(super) constraints: Option<&'a [Constraint]>,
    pub(super) config: &'a Config,
}

impl Problem<'_> {
    /// `‖fscale·f‖∞`
    pub(super) fn function_norm(&self, func: &[f64]) -> f64 {
        scaled_max(func, self.fscale)
    }

    /// `‖uscale·Δu‖∞`
    pub(super) fn step_norm(&self, step: &[f64]) -> f64 {
        scaled_max(step, self.uscale)
    }

    /// Shortens `step` so every constrained variable stays admissible.
    pub(super) fn limit_step(&self, vars: &[f64], step: &mut [f64]) {
        let Some(constraints) = self.constraints else {
            return;
        };
        let fraction = constraints
            .iter()
            .zip(vars)
            .zip(step.iter())
            .map(|((c, &u), &d)| c.admissible_fraction(u, d))
            .fold(1.0, f64::min);
        if fraction < 1.0 {
            step.iter_mut().for_each(|d| *d *= fraction);
        }
    }
}

fn scaled_max(values: &[f64], scales: &[f64]) -> f64 {
    values
        .iter()
        .zip(scales)
        .map(|(v, s)| (v * s).abs())
        .fold(0.0, f64::max)
}

pub(super) fn scaled_l2(values: &[f64], scales: &[f64]) -> f64 {
    values
        .iter()
        .zip(scales)
        .map(|(v, s)| (v * s).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// What a strategy hands back to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Solve {
    pub(super) iterations: usize,
    pub(super) result: Result<Outcome, NlFlag>,
}

impl Solve {
    pub(super) fn done(iterations: usize, outcome: Outcome) -> Self {
        Self {
            iterations,
            result: Ok(outcome),
        }
    }

    pub(super) fn failed(iterations: usize, flag: NlFlag) -> Self {
        Self {
            iterations,
            result: Err(flag),
        }
    }
}

/// Evaluates `func = F(vars)`, mapping a callback failure to a flag.
pub(super) fn evaluate<F: FunctionFn>(
    function: &mut F,
    vars: &[f64],
    func: &mut [f64],
) -> Result<(), NlFlag> {
    if function.eval(vars, func).is_success() {
        Ok(())
    } else {
        Err(NlFlag::FunctionFailure)
    }
}

/// Builds the forward-difference Jacobian of `F` at `vars` and factorizes it.
///
/// `func` must hold `F(vars)`. `vars` is restored before returning.
pub(super) fn update_jacobian<F: FunctionFn>(
    function: &mut F,
    linear: &mut DenseLinearSolver,
    vars: &mut [f64],
    func: &[f64],
    uscale: &[f64],
    scratch: &mut [f64],
) -> Result<(), NlFlag> {
    let n = vars.len();
    let sqrt_eps = f64::EPSILON.sqrt();

    for j in 0..n {
        let saved = vars[j];
        let mut inc = sqrt_eps * saved.abs().max(1.0 / uscale[j]);
        inc = (saved + inc) - saved;

        vars[j] = saved + inc;
        let status = evaluate(function, vars, scratch);
        vars[j] = saved;
        status?;

        let matrix = linear.matrix_mut();
        for i in 0..n {
            matrix[(i, j)] = (scratch[i] - func[i]) / inc;
        }
    }

    linear.factorize().map_err(|_| NlFlag::LinearSolveFailure)
}
