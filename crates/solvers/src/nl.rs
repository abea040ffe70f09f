//! Nonlinear algebraic equation solver.
//!
//! [`NlSolver`] owns an [`NlModel`] and solves `F(u) = 0` (or `u = G(u)` for
//! [`Strategy::FixedPoint`]) with the strategy selected on the solver. Only
//! the variable vector is checkpointed.

mod anderson;
mod config;
mod fixed_point;
mod flag;
mod iteration;
mod newton;

use spindle_core::{Constraint, NlModel, NlSystem, Strategy, StrategyFamily};

use crate::{
    bridge::NlBridge,
    linear::DenseLinearSolver,
    report::{ErrorSlot, SolverError},
};

pub use config::{Config, ConfigError, FixedPointConfig, NewtonConfig, ParameterError};
pub use flag::{NlFlag, Outcome};

use fixed_point::{FixedPointWork, Map};
use iteration::Problem;
use newton::NewtonWork;

const MODULE: &str = "NLS";

/// Vectors that exist only while a model is attached.
#[derive(Debug)]
struct Attached {
    vars: Vec<f64>,
    saved: Vec<f64>,
    uscale: Vec<f64>,
    fscale: Vec<f64>,
    constraints: Option<Vec<Constraint>>,
    linear: DenseLinearSolver,
    newton: NewtonWork,
    fixed_point: FixedPointWork,
}

impl Attached {
    fn new<S: NlSystem>(model: &NlModel<S>) -> Self {
        let n = model.variables_number();
        let vars = model.init_values();
        let constraints = model
            .constraints_defined()
            .then(|| model.variables().iter().map(|v| v.constraint).collect());

        Self {
            saved: vars.clone(),
            vars,
            uscale: model.variable_scales(),
            fscale: model.function_scales(),
            constraints,
            linear: DenseLinearSolver::new(n),
            newton: NewtonWork::new(n),
            fixed_point: FixedPointWork::new(n),
        }
    }
}

/// A nonlinear solver bound to one unit model.
///
/// # Example
///
/// ```
/// use spindle_core::{NlFn, NlModel, Strategy};
/// use spindle_solvers::nl::NlSolver;
///
/// let system = NlFn::unpublished(|_: Strategy, u: &[f64], f: &mut [f64]| {
///     f[0] = u[0] * u[0] - 4.0;
///     Ok::<(), std::convert::Infallible>(())
/// });
/// let mut model = NlModel::new(system);
/// model.add_unscaled_variable(1.0);
///
/// let mut solver = NlSolver::new();
/// solver.set_model(model).unwrap();
/// solver.calculate(0.0).unwrap();
///
/// assert!((solver.vars()[0] - 2.0).abs() < 1e-6);
/// ```
#[derive(Debug)]
pub struct NlSolver<S> {
    config: Config,
    strategy: Strategy,
    model: Option<NlModel<S>>,
    attached: Option<Attached>,
    iterations: Option<usize>,
    errors: ErrorSlot,
}

impl<S: NlSystem> Default for NlSolver<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NlSystem> NlSolver<S> {
    /// Creates an unattached Newton solver with the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategy(Strategy::default())
    }

    #[must_use]
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            config: Config::default(),
            strategy,
            model: None,
            attached: None,
            iterations: None,
            errors: ErrorSlot::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Selects the strategy, pushing it into the attached model if any.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        if let Some(model) = self.model.as_mut() {
            model.set_strategy(strategy);
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn max_iter(&self) -> usize {
        self.config.max_iter()
    }

    /// Sets the iteration limit of one solve.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iter` is zero.
    pub fn set_max_iter(&mut self, max_iter: usize) -> Result<(), ParameterError> {
        self.config.set_max_iter(max_iter)?;
        Ok(())
    }

    /// Sets the Jacobian refresh limits of the Newton family.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::StrategyMismatch`] if the active strategy
    /// is a fixed-point one, or an error for a zero limit. Nothing changes
    /// on error.
    pub fn set_newton_parameters(
        &mut self,
        max_setup_calls: usize,
        max_sub_setup_calls: usize,
    ) -> Result<(), ParameterError> {
        self.require_family(StrategyFamily::Newton)?;
        let newton = NewtonConfig::new(max_setup_calls, max_sub_setup_calls)?;
        self.config.set_newton(newton);
        Ok(())
    }

    /// Sets Anderson acceleration and damping of the fixed-point family.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::StrategyMismatch`] if the active strategy
    /// is a Newton one, or an error for a damping outside `(0, 1]`. Nothing
    /// changes on error.
    pub fn set_fixed_point_parameters(
        &mut self,
        anderson_depth: usize,
        anderson_damping: f64,
        damping: f64,
    ) -> Result<(), ParameterError> {
        self.require_family(StrategyFamily::FixedPoint)?;
        let fixed_point = FixedPointConfig::new(anderson_depth, anderson_damping, damping)?;
        self.config.set_fixed_point(fixed_point);
        Ok(())
    }

    /// Attaches `model`, pushing the active strategy into it.
    ///
    /// # Errors
    ///
    /// Returns [`NlFlag::IllegalInput`] if the model has no variables. The
    /// model is kept but the solver stays unattached.
    pub fn set_model(&mut self, mut model: NlModel<S>) -> Result<(), SolverError> {
        self.errors.clear();
        self.attached = None;
        self.iterations = None;

        model.set_strategy(self.strategy);
        let n = model.variables_number();
        let attached = (n > 0).then(|| Attached::new(&model));
        self.model = Some(model);

        let Some(attached) = attached else {
            return self.errors.fail(error(
                NlFlag::IllegalInput,
                "set_model",
                "the model has no variables",
            ));
        };

        log::debug!(
            "attached NL model with {n} variables ({:?}, constraints: {})",
            self.strategy,
            attached.constraints.is_some()
        );
        self.attached = Some(attached);
        Ok(())
    }

    #[must_use]
    pub fn model(&self) -> Option<&NlModel<S>> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut NlModel<S>> {
        self.model.as_mut()
    }

    /// Detaches and returns the model.
    pub fn take_model(&mut self) -> Option<NlModel<S>> {
        self.attached = None;
        self.model.take()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Solves from the current iterate and publishes the solution at `time`.
    ///
    /// # Errors
    ///
    /// Returns the failure flag of the solve; nothing is published then and
    /// the variables stay where the iteration left them.
    pub fn calculate(&mut self, time: f64) -> Result<Outcome, SolverError> {
        const FUNCTION: &str = "solve";

        let (Some(model), Some(attached)) = (self.model.as_mut(), self.attached.as_mut()) else {
            return self
                .errors
                .fail(error(NlFlag::NotAttached, FUNCTION, "no model is attached"));
        };

        let Attached {
            vars,
            uscale,
            fscale,
            constraints,
            linear,
            newton: newton_work,
            fixed_point: fixed_point_work,
            ..
        } = attached;
        let problem = Problem {
            uscale: uscale.as_slice(),
            fscale: fscale.as_slice(),
            constraints: constraints.as_deref(),
            config: &self.config,
        };

        let mut bridge = NlBridge::new(model);
        let solve = match self.strategy {
            Strategy::Newton => {
                newton::solve(&mut bridge, &problem, linear, vars, false, newton_work)
            }
            Strategy::Linesearch => {
                newton::solve(&mut bridge, &problem, linear, vars, true, newton_work)
            }
            Strategy::FixedPoint => fixed_point::solve(
                Map::FixedPoint,
                &mut bridge,
                &problem,
                linear,
                vars,
                fixed_point_work,
            ),
            Strategy::Picard => fixed_point::solve(
                Map::Picard,
                &mut bridge,
                &problem,
                linear,
                vars,
                fixed_point_work,
            ),
        };
        self.iterations = Some(solve.iterations);

        match solve.result {
            Ok(outcome) => {
                log::debug!(
                    "{:?} solve finished after {} iterations ({outcome:?})",
                    self.strategy,
                    solve.iterations
                );
                model.publish_results(time, vars);
                Ok(outcome)
            }
            Err(flag) => self.errors.fail(error(
                flag,
                FUNCTION,
                format!("{flag} after {} iterations", solve.iterations),
            )),
        }
    }

    /// Copies the variable vector into the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`NlFlag::NotAttached`] if no model is attached.
    pub fn save_state(&mut self) -> Result<(), SolverError> {
        let attached = self.ensure_attached("save_state")?;
        attached.saved.copy_from_slice(&attached.vars);
        Ok(())
    }

    /// Restores the variable vector from the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`NlFlag::NotAttached`] if no model is attached.
    pub fn load_state(&mut self) -> Result<(), SolverError> {
        let attached = self.ensure_attached("load_state")?;
        attached.vars.copy_from_slice(&attached.saved);
        Ok(())
    }

    /// Returns the current iterate, empty if unattached.
    #[must_use]
    pub fn vars(&self) -> &[f64] {
        self.attached
            .as_ref()
            .map(|a| a.vars.as_slice())
            .unwrap_or_default()
    }

    /// Returns the iteration count of the last solve, or zero if none ran.
    #[must_use]
    pub fn solver_iter(&self) -> usize {
        self.iterations.unwrap_or(0)
    }

    /// Returns the last failure as text, or an empty string.
    #[must_use]
    pub fn error(&self) -> String {
        self.errors.message()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&SolverError> {
        self.errors.last()
    }

    fn require_family(&self, family: StrategyFamily) -> Result<(), ParameterError> {
        if self.strategy.family() == family {
            Ok(())
        } else {
            Err(ParameterError::StrategyMismatch {
                strategy: self.strategy,
                family,
            })
        }
    }

    fn ensure_attached(&mut self, function: &'static str) -> Result<&mut Attached, SolverError> {
        match self.attached.as_mut() {
            Some(attached) if self.model.is_some() => Ok(attached),
            _ => self
                .errors
                .fail(error(NlFlag::NotAttached, function, "no model is attached")),
        }
    }
}

fn error(flag: NlFlag, function: &'static str, message: impl Into<String>) -> SolverError {
    SolverError::new(flag.code(), MODULE, function, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;

    /// `x² − 4`, or `G(x) = x − (x² − 4)/4` for fixed-point strategies.
    #[derive(Debug, Default)]
    struct Root {
        published: Vec<(f64, f64)>,
        strategies: Vec<Strategy>,
    }

    impl NlSystem for Root {
        type Error = Infallible;

        fn functions(
            &mut self,
            strategy: Strategy,
            vars: &[f64],
            func: &mut [f64],
        ) -> Result<(), Infallible> {
            self.strategies.push(strategy);
            let f = vars[0] * vars[0] - 4.0;
            func[0] = if strategy == Strategy::FixedPoint {
                vars[0] - f / 4.0
            } else {
                f
            };
            Ok(())
        }

        fn publish(&mut self, time: f64, vars: &[f64]) {
            self.published.push((time, vars[0]));
        }
    }

    fn attached(strategy: Strategy) -> NlSolver<Root> {
        let mut model = NlModel::new(Root::default());
        model.add_unscaled_variable(1.8);
        let mut solver = NlSolver::with_strategy(strategy);
        solver.set_model(model).unwrap();
        solver
    }

    #[test]
    fn every_strategy_finds_the_root() {
        for strategy in [
            Strategy::Newton,
            Strategy::Linesearch,
            Strategy::FixedPoint,
            Strategy::Picard,
        ] {
            let mut solver = attached(strategy);
            solver.calculate(2.5).unwrap();

            assert_relative_eq!(solver.vars()[0], 2.0, epsilon = 1e-5);
            assert!(solver.solver_iter() > 0, "{strategy:?}");
            assert!(solver.error().is_empty());

            let system = solver.model().unwrap().system();
            assert!(system.strategies.iter().all(|&s| s == strategy));
            assert_eq!(system.published.len(), 1);
            assert_relative_eq!(system.published[0].0, 2.5);
        }
    }

    #[test]
    fn no_solve_means_zero_iterations() {
        let solver = attached(Strategy::Newton);
        assert_eq!(solver.solver_iter(), 0);
    }

    #[test]
    fn wrong_family_setters_change_nothing() {
        let mut solver = attached(Strategy::Newton);
        let before = *solver.config();

        let result = solver.set_fixed_point_parameters(3, 0.5, 0.5);

        assert!(matches!(
            result,
            Err(ParameterError::StrategyMismatch {
                strategy: Strategy::Newton,
                family: StrategyFamily::FixedPoint,
            })
        ));
        assert_eq!(*solver.config(), before);

        let mut solver = attached(Strategy::Picard);
        assert!(solver.set_newton_parameters(4, 2).is_err());
        solver.set_fixed_point_parameters(2, 0.8, 1.0).unwrap();
        assert_eq!(solver.config().fixed_point().anderson_depth(), 2);
    }

    #[test]
    fn set_strategy_reaches_the_model() {
        let mut solver = attached(Strategy::Newton);
        solver.set_strategy(Strategy::Linesearch);

        assert_eq!(solver.model().unwrap().strategy(), Strategy::Linesearch);
    }

    #[test]
    fn save_and_load_round_trip_vars() {
        let mut solver = attached(Strategy::Newton);
        solver.save_state().unwrap();
        solver.calculate(0.0).unwrap();
        assert_relative_eq!(solver.vars()[0], 2.0, epsilon = 1e-6);

        solver.load_state().unwrap();
        assert_eq!(solver.vars(), &[1.8]);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let mut solver = attached(Strategy::FixedPoint);
        solver.set_max_iter(1).unwrap();

        let result = solver.calculate(1.0);

        assert_eq!(result.unwrap_err().code, -6);
        assert!(solver.error().starts_with("[NLS ERROR] in solve"));
        assert!(solver.model().unwrap().system().published.is_empty());
    }

    #[test]
    fn unattached_solver_fails() {
        let mut solver = NlSolver::<Root>::new();
        assert_eq!(solver.calculate(0.0).unwrap_err().code, -30);
        assert_eq!(solver.load_state().unwrap_err().code, -30);
    }
}
