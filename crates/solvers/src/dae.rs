//! DAE solver with stop-time control and full-state checkpoints.
//!
//! [`DaeSolver`] owns a [`DaeModel`] and integrates `F(t, y, y') = 0` with a
//! variable-order, variable-step BDF method. The whole integrator record is
//! a plain value: [`DaeSolver::save_state`] copies it aside and
//! [`DaeSolver::load_state`] copies it back, so a parent flowsheet can retry
//! a time window and get the same trajectory.

mod coefficients;
mod config;
mod flag;
mod initial;
mod integrator;
mod record;
mod stats;

use spindle_core::{Constraint, DaeModel, DaeSystem};

use crate::{
    bridge::DaeBridge,
    report::{ErrorSlot, SolverError},
};

pub use config::{Config, ConfigError};
pub use flag::DaeFlag;
pub use record::{IntegratorRecord, MAX_ORDER};
pub use stats::Statistics;

use integrator::{Settings, Workspace};

const MODULE: &str = "DAE";

/// Everything that exists only while a model is attached.
#[derive(Debug)]
struct Attached {
    record: IntegratorRecord,
    shadow: IntegratorRecord,
    work: Workspace,
    rtol: f64,
    atol: Vec<f64>,
    constraints: Option<Vec<Constraint>>,
    differential: Vec<bool>,
}

impl Attached {
    fn new<S: DaeSystem>(model: &DaeModel<S>) -> Self {
        let record = IntegratorRecord::new(&model.init_values(), &model.init_derivatives());
        let constraints = model
            .constraints_defined()
            .then(|| model.variables().iter().map(|v| v.constraint).collect());

        Self {
            shadow: record.clone(),
            record,
            work: Workspace::new(model.variables_number()),
            rtol: model.relative_tolerance(),
            atol: model.absolute_tolerances().to_vec(),
            constraints,
            differential: model.variables().iter().map(|v| v.is_differential).collect(),
        }
    }
}

/// An implicit DAE integrator bound to one unit model.
///
/// # Example
///
/// ```
/// use spindle_core::{DaeFn, DaeModel};
/// use spindle_solvers::dae::DaeSolver;
///
/// // y' = -y
/// let system = DaeFn::unpublished(|_t: f64, y: &[f64], yp: &[f64], res: &mut [f64]| {
///     res[0] = yp[0] + y[0];
///     Ok::<(), std::convert::Infallible>(())
/// });
/// let mut model = DaeModel::new(system);
/// model.add_variable(true, 1.0, -1.0);
///
/// let mut solver = DaeSolver::new();
/// solver.set_model(model).unwrap();
/// solver.calculate_interval(0.0, 1.0).unwrap();
///
/// assert!((solver.vars()[0] - (-1.0_f64).exp()).abs() < 1e-3);
/// ```
#[derive(Debug)]
pub struct DaeSolver<S> {
    config: Config,
    /// Step bound used by the next integration, zero meaning unbounded.
    step_bound: f64,
    model: Option<DaeModel<S>>,
    attached: Option<Attached>,
    errors: ErrorSlot,
}

impl<S: DaeSystem> Default for DaeSolver<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DaeSystem> DaeSolver<S> {
    /// Creates an unattached solver with the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an unattached solver with `config`.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            step_bound: config.max_step(),
            model: None,
            attached: None,
            errors: ErrorSlot::default(),
        }
    }

    /// Attaches `model` and initializes the integrator at `t = 0`.
    ///
    /// The solver takes ownership of the model. A rejected model is still
    /// stored and can be recovered with [`DaeSolver::take_model`], but the
    /// solver stays unattached.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::IllegalInput`] if the model has no variables.
    pub fn set_model(&mut self, model: DaeModel<S>) -> Result<(), SolverError> {
        self.errors.clear();
        self.attached = None;

        let n = model.variables_number();
        let attached = (n > 0).then(|| Attached::new(&model));
        self.model = Some(model);

        let Some(attached) = attached else {
            return self.errors.fail(error(
                DaeFlag::IllegalInput,
                "set_model",
                "the model has no variables",
            ));
        };

        log::debug!(
            "attached DAE model with {n} variables (constraints: {})",
            attached.constraints.is_some()
        );
        self.attached = Some(attached);
        self.save_state()
    }

    /// Returns the attached or rejected model.
    #[must_use]
    pub fn model(&self) -> Option<&DaeModel<S>> {
        self.model.as_ref()
    }

    /// Gives mutable access to the attached model.
    ///
    /// Variables added here are not seen by the integrator until the model is
    /// attached again.
    pub fn model_mut(&mut self) -> Option<&mut DaeModel<S>> {
        self.model.as_mut()
    }

    /// Detaches and returns the model.
    pub fn take_model(&mut self) -> Option<DaeModel<S>> {
        self.attached = None;
        self.model.take()
    }

    /// Returns true once a model has been accepted.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Returns the solver config.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sets the user bound on the internal step, `0.0` meaning unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::IllegalInput`] for a negative or non-finite step.
    pub fn set_max_step(&mut self, max_step: f64) -> Result<(), SolverError> {
        if let Err(err) = self.config.set_max_step(max_step) {
            return self
                .errors
                .fail(error(DaeFlag::IllegalInput, "set_max_step", err.to_string()));
        }
        self.step_bound = max_step;
        Ok(())
    }

    /// Returns the user bound on the internal step, `0.0` if unbounded.
    #[must_use]
    pub fn max_step(&self) -> f64 {
        self.config.max_step()
    }

    /// Sets how many internal steps one stop-time leg may take.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::IllegalInput`] if `max_num_steps` is zero.
    pub fn set_max_num_steps(&mut self, max_num_steps: usize) -> Result<(), SolverError> {
        if let Err(err) = self.config.set_max_num_steps(max_num_steps) {
            return self.errors.fail(error(
                DaeFlag::IllegalInput,
                "set_max_num_steps",
                err.to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the step budget of [`DaeSolver::calculate`].
    #[must_use]
    pub fn max_num_steps(&self) -> usize {
        self.config.max_num_steps()
    }

    /// Integrates from `t_start` to `t_end`, publishing after every step.
    ///
    /// When `t_start` is zero, consistent initial conditions are computed and
    /// published at `t = 0` first. The internal step is bounded by half the
    /// interval (and by the user bound). If the current step already spans
    /// the interval, the interval is covered in two legs so at least one
    /// point is published inside it.
    ///
    /// # Errors
    ///
    /// Fails without touching any state if `t_end <= t_start`. Otherwise any
    /// failed step fails the call; variables stay at the last accepted point.
    pub fn calculate_interval(&mut self, t_start: f64, t_end: f64) -> Result<(), SolverError> {
        const FUNCTION: &str = "calculate";

        if t_start == t_end {
            return self.errors.fail(error(
                DaeFlag::IllegalInput,
                FUNCTION,
                format!("start and end time are both {t_start}"),
            ));
        }
        if t_end < t_start {
            return self.errors.fail(error(
                DaeFlag::IllegalInput,
                FUNCTION,
                format!("end time {t_end} is before start time {t_start}"),
            ));
        }
        self.ensure_attached(FUNCTION)?;

        if t_start == 0.0 {
            self.calculate_initial_conditions()?;
            self.publish_current();
        }

        let interval = t_end - t_start;
        let mut bound = interval / 2.0;
        if self.config.max_step() > 0.0 {
            bound = bound.min(self.config.max_step());
        }
        self.step_bound = bound;

        let current_step = self.attached.as_ref().map_or(0.0, |a| a.record.step);
        if current_step >= interval {
            self.integrate_until(t_start + bound)?;
        }
        self.integrate_until(t_end)
    }

    /// Solves at time `t`.
    ///
    /// At `t = 0` this computes consistent initial conditions and publishes
    /// them once. Otherwise it integrates to `t` one step at a time, taking
    /// at most `max_num_steps` steps.
    ///
    /// # Errors
    ///
    /// Returns the failure of the initial condition solve or of any step,
    /// or [`DaeFlag::TooMuchWork`] if the step budget runs out.
    pub fn calculate(&mut self, t: f64) -> Result<(), SolverError> {
        if t == 0.0 {
            self.calculate_initial_conditions()?;
            self.publish_current();
            return Ok(());
        }
        self.advance(t, Some(self.config.max_num_steps()))
    }

    /// Makes the current values and derivatives consistent.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::IllegalInput`] after the first internal step, and
    /// [`DaeFlag::InitialConditionFailure`] if the Newton solve fails.
    pub fn calculate_initial_conditions(&mut self) -> Result<(), SolverError> {
        const FUNCTION: &str = "calc_ic";

        let (Some(model), Some(attached)) = (self.model.as_mut(), self.attached.as_mut()) else {
            return self
                .errors
                .fail(error(DaeFlag::NotAttached, FUNCTION, "no model is attached"));
        };

        let Attached {
            record,
            work,
            rtol,
            atol,
            constraints,
            differential,
            ..
        } = attached;
        let settings = Settings {
            rtol: *rtol,
            atol: atol.as_slice(),
            max_step: self.step_bound,
            max_order: self.config.max_order(),
            constraints: constraints.as_deref(),
            differential: differential.as_slice(),
        };

        let mut bridge = DaeBridge::new(model);
        match record.initial_conditions(&mut bridge, &settings, work) {
            Ok(()) => Ok(()),
            Err(flag) => self.errors.fail(error(flag, FUNCTION, flag.to_string())),
        }
    }

    /// Integrates to `t_end` one internal step at a time, publishing after
    /// every accepted step. The last step lands exactly on `t_end`.
    ///
    /// Each step is its own solver call, so `max_num_steps` does not apply.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::IllegalInput`] if `t_end` is behind the current
    /// time, or the flag of the first failing step.
    pub fn integrate_until(&mut self, t_end: f64) -> Result<(), SolverError> {
        self.advance(t_end, None)
    }

    /// Steps to `t_end`, failing with [`DaeFlag::TooMuchWork`] once `budget`
    /// steps have been taken without reaching it.
    fn advance(&mut self, t_end: f64, budget: Option<usize>) -> Result<(), SolverError> {
        const FUNCTION: &str = "step";

        let (Some(model), Some(attached)) = (self.model.as_mut(), self.attached.as_mut()) else {
            return self
                .errors
                .fail(error(DaeFlag::NotAttached, FUNCTION, "no model is attached"));
        };

        let time = attached.record.time;
        if !t_end.is_finite() || t_end < time {
            return self.errors.fail(error(
                DaeFlag::IllegalInput,
                FUNCTION,
                format!("stop time {t_end} is behind the current time {time}"),
            ));
        }

        let Attached {
            record,
            work,
            rtol,
            atol,
            constraints,
            differential,
            ..
        } = attached;
        let settings = Settings {
            rtol: *rtol,
            atol: atol.as_slice(),
            max_step: self.step_bound,
            max_order: self.config.max_order(),
            constraints: constraints.as_deref(),
            differential: differential.as_slice(),
        };

        record.stop_time = Some(t_end);
        let mut taken = 0;
        while record.time < t_end {
            if budget.is_some_and(|budget| taken >= budget) {
                let flag = DaeFlag::TooMuchWork;
                return self.errors.fail(error(
                    flag,
                    FUNCTION,
                    format!("{flag} (t = {}, stop = {t_end})", record.time),
                ));
            }

            let status = record.step(&mut DaeBridge::new(model), &settings, work);
            if let Err(flag) = status {
                return self.errors.fail(error(
                    flag,
                    FUNCTION,
                    format!("{flag} at t = {}", record.time),
                ));
            }
            taken += 1;
            model.publish_results(record.time, &record.vars, &record.ders);
        }

        log::trace!("reached t = {t_end} in {taken} steps");
        Ok(())
    }

    /// Copies the live integrator record into the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::NotAttached`] if no model is attached.
    pub fn save_state(&mut self) -> Result<(), SolverError> {
        let attached = self.ensure_attached("save_state")?;
        attached.shadow.clone_from(&attached.record);
        log::debug!("saved DAE state at t = {}", attached.record.time);
        Ok(())
    }

    /// Restores the live integrator record from the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DaeFlag::NotAttached`] if no model is attached.
    pub fn load_state(&mut self) -> Result<(), SolverError> {
        let attached = self.ensure_attached("load_state")?;
        attached.record.clone_from(&attached.shadow);
        log::debug!("loaded DAE state at t = {}", attached.record.time);
        Ok(())
    }

    /// Returns the last failure as text, or an empty string.
    #[must_use]
    pub fn error(&self) -> String {
        self.errors.message()
    }

    /// Returns the last failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&SolverError> {
        self.errors.last()
    }

    /// Returns the live record, if attached.
    #[must_use]
    pub fn record(&self) -> Option<&IntegratorRecord> {
        self.attached.as_ref().map(|a| &a.record)
    }

    /// Returns the current variable values, empty if unattached.
    #[must_use]
    pub fn vars(&self) -> &[f64] {
        self.record().map(IntegratorRecord::vars).unwrap_or_default()
    }

    /// Returns the current derivatives, empty if unattached.
    #[must_use]
    pub fn ders(&self) -> &[f64] {
        self.record().map(IntegratorRecord::ders).unwrap_or_default()
    }

    /// Returns the integrator time, `0.0` if unattached.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.record().map_or(0.0, IntegratorRecord::time)
    }

    /// Returns the work counters of the live record.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.record()
            .map(IntegratorRecord::statistics)
            .unwrap_or_default()
    }

    fn ensure_attached(&mut self, function: &'static str) -> Result<&mut Attached, SolverError> {
        match self.attached.as_mut() {
            Some(attached) if self.model.is_some() => Ok(attached),
            _ => self
                .errors
                .fail(error(DaeFlag::NotAttached, function, "no model is attached")),
        }
    }

    fn publish_current(&mut self) {
        if let (Some(model), Some(attached)) = (self.model.as_mut(), self.attached.as_ref()) {
            let record = &attached.record;
            model.publish_results(record.time, &record.vars, &record.ders);
        }
    }
}

fn error(flag: DaeFlag, function: &'static str, message: impl Into<String>) -> SolverError {
    SolverError::new(flag.code(), MODULE, function, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;

    /// Residual `res = der`, recording every published time.
    #[derive(Debug, Default)]
    struct Steady {
        published: Vec<f64>,
    }

    impl DaeSystem for Steady {
        type Error = Infallible;

        fn residuals(
            &mut self,
            _time: f64,
            _vars: &[f64],
            ders: &[f64],
            res: &mut [f64],
        ) -> Result<(), Infallible> {
            res.copy_from_slice(ders);
            Ok(())
        }

        fn publish(&mut self, time: f64, _vars: &[f64], _ders: &[f64]) {
            self.published.push(time);
        }
    }

    fn attached_steady() -> DaeSolver<Steady> {
        let mut model = DaeModel::new(Steady::default());
        model.add_variable(true, 1.0, 0.0);
        let mut solver = DaeSolver::new();
        solver.set_model(model).unwrap();
        solver
    }

    #[test]
    fn empty_model_is_rejected() {
        let mut solver = DaeSolver::new();
        let result = solver.set_model(DaeModel::new(Steady::default()));

        assert_eq!(result.unwrap_err().code, -22);
        assert!(!solver.is_attached());
        assert!(solver.error().starts_with("[DAE ERROR] in set_model"));
        assert!(solver.take_model().is_some());
    }

    #[test]
    fn unattached_calls_fail() {
        let mut solver = DaeSolver::<Steady>::new();

        assert_eq!(solver.save_state().unwrap_err().code, -30);
        assert_eq!(solver.calculate(1.0).unwrap_err().code, -30);
        assert!(solver.vars().is_empty());
    }

    #[test]
    fn equal_times_fail_without_mutation() {
        let mut solver = attached_steady();
        let before = solver.record().cloned().unwrap();

        let result = solver.calculate_interval(0.5, 0.5);

        assert_eq!(result.unwrap_err().code, -22);
        let after = solver.record().unwrap();
        assert_eq!(after.statistics(), before.statistics());
        assert_eq!(after.vars(), before.vars());
        assert!(solver.model().unwrap().system().published.is_empty());
    }

    #[test]
    fn steady_state_stays_put() {
        let mut solver = attached_steady();
        solver.calculate_interval(0.0, 1.0).unwrap();

        assert_relative_eq!(solver.vars()[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(solver.ders()[0], 0.0, epsilon = 1e-9);
        assert_eq!(solver.time(), 1.0);
        assert!(solver.error().is_empty());
    }

    #[test]
    fn initial_point_is_published_once_and_first() {
        let mut solver = attached_steady();
        solver.calculate_interval(0.0, 1.0).unwrap();

        let published = &solver.model().unwrap().system().published;
        assert_eq!(published[0], 0.0);
        assert_eq!(published.iter().filter(|&&t| t == 0.0).count(), 1);
        assert!(published.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(published.last(), Some(&1.0));
    }

    #[test]
    fn wide_step_is_split_into_two_legs() {
        let mut solver = attached_steady();
        solver.calculate_interval(0.0, 1.0).unwrap();
        let count = solver.model().unwrap().system().published.len();

        // The steady state lets the step grow past the next interval.
        solver.calculate_interval(1.0, 1.1).unwrap();

        let published = &solver.model().unwrap().system().published[count..];
        assert!(published.len() >= 2);
        assert!(published.iter().any(|&t| t > 1.0 && t < 1.1));
        assert_eq!(published.last(), Some(&1.1));
    }

    #[test]
    fn save_then_load_is_identity() {
        let mut solver = attached_steady();
        solver.calculate_interval(0.0, 0.5).unwrap();
        let vars = solver.vars().to_vec();
        let stats = solver.statistics();

        solver.save_state().unwrap();
        solver.load_state().unwrap();

        assert_eq!(solver.vars(), vars.as_slice());
        assert_eq!(solver.statistics(), stats);
    }

    #[test]
    fn negative_max_step_is_rejected() {
        let mut solver = attached_steady();
        assert_eq!(solver.set_max_step(-1.0).unwrap_err().code, -22);
        assert!(solver.max_step().abs() < f64::EPSILON);

        solver.set_max_step(0.1).unwrap();
        assert_relative_eq!(solver.max_step(), 0.1);
    }

    #[test]
    fn stop_time_behind_is_rejected() {
        let mut solver = attached_steady();
        solver.calculate_interval(0.0, 1.0).unwrap();

        let result = solver.integrate_until(0.5);
        assert_eq!(result.unwrap_err().code, -22);
        assert!(solver.error().contains("behind"));
    }

    #[test]
    fn too_much_work() {
        let mut solver = attached_steady();
        solver.set_max_num_steps(1).unwrap();
        solver.set_max_step(0.01).unwrap();
        solver.calculate(0.0).unwrap();

        let result = solver.calculate(1.0);

        assert_eq!(result.unwrap_err().code, -1);
        assert!(solver.time() > 0.0 && solver.time() < 1.0);
        assert_eq!(solver.statistics().steps, 1);
    }

    #[test]
    fn interval_steps_ignore_the_step_budget() {
        let mut solver = attached_steady();
        solver.set_max_num_steps(1).unwrap();
        solver.set_max_step(0.01).unwrap();

        solver.calculate_interval(0.0, 1.0).unwrap();

        assert_eq!(solver.time(), 1.0);
        assert!(solver.statistics().steps >= 100);
    }
}
