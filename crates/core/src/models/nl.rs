use crate::{Constraint, NlSystem, Strategy};

/// One registered unknown of a nonlinear model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlVariable {
    pub init_value: f64,
    pub constraint: Constraint,
    /// Scale applied to the variable in step-length tests.
    pub variable_scale: f64,
    /// Scale applied to the function value in residual tests.
    pub function_scale: f64,
}

/// A nonlinear algebraic model: an ordered registry of unknowns and the
/// system that evaluates the function vector.
///
/// The solver pushes its active [`Strategy`] into the model when the model is
/// attached; the system receives it on every evaluation.
#[derive(Debug, Clone)]
pub struct NlModel<S> {
    variables: Vec<NlVariable>,
    strategy: Strategy,
    system: S,
}

impl<S: NlSystem> NlModel<S> {
    /// Creates an empty model around `system`.
    pub fn new(system: S) -> Self {
        Self {
            variables: Vec::new(),
            strategy: Strategy::default(),
            system,
        }
    }

    /// Registers an unknown and returns its handle.
    pub fn add_variable(
        &mut self,
        init: f64,
        constraint: Constraint,
        variable_scale: f64,
        function_scale: f64,
    ) -> usize {
        self.variables.push(NlVariable {
            init_value: init,
            constraint,
            variable_scale,
            function_scale,
        });
        self.variables.len() - 1
    }

    /// Registers an unconstrained unknown with unit scales.
    pub fn add_unscaled_variable(&mut self, init: f64) -> usize {
        self.add_variable(init, Constraint::None, 1.0, 1.0)
    }

    #[must_use]
    pub fn variables_number(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn variable(&self, handle: usize) -> Option<&NlVariable> {
        self.variables.get(handle)
    }

    #[must_use]
    pub fn variables(&self) -> &[NlVariable] {
        &self.variables
    }

    #[must_use]
    pub fn init_values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.init_value).collect()
    }

    #[must_use]
    pub fn variable_scales(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.variable_scale).collect()
    }

    #[must_use]
    pub fn function_scales(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.function_scale).collect()
    }

    #[must_use]
    pub fn constraints_defined(&self) -> bool {
        self.variables.iter().any(|v| v.constraint.is_defined())
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    /// Removes all variables and resets the strategy.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.strategy = Strategy::default();
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    #[must_use]
    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    /// Consumes the model and returns its system.
    pub fn into_system(self) -> S {
        self.system
    }

    /// Evaluates the function vector through the system and checks the input.
    ///
    /// Returns `false` if the system fails, if the model is empty, or if the
    /// first variable is not finite. Only element 0 is inspected.
    pub fn functions(&mut self, vars: &[f64], func: &mut [f64]) -> bool {
        if let Err(error) = self.system.functions(self.strategy, vars, func) {
            log::debug!("function evaluation failed: {error}");
            return false;
        }
        !self.variables.is_empty() && vars.first().is_some_and(|v| v.is_finite())
    }

    /// Hands the converged solution to the system.
    pub fn publish_results(&mut self, time: f64, vars: &[f64]) {
        self.system.publish(time, vars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    /// Records the strategy it was called with.
    #[derive(Default)]
    struct Probe {
        seen: Option<Strategy>,
    }

    impl NlSystem for Probe {
        type Error = Infallible;

        fn functions(
            &mut self,
            strategy: Strategy,
            vars: &[f64],
            func: &mut [f64],
        ) -> Result<(), Infallible> {
            self.seen = Some(strategy);
            func.copy_from_slice(vars);
            Ok(())
        }
    }

    #[test]
    fn registration_keeps_scales() {
        let mut model = NlModel::new(Probe::default());
        assert_eq!(model.add_unscaled_variable(1.0), 0);
        assert_eq!(model.add_variable(2.0, Constraint::Positive, 10.0, 0.1), 1);

        assert_eq!(model.variables_number(), 2);
        assert_eq!(model.init_values(), vec![1.0, 2.0]);
        assert_eq!(model.variable_scales(), vec![1.0, 10.0]);
        assert_eq!(model.function_scales(), vec![1.0, 0.1]);
        assert!(model.constraints_defined());
    }

    #[test]
    fn strategy_reaches_the_system() {
        let mut model = NlModel::new(Probe::default());
        model.add_unscaled_variable(1.0);
        model.set_strategy(Strategy::FixedPoint);

        let mut func = [0.0];
        assert!(model.functions(&[1.0], &mut func));
        assert_eq!(model.system().seen, Some(Strategy::FixedPoint));
    }

    #[test]
    fn non_finite_first_variable_fails() {
        let mut model = NlModel::new(Probe::default());
        model.add_unscaled_variable(1.0);
        model.add_unscaled_variable(1.0);

        let mut func = [0.0; 2];
        assert!(model.functions(&[1.0, f64::NAN], &mut func));
        assert!(!model.functions(&[f64::INFINITY, 1.0], &mut func));
    }

    #[test]
    fn clear_resets_strategy() {
        let mut model = NlModel::new(Probe::default());
        model.add_unscaled_variable(1.0);
        model.set_strategy(Strategy::Picard);

        model.clear();
        assert_eq!(model.variables_number(), 0);
        assert_eq!(model.strategy(), Strategy::Newton);
    }
}
