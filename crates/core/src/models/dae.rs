use crate::{Constraint, DaeSystem, Tolerances};

use super::VariableError;

/// One registered state variable of a DAE model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateVariable {
    pub init_value: f64,
    pub init_derivative: f64,
    /// `true` for differential variables, `false` for algebraic ones.
    pub is_differential: bool,
    pub constraint: Constraint,
}

/// A differential-algebraic model: an ordered variable registry, its
/// tolerances, and the system that evaluates residuals.
///
/// Handles returned by the `add_*` methods are dense, zero-based, and
/// follow insertion order. They stay valid until [`DaeModel::clear_variables`].
#[derive(Debug, Clone)]
pub struct DaeModel<S> {
    variables: Vec<StateVariable>,
    tolerances: Tolerances,
    system: S,
}

impl<S: DaeSystem> DaeModel<S> {
    /// Creates an empty model around `system`.
    pub fn new(system: S) -> Self {
        Self {
            variables: Vec::new(),
            tolerances: Tolerances::default(),
            system,
        }
    }

    /// Registers an unconstrained variable and returns its handle.
    pub fn add_variable(&mut self, is_differential: bool, init: f64, init_derivative: f64) -> usize {
        self.add_constrained_variable(is_differential, init, init_derivative, Constraint::None)
    }

    /// Registers a variable with a constraint and returns its handle.
    ///
    /// The current default absolute tolerance is recorded for the variable.
    pub fn add_constrained_variable(
        &mut self,
        is_differential: bool,
        init: f64,
        init_derivative: f64,
        constraint: Constraint,
    ) -> usize {
        self.variables.push(StateVariable {
            init_value: init,
            init_derivative,
            is_differential,
            constraint,
        });
        self.tolerances.push_default();
        self.variables.len() - 1
    }

    /// Registers one variable per pair of initial value and derivative.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::LengthMismatch`] and registers nothing if the
    /// slices differ in length.
    pub fn add_variables(
        &mut self,
        is_differential: bool,
        inits: &[f64],
        init_derivatives: &[f64],
        constraint: Constraint,
    ) -> Result<Vec<usize>, VariableError> {
        if inits.len() != init_derivatives.len() {
            return Err(VariableError::LengthMismatch {
                values: inits.len(),
                derivatives: init_derivatives.len(),
            });
        }
        Ok(inits
            .iter()
            .zip(init_derivatives)
            .map(|(&init, &der)| self.add_constrained_variable(is_differential, init, der, constraint))
            .collect())
    }

    /// Registers one variable per initial value, all sharing `init_derivative`.
    pub fn add_variables_uniform(
        &mut self,
        is_differential: bool,
        inits: &[f64],
        init_derivative: f64,
        constraint: Constraint,
    ) -> Vec<usize> {
        inits
            .iter()
            .map(|&init| {
                self.add_constrained_variable(is_differential, init, init_derivative, constraint)
            })
            .collect()
    }

    /// Returns the number of registered variables.
    #[must_use]
    pub fn variables_number(&self) -> usize {
        self.variables.len()
    }

    /// Returns a registered variable.
    #[must_use]
    pub fn variable(&self, handle: usize) -> Option<&StateVariable> {
        self.variables.get(handle)
    }

    /// Returns all registered variables in handle order.
    #[must_use]
    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    /// Returns the initial values in handle order.
    #[must_use]
    pub fn init_values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.init_value).collect()
    }

    /// Returns the initial derivatives in handle order.
    #[must_use]
    pub fn init_derivatives(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.init_derivative).collect()
    }

    /// Returns the numeric constraint flags, see [`Constraint::flag`].
    #[must_use]
    pub fn constraint_flags(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.constraint.flag()).collect()
    }

    /// Returns true if any variable carries a constraint.
    #[must_use]
    pub fn constraints_defined(&self) -> bool {
        self.variables.iter().any(|v| v.constraint.is_defined())
    }

    /// Returns `1.0` for differential and `0.0` for algebraic variables.
    #[must_use]
    pub fn variable_types(&self) -> Vec<f64> {
        self.variables
            .iter()
            .map(|v| if v.is_differential { 1.0 } else { 0.0 })
            .collect()
    }

    /// Removes all variables and their absolute tolerances.
    pub fn clear_variables(&mut self) {
        self.variables.clear();
        self.tolerances.clear_variables();
    }

    /// Removes all variables and resets tolerances to their defaults.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.tolerances = Tolerances::default();
    }

    /// Sets the relative tolerance and one absolute tolerance for all
    /// variables, present and future.
    pub fn set_tolerance(&mut self, rtol: f64, atol: f64) {
        self.tolerances.set(rtol, atol);
    }

    /// Sets the relative tolerance and per-variable absolute tolerances.
    ///
    /// If `atols` is shorter than the number of variables only the relative
    /// tolerance changes and `false` is returned.
    pub fn set_tolerances(&mut self, rtol: f64, atols: &[f64]) -> bool {
        self.tolerances.set_each(rtol, atols)
    }

    /// Returns the relative tolerance.
    #[must_use]
    pub fn relative_tolerance(&self) -> f64 {
        self.tolerances.relative()
    }

    /// Returns the absolute tolerance of a variable, or the library default
    /// for an unknown handle.
    #[must_use]
    pub fn absolute_tolerance(&self, handle: usize) -> f64 {
        self.tolerances.absolute(handle)
    }

    /// Returns the absolute tolerances in handle order.
    #[must_use]
    pub fn absolute_tolerances(&self) -> &[f64] {
        self.tolerances.absolute_all()
    }

    /// Returns the tolerance model.
    #[must_use]
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// Returns the system.
    #[must_use]
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Returns the system mutably.
    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    /// Consumes the model and returns its system.
    pub fn into_system(self) -> S {
        self.system
    }

    /// Evaluates residuals through the system and checks the result.
    ///
    /// Returns `false` if the system fails, if the model is empty, or if the
    /// first variable (its derivative when differential) is not finite.
    /// Only element 0 is inspected.
    pub fn residuals(&mut self, time: f64, vars: &[f64], ders: &[f64], res: &mut [f64]) -> bool {
        if let Err(error) = self.system.residuals(time, vars, ders, res) {
            log::debug!("residual evaluation failed at t = {time}: {error}");
            return false;
        }
        match self.variables.first() {
            Some(first) if first.is_differential => ders.first().is_some_and(|d| d.is_finite()),
            Some(_) => vars.first().is_some_and(|v| v.is_finite()),
            None => false,
        }
    }

    /// Hands an accepted solution point to the system.
    pub fn publish_results(&mut self, time: f64, vars: &[f64], ders: &[f64]) {
        self.system.publish(time, vars, ders);
    }
}
