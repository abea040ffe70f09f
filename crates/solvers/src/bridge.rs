//! Translation between solver-native arrays and unit model callbacks.
//!
//! The integrator and the nonlinear solver only see [`ResidualFn`] and
//! [`FunctionFn`]. The bridges here adapt a [`DaeModel`] or [`NlModel`] to
//! those traits and turn the model's success flag into a [`CallbackStatus`].

use spindle_core::{DaeModel, DaeSystem, NlModel, NlSystem};

/// Status returned by a callback to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Success,
    /// Unrecoverable: the solver aborts the current call.
    Failure,
}

impl CallbackStatus {
    #[must_use]
    pub fn from_success(success: bool) -> Self {
        if success {
            CallbackStatus::Success
        } else {
            CallbackStatus::Failure
        }
    }

    /// Returns `0` for success and `-1` for failure.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            CallbackStatus::Success => 0,
            CallbackStatus::Failure => -1,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == CallbackStatus::Success
    }
}

/// Residual evaluation `F(t, y, y')` as seen by the integrator.
pub trait ResidualFn {
    fn eval(&mut self, time: f64, vars: &[f64], ders: &[f64], res: &mut [f64]) -> CallbackStatus;
}

impl<F> ResidualFn for F
where
    F: FnMut(f64, &[f64], &[f64], &mut [f64]) -> CallbackStatus,
{
    fn eval(&mut self, time: f64, vars: &[f64], ders: &[f64], res: &mut [f64]) -> CallbackStatus {
        self(time, vars, ders, res)
    }
}

/// Function evaluation `F(u)` (or `G(u)`) as seen by the nonlinear solver.
pub trait FunctionFn {
    fn eval(&mut self, vars: &[f64], func: &mut [f64]) -> CallbackStatus;
}

impl<F> FunctionFn for F
where
    F: FnMut(&[f64], &mut [f64]) -> CallbackStatus,
{
    fn eval(&mut self, vars: &[f64], func: &mut [f64]) -> CallbackStatus {
        self(vars, func)
    }
}

/// Adapts a [`DaeModel`] to [`ResidualFn`].
pub(crate) struct DaeBridge<'a, S> {
    model: &'a mut DaeModel<S>,
}

impl<'a, S: DaeSystem> DaeBridge<'a, S> {
    pub(crate) fn new(model: &'a mut DaeModel<S>) -> Self {
        Self { model }
    }
}

impl<S: DaeSystem> ResidualFn for DaeBridge<'_, S> {
    fn eval(&mut self, time: f64, vars: &[f64], ders: &[f64], res: &mut [f64]) -> CallbackStatus {
        CallbackStatus::from_success(self.model.residuals(time, vars, ders, res))
    }
}

/// Adapts an [`NlModel`] to [`FunctionFn`].
pub(crate) struct NlBridge<'a, S> {
    model: &'a mut NlModel<S>,
}

impl<'a, S: NlSystem> NlBridge<'a, S> {
    pub(crate) fn new(model: &'a mut NlModel<S>) -> Self {
        Self { model }
    }
}

impl<S: NlSystem> FunctionFn for NlBridge<'_, S> {
    fn eval(&mut self, vars: &[f64], func: &mut [f64]) -> CallbackStatus {
        CallbackStatus::from_success(self.model.functions(vars, func))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{convert::Infallible, fmt};

    use spindle_core::{Constraint, Strategy};

    #[derive(Debug)]
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broken")
        }
    }

    impl std::error::Error for Broken {}

    struct Failing;

    impl DaeSystem for Failing {
        type Error = Broken;

        fn residuals(&mut self, _: f64, _: &[f64], _: &[f64], _: &mut [f64]) -> Result<(), Broken> {
            Err(Broken)
        }
    }

    struct Square;

    impl NlSystem for Square {
        type Error = Infallible;

        fn functions(&mut self, _: Strategy, vars: &[f64], func: &mut [f64]) -> Result<(), Infallible> {
            func[0] = vars[0] * vars[0];
            Ok(())
        }
    }

    #[test]
    fn codes_match_solver_convention() {
        assert_eq!(CallbackStatus::Success.code(), 0);
        assert_eq!(CallbackStatus::Failure.code(), -1);
    }

    #[test]
    fn system_error_becomes_failure() {
        let mut model = DaeModel::new(Failing);
        model.add_variable(true, 1.0, 0.0);
        let mut bridge = DaeBridge::new(&mut model);

        let status = bridge.eval(0.0, &[1.0], &[0.0], &mut [0.0]);
        assert_eq!(status, CallbackStatus::Failure);
    }

    #[test]
    fn nl_bridge_passes_values_through() {
        let mut model = NlModel::new(Square);
        model.add_variable(3.0, Constraint::None, 1.0, 1.0);
        let mut func = [0.0];

        let status = NlBridge::new(&mut model).eval(&[3.0], &mut func);
        assert!(status.is_success());
        assert_eq!(func, [9.0]);

        let status = NlBridge::new(&mut model).eval(&[f64::NAN], &mut func);
        assert_eq!(status, CallbackStatus::Failure);
    }
}
