use std::error::Error as StdError;

use crate::Strategy;

/// The callback contract of a DAE unit model.
///
/// A system evaluates residuals `F(t, y, y')` for the integrator and receives
/// the accepted solution after each internal step. Both methods are called
/// synchronously from inside the solver's `calculate`.
///
/// Variables are addressed by the handles returned at registration, which
/// index directly into `vars`, `ders`, and `res`.
pub trait DaeSystem {
    type Error: StdError + Send + Sync + 'static;

    /// Computes the residual vector for the given time, variables, and
    /// derivatives.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the current solver call.
    fn residuals(
        &mut self,
        time: f64,
        vars: &[f64],
        ders: &[f64],
        res: &mut [f64],
    ) -> Result<(), Self::Error>;

    /// Receives an accepted solution point.
    ///
    /// The default implementation ignores results.
    fn publish(&mut self, _time: f64, _vars: &[f64], _ders: &[f64]) {}
}

/// The callback contract of a nonlinear unit model.
///
/// For [`Strategy::FixedPoint`] the system returns the fixed-point map
/// `G(u)`; for every other strategy it returns the function `F(u)` whose
/// root is sought. The active strategy is passed so a single system can
/// serve both forms.
pub trait NlSystem {
    type Error: StdError + Send + Sync + 'static;

    /// Computes the function vector for the given variables.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the current solver call.
    fn functions(
        &mut self,
        strategy: Strategy,
        vars: &[f64],
        func: &mut [f64],
    ) -> Result<(), Self::Error>;

    /// Receives the converged solution at the requested time.
    ///
    /// The default implementation ignores results.
    fn publish(&mut self, _time: f64, _vars: &[f64]) {}
}

/// A [`DaeSystem`] built from a residual closure and a publish closure.
///
/// ```
/// use std::convert::Infallible;
/// use spindle_core::{DaeFn, DaeSystem};
///
/// let mut published = Vec::new();
/// let mut system = DaeFn::new(
///     |_t: f64, _y: &[f64], yp: &[f64], res: &mut [f64]| {
///         res[0] = yp[0];
///         Ok::<(), Infallible>(())
///     },
///     |t: f64, y: &[f64], _yp: &[f64]| published.push((t, y[0])),
/// );
///
/// let mut res = [1.0];
/// system.residuals(0.0, &[3.0], &[0.0], &mut res).unwrap();
/// system.publish(0.5, &[3.0], &[0.0]);
/// assert_eq!(res, [0.0]);
/// drop(system);
/// assert_eq!(published, vec![(0.5, 3.0)]);
/// ```
pub struct DaeFn<R, P> {
    residuals: R,
    publish: P,
}

impl<R, P> DaeFn<R, P> {
    /// Creates a system from its two callbacks.
    pub fn new(residuals: R, publish: P) -> Self {
        Self { residuals, publish }
    }
}

impl<R> DaeFn<R, fn(f64, &[f64], &[f64])> {
    /// Creates a system that ignores published results.
    pub fn unpublished(residuals: R) -> Self {
        Self {
            residuals,
            publish: |_, _, _| {},
        }
    }
}

impl<R, P, E> DaeSystem for DaeFn<R, P>
where
    R: FnMut(f64, &[f64], &[f64], &mut [f64]) -> Result<(), E>,
    P: FnMut(f64, &[f64], &[f64]),
    E: StdError + Send + Sync + 'static,
{
    type Error = E;

    fn residuals(
        &mut self,
        time: f64,
        vars: &[f64],
        ders: &[f64],
        res: &mut [f64],
    ) -> Result<(), E> {
        (self.residuals)(time, vars, ders, res)
    }

    fn publish(&mut self, time: f64, vars: &[f64], ders: &[f64]) {
        (self.publish)(time, vars, ders);
    }
}

/// An [`NlSystem`] built from a function closure and a publish closure.
pub struct NlFn<F, P> {
    functions: F,
    publish: P,
}

impl<F, P> NlFn<F, P> {
    /// Creates a system from its two callbacks.
    pub fn new(functions: F, publish: P) -> Self {
        Self { functions, publish }
    }
}

impl<F> NlFn<F, fn(f64, &[f64])> {
    /// Creates a system that ignores published results.
    pub fn unpublished(functions: F) -> Self {
        Self {
            functions,
            publish: |_, _| {},
        }
    }
}

impl<F, P, E> NlSystem for NlFn<F, P>
where
    F: FnMut(Strategy, &[f64], &mut [f64]) -> Result<(), E>,
    P: FnMut(f64, &[f64]),
    E: StdError + Send + Sync + 'static,
{
    type Error = E;

    fn functions(&mut self, strategy: Strategy, vars: &[f64], func: &mut [f64]) -> Result<(), E> {
        (self.functions)(strategy, vars, func)
    }

    fn publish(&mut self, time: f64, vars: &[f64]) {
        (self.publish)(time, vars);
    }
}
