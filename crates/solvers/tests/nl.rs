use std::convert::Infallible;

use approx::assert_relative_eq;
use spindle_core::{Constraint, NlFn, NlModel, NlSystem, Strategy};
use spindle_solvers::nl::{NlSolver, Outcome, ParameterError};

/// Two coupled equations with the root `(1, 2)`:
/// `x² + y − 3 = 0` and `x + y² − 5 = 0`.
#[derive(Debug, Default)]
struct Coupled {
    published: Vec<(f64, Vec<f64>)>,
}

impl NlSystem for Coupled {
    type Error = Infallible;

    fn functions(
        &mut self,
        _strategy: Strategy,
        vars: &[f64],
        func: &mut [f64],
    ) -> Result<(), Infallible> {
        let (x, y) = (vars[0], vars[1]);
        func[0] = x * x + y - 3.0;
        func[1] = x + y * y - 5.0;
        Ok(())
    }

    fn publish(&mut self, time: f64, vars: &[f64]) {
        self.published.push((time, vars.to_vec()));
    }
}

fn coupled(strategy: Strategy, guess: [f64; 2]) -> NlSolver<Coupled> {
    let mut model = NlModel::new(Coupled::default());
    for value in guess {
        model.add_unscaled_variable(value);
    }
    let mut solver = NlSolver::with_strategy(strategy);
    solver.set_model(model).unwrap();
    solver
}

#[test]
fn newton_finds_square_root_of_four() {
    let system = NlFn::unpublished(|_: Strategy, u: &[f64], f: &mut [f64]| {
        f[0] = u[0] * u[0] - 4.0;
        Ok::<(), Infallible>(())
    });
    let mut model = NlModel::new(system);
    model.add_unscaled_variable(1.0);
    let mut solver = NlSolver::new();
    solver.set_model(model).unwrap();

    let outcome = solver.calculate(0.0).unwrap();

    assert_ne!(outcome, Outcome::InitialGuessOk);
    assert_relative_eq!(solver.vars()[0], 2.0, epsilon = 1e-6);
    assert!(solver.solver_iter() > 0);
}

#[test]
fn newton_and_linesearch_solve_coupled_system() {
    for strategy in [Strategy::Newton, Strategy::Linesearch] {
        let mut solver = coupled(strategy, [1.5, 1.5]);

        solver.calculate(3.0).unwrap();

        assert_relative_eq!(solver.vars()[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solver.vars()[1], 2.0, epsilon = 1e-6);
        let published = &solver.model().unwrap().system().published;
        assert_eq!(published.len(), 1);
        assert_relative_eq!(published[0].0, 3.0);
    }
}

#[test]
fn picard_with_anderson_solves_coupled_system() {
    let mut solver = coupled(Strategy::Picard, [1.1, 1.9]);
    solver.set_fixed_point_parameters(2, 1.0, 1.0).unwrap();

    solver.calculate(0.0).unwrap();

    assert_relative_eq!(solver.vars()[0], 1.0, epsilon = 1e-5);
    assert_relative_eq!(solver.vars()[1], 2.0, epsilon = 1e-5);
}

#[test]
fn solved_state_is_an_initial_guess_ok() {
    let mut solver = coupled(Strategy::Newton, [1.0, 2.0]);

    assert_eq!(solver.calculate(0.0).unwrap(), Outcome::InitialGuessOk);
    assert_eq!(solver.solver_iter(), 0);
}

#[test]
fn fixed_point_map_with_damping() {
    // u = cos(u), with the model returning G(u) = cos(u).
    let system = NlFn::unpublished(|strategy: Strategy, u: &[f64], g: &mut [f64]| {
        assert_eq!(strategy, Strategy::FixedPoint);
        g[0] = u[0].cos();
        Ok::<(), Infallible>(())
    });
    let mut model = NlModel::new(system);
    model.add_unscaled_variable(0.0);
    let mut solver = NlSolver::with_strategy(Strategy::FixedPoint);
    solver.set_model(model).unwrap();
    solver.set_fixed_point_parameters(0, 1.0, 0.6).unwrap();

    solver.calculate(0.0).unwrap();

    assert_relative_eq!(solver.vars()[0], 0.739_085_133_215_160_6, epsilon = 1e-5);
}

#[test]
fn positive_constraint_keeps_iterates_feasible() {
    // ln(u) = 1 has no solution for u <= 0; a full Newton step from 5 lands
    // there.
    let system = NlFn::unpublished(|_: Strategy, u: &[f64], f: &mut [f64]| {
        assert!(u[0] > 0.0, "iterate left the feasible region: {}", u[0]);
        f[0] = u[0].ln() - 1.0;
        Ok::<(), Infallible>(())
    });
    let mut model = NlModel::new(system);
    model.add_variable(8.0, Constraint::Positive, 1.0, 1.0);
    let mut solver = NlSolver::new();
    solver.set_model(model).unwrap();

    solver.calculate(0.0).unwrap();

    assert_relative_eq!(solver.vars()[0], std::f64::consts::E, epsilon = 1e-6);
}

#[test]
fn checkpoint_restores_only_the_iterate() {
    let mut solver = coupled(Strategy::Newton, [1.5, 1.5]);
    solver.calculate(0.0).unwrap();
    solver.save_state().unwrap();

    solver.load_state().unwrap();
    assert_relative_eq!(solver.vars()[0], 1.0, epsilon = 1e-6);

    let mut fresh = coupled(Strategy::Newton, [1.5, 1.5]);
    fresh.calculate(0.0).unwrap();
    fresh.load_state().unwrap();
    assert_eq!(fresh.vars(), &[1.5, 1.5]);
}

#[test]
fn family_mismatch_is_rejected() {
    let mut solver = coupled(Strategy::Linesearch, [1.5, 1.5]);
    let config = *solver.config();

    assert!(matches!(
        solver.set_fixed_point_parameters(1, 0.5, 0.5),
        Err(ParameterError::StrategyMismatch { .. })
    ));
    assert_eq!(*solver.config(), config);

    solver.set_newton_parameters(4, 2).unwrap();
    assert_eq!(solver.config().newton().max_setup_calls(), 4);
}

#[test]
fn empty_model_is_rejected() {
    let mut solver = NlSolver::new();
    let err = solver.set_model(NlModel::new(Coupled::default())).unwrap_err();

    assert_eq!(err.code, -22);
    assert!(!solver.is_attached());
    assert_eq!(solver.solver_iter(), 0);
}
