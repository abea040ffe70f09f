//! Dense linear solves shared by the integrator and the nonlinear solver.

use nalgebra::{DMatrix, DVector, Dyn, LU};
use thiserror::Error;

/// Errors from [`DenseLinearSolver`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinearError {
    #[error("matrix is singular")]
    Singular,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("matrix has not been factorized")]
    NotFactorized,
}

/// A square matrix together with its LU factorization.
///
/// Writing to the matrix through [`DenseLinearSolver::matrix_mut`] drops the
/// factorization, so a solve always uses factors of the current matrix.
#[derive(Debug)]
pub struct DenseLinearSolver {
    matrix: DMatrix<f64>,
    factors: Option<LU<f64, Dyn, Dyn>>,
}

impl DenseLinearSolver {
    /// Creates an `n × n` zero matrix with no factorization.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            matrix: DMatrix::zeros(n, n),
            factors: None,
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut DMatrix<f64> {
        self.factors = None;
        &mut self.matrix
    }

    #[must_use]
    pub fn is_factorized(&self) -> bool {
        self.factors.is_some()
    }

    /// Factorizes the current matrix.
    ///
    /// # Errors
    ///
    /// Returns [`LinearError::Singular`] if the matrix has no inverse.
    pub fn factorize(&mut self) -> Result<(), LinearError> {
        let lu = self.matrix.clone().lu();
        if !lu.is_invertible() {
            self.factors = None;
            return Err(LinearError::Singular);
        }
        self.factors = Some(lu);
        Ok(())
    }

    /// Solves `A x = b` in place, overwriting `rhs` with `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no factorization, if `rhs` has the wrong
    /// length, or if the solution is not finite.
    pub fn solve(&self, rhs: &mut [f64]) -> Result<(), LinearError> {
        let lu = self.factors.as_ref().ok_or(LinearError::NotFactorized)?;
        if rhs.len() != self.dim() {
            return Err(LinearError::DimensionMismatch {
                expected: self.dim(),
                actual: rhs.len(),
            });
        }

        let mut b = DVector::from_column_slice(rhs);
        if !lu.solve_mut(&mut b) || b.iter().any(|x| !x.is_finite()) {
            return Err(LinearError::Singular);
        }
        rhs.copy_from_slice(b.as_slice());
        Ok(())
    }
}

impl Clone for DenseLinearSolver {
    fn clone(&self) -> Self {
        Self {
            matrix: self.matrix.clone(),
            factors: self.factors.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.matrix.shape() == source.matrix.shape() {
            self.matrix.copy_from(&source.matrix);
        } else {
            self.matrix = source.matrix.clone();
        }
        self.factors.clone_from(&source.factors);
    }
}
