//! Anderson acceleration (type II) for fixed-point iterations.

use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};

/// Singular values below this fraction of the largest are dropped.
const SVD_CUTOFF: f64 = 1e-12;

/// Keeps the last `depth` differences of iterates and residuals.
#[derive(Debug, Clone)]
pub(super) struct Anderson {
    depth: usize,
    damping: f64,
    delta_f: VecDeque<Vec<f64>>,
    delta_g: VecDeque<Vec<f64>>,
    last: Option<(Vec<f64>, Vec<f64>)>,
}

impl Anderson {
    pub(super) fn new(depth: usize, damping: f64) -> Self {
        Self {
            depth,
            damping,
            delta_f: VecDeque::with_capacity(depth),
            delta_g: VecDeque::with_capacity(depth),
            last: None,
        }
    }

    pub(super) fn is_enabled(&self) -> bool {
        self.depth > 0
    }

    /// Computes the next iterate from `g = G(u)` and `f = G(u) − u`.
    ///
    /// `next = g − ΔG·γ − (1 − β)(f − ΔF·γ)`, with `γ` minimizing
    /// `‖f − ΔF·γ‖₂` over the stored differences.
    pub(super) fn next(&mut self, g: &[f64], f: &[f64], next: &mut [f64]) {
        if let Some((g_prev, f_prev)) = self.last.as_mut() {
            if self.delta_f.len() == self.depth {
                self.delta_f.pop_front();
                self.delta_g.pop_front();
            }
            self.delta_f.push_back(f.iter().zip(f_prev.iter()).map(|(a, b)| a - b).collect());
            self.delta_g.push_back(g.iter().zip(g_prev.iter()).map(|(a, b)| a - b).collect());
            g_prev.copy_from_slice(g);
            f_prev.copy_from_slice(f);
        } else {
            self.last = Some((g.to_vec(), f.to_vec()));
        }

        let Some(gamma) = self.coefficients(f) else {
            // No usable history: a plain damped update.
            for ((x, gi), fi) in next.iter_mut().zip(g).zip(f) {
                *x = gi - (1.0 - self.damping) * fi;
            }
            return;
        };

        for (i, x) in next.iter_mut().enumerate() {
            let dg: f64 = self.delta_g.iter().zip(gamma.iter()).map(|(c, y)| c[i] * y).sum();
            let df: f64 = self.delta_f.iter().zip(gamma.iter()).map(|(c, y)| c[i] * y).sum();
            *x = g[i] - dg - (1.0 - self.damping) * (f[i] - df);
        }
    }

    /// Least-squares weights for the current history.
    fn coefficients(&self, f: &[f64]) -> Option<DVector<f64>> {
        let columns = self.delta_f.len();
        if columns == 0 {
            return None;
        }

        let matrix = DMatrix::from_fn(f.len(), columns, |i, j| self.delta_f[j][i]);
        let svd = matrix.svd(true, true);
        let largest = svd.singular_values.max();
        if largest <= 0.0 {
            return None;
        }

        let gamma = svd
            .solve(&DVector::from_column_slice(f), SVD_CUTOFF * largest)
            .ok()?;
        gamma.iter().all(|x| x.is_finite()).then_some(gamma)
    }
}
