//! Variable-step BDF coefficients.
//!
//! The corrector differentiates the Lagrange interpolant through the new
//! point and the last `k` accepted points. The predictor extrapolates the
//! interpolant through the last `k + 1` accepted points.

use super::record::MAX_ORDER;

/// Coefficients `a` such that `y'(t_new) ≈ a[0]·y_new + Σ a[j]·history[j-1]`.
///
/// `times` holds the history times, most recent first, and must contain at
/// least `order` entries.
pub(super) fn corrector(t_new: f64, times: &[f64], order: usize) -> [f64; MAX_ORDER + 1] {
    let mut alpha = [0.0; MAX_ORDER + 1];

    alpha[0] = times[..order].iter().map(|&tm| 1.0 / (t_new - tm)).sum();

    for j in 1..=order {
        let tj = times[j - 1];
        let mut product = 1.0 / (tj - t_new);
        for (m, &tm) in times[..order].iter().enumerate() {
            if m + 1 != j {
                product *= (t_new - tm) / (tj - tm);
            }
        }
        alpha[j] = product;
    }

    alpha
}

/// Lagrange weights for evaluating the polynomial through `times[..=degree]`
/// at `t`.
pub(super) fn extrapolation(t: f64, times: &[f64], degree: usize) -> [f64; MAX_ORDER + 1] {
    let mut weights = [0.0; MAX_ORDER + 1];
    let nodes = &times[..=degree];

    for (j, &tj) in nodes.iter().enumerate() {
        weights[j] = nodes
            .iter()
            .enumerate()
            .filter(|&(m, _)| m != j)
            .map(|(_, &tm)| (t - tm) / (tj - tm))
            .product();
    }

    weights
}
