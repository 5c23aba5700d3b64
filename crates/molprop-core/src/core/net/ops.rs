//! Small numeric kernels shared by the network layers.
//!
//! All matrix math follows the row-convention used throughout the crate:
//! one row per atom/edge/molecule, one column per feature.

use nalgebra::DMatrix;

/// Element-wise rectified linear unit.
pub fn relu(x: &DMatrix<f64>) -> DMatrix<f64> {
    x.map(|v| v.max(0.0))
}

/// Masks `grad` by the ReLU derivative evaluated at `pre` (the
/// pre-activation values).
pub fn relu_backward(pre: &DMatrix<f64>, grad: &DMatrix<f64>) -> DMatrix<f64> {
    grad.zip_map(pre, |g, p| if p > 0.0 { g } else { 0.0 })
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable `ln(1 + exp(x))`.
pub fn softplus(x: f64) -> f64 {
    if x > 30.0 { x } else { x.exp().ln_1p() }
}

/// Adds the `1 x k` row `bias` to every row of `matrix`.
pub fn add_row_broadcast(matrix: &mut DMatrix<f64>, bias: &DMatrix<f64>) {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            matrix[(i, j)] += bias[(0, j)];
        }
    }
}

/// Returns the `1 x k` row of per-column sums of `matrix`.
pub fn column_sums(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(1, matrix.ncols());
    for j in 0..matrix.ncols() {
        out[(0, j)] = matrix.column(j).sum();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn relu_zeroes_negative_entries_only() {
        let x = DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, 0.0, -0.5]);
        let y = relu(&x);
        assert_eq!(y, DMatrix::from_row_slice(2, 2, &[0.0, 2.0, 0.0, 0.0]));
    }

    #[test]
    fn relu_backward_masks_where_preactivation_is_nonpositive() {
        let pre = DMatrix::from_row_slice(1, 3, &[-1.0, 0.0, 3.0]);
        let grad = DMatrix::from_row_slice(1, 3, &[5.0, 5.0, 5.0]);
        let masked = relu_backward(&pre, &grad);
        assert_eq!(masked, DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 5.0]));
    }

    #[test]
    fn sigmoid_is_stable_and_bounded_at_extremes() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0).is_finite());
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn softplus_matches_naive_formula_in_the_stable_range() {
        for &x in &[-5.0, -1.0, 0.0, 1.0, 5.0] {
            assert_relative_eq!(softplus(x), (1.0f64 + x.exp()).ln(), epsilon = 1e-12);
        }
        assert_relative_eq!(softplus(100.0), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn add_row_broadcast_adds_bias_to_every_row() {
        let mut m = DMatrix::zeros(2, 3);
        let b = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        add_row_broadcast(&mut m, &b);
        assert_eq!(m.row(0), b.row(0));
        assert_eq!(m.row(1), b.row(0));
    }

    #[test]
    fn column_sums_reduces_over_rows() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(column_sums(&m), DMatrix::from_row_slice(1, 2, &[4.0, 6.0]));
    }
}
