//! Per-row weighted ridge regression used by both ALS half-steps.

use crate::error::{RecError, Result};
use ndarray::{Array1, Array2, ArrayView2};

/// Solve `A * x = b` by Cholesky decomposition.
///
/// `A` must be symmetric positive definite.
pub fn solve_cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(RecError::Solver(format!(
            "shape mismatch: A is {}x{}, b has {} entries",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if !(diag > 0.0) {
                    return Err(RecError::Solver(format!(
                        "matrix is not positive definite (pivot {} = {})",
                        i, diag
                    )));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

/// Solve one factor row against the fixed factors of the other side.
///
/// Builds `(Fᵗ C F + λI) x = Fᵗ C r` where `F` holds the rows of `fixed`
/// selected by `indices`, `C = diag(|confidence|)` and `r = confidence`.
pub fn solve_row(
    indices: &[u32],
    confidences: &[f32],
    fixed: ArrayView2<'_, f32>,
    regularization: f64,
) -> Result<Array1<f32>> {
    let k = fixed.ncols();
    let mut a = Array2::<f64>::zeros((k, k));
    let mut b = Array1::<f64>::zeros(k);

    for (&idx, &value) in indices.iter().zip(confidences.iter()) {
        if value == 0.0 {
            continue;
        }
        let weight = value.abs() as f64;
        let target = value as f64;
        let vec = fixed.row(idx as usize);

        for i in 0..k {
            let vi = vec[i] as f64;
            for j in 0..=i {
                a[[i, j]] += weight * vi * vec[j] as f64;
            }
            b[i] += weight * target * vi;
        }
    }

    for i in 0..k {
        for j in 0..i {
            a[[j, i]] = a[[i, j]];
        }
        a[[i, i]] += regularization;
    }

    let x = solve_cholesky(&a, &b)?;
    Ok(x.mapv(|v| v as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_identity() {
        let a = Array2::<f64>::eye(3);
        let b = array![1.0, 2.0, 3.0];
        let x = solve_cholesky(&a, &b).unwrap();
        assert_eq!(x, b);
    }

    #[test]
    fn test_cholesky_spd_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_cholesky(&a, &b).unwrap();

        let residual = a.dot(&x) - &b;
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        let b = array![1.0, 1.0];
        assert!(matches!(
            solve_cholesky(&a, &b),
            Err(RecError::Solver(_))
        ));
    }

    #[test]
    fn test_solve_row_single_observation() {
        // One item with factor [1, 0] and confidence 5: x0 = 25 / (5 + λ)
        let fixed = array![[1.0f32, 0.0], [0.0, 1.0]];
        let x = solve_row(&[0], &[5.0], fixed.view(), 0.5).unwrap();

        assert!((x[0] - 25.0 / 5.5).abs() < 1e-5);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_solve_row_negative_confidence_pulls_away() {
        let fixed = array![[1.0f32, 0.0], [0.0, 1.0]];
        let x = solve_row(&[1], &[-2.0], fixed.view(), 0.1).unwrap();

        assert!(x[1] < 0.0);
        assert_eq!(x[0], 0.0);
    }

    #[test]
    fn test_solve_row_without_signal_is_zero() {
        let fixed = array![[0.3f32, -0.2]];
        let x = solve_row(&[0], &[0.0], fixed.view(), 0.1).unwrap();
        assert_eq!(x, array![0.0f32, 0.0]);
    }
}
