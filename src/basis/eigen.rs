//! Symmetric eigendecomposition (cyclic Jacobi).
//!
//! Jacobi is deterministic for a given input: rotations are applied in a
//! fixed `(p, q)` sweep order, so the same covariance always yields the same
//! eigenvalues in the same order. Eigenvalues are reported in diagonal order,
//! which is the scan order used by [`select_dominant`].

use crate::error::{Result, StrataError};
use ndarray::{Array1, Array2, ArrayView1};

const MAX_SWEEPS: usize = 100;

/// Off-diagonal mass below which the matrix counts as diagonal, relative to
/// its Frobenius norm.
const TOLERANCE: f64 = 1e-15;

/// Eigenvalues (diagonal order) and matching unit eigenvectors.
#[derive(Debug, Clone)]
pub struct Eigen {
    pub values: Array1<f64>,
    /// Column `i` belongs to `values[i]`.
    pub vectors: Array2<f64>,
}

/// An eigenvalue with its L2-normalised eigenvector.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenPair {
    pub value: f64,
    pub vector: Array1<f64>,
}

fn off_diagonal(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    let mut sum = 0.0;
    for p in 0..n {
        for q in (p + 1)..n {
            sum += a[[p, q]] * a[[p, q]];
        }
    }
    sum
}

/// Eigendecomposition of a symmetric matrix.
pub fn jacobi(matrix: &Array2<f64>) -> Result<Eigen> {
    let (n, cols) = matrix.dim();
    if n == 0 {
        return Err(StrataError::precondition(
            "eigen_decompose",
            "empty covariance matrix",
        ));
    }
    if n != cols || !matrix.iter().all(|x| x.is_finite()) {
        return Err(StrataError::precondition(
            "eigen_decompose",
            "covariance matrix is not square or has non-finite entries",
        ));
    }

    let mut a = matrix.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let scale: f64 = a.iter().map(|x| x * x).sum();
    let threshold = TOLERANCE * TOLERANCE * scale;

    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        let off = off_diagonal(&a);
        if off <= threshold || off == 0.0 {
            converged = true;
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // A <- A·J
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                // A <- Jᵀ·A
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                // V <- V·J
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    if !converged && off_diagonal(&a) > threshold {
        return Err(StrataError::precondition(
            "eigen_decompose",
            format!("Jacobi did not converge in {MAX_SWEEPS} sweeps"),
        ));
    }

    Ok(Eigen {
        values: a.diag().to_owned(),
        vectors: v,
    })
}

/// Index of the dominant eigenvalue: the first value strictly greater than
/// every value before it. Ties keep the earlier index.
pub fn select_dominant(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

/// Scale a vector to unit L2 length.
pub fn normalize(vector: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let norm = vector.dot(&vector).sqrt();
    if !(norm.is_finite() && norm > 0.0) {
        return Err(StrataError::precondition(
            "eigen_decompose",
            "eigenvector has zero or non-finite length",
        ));
    }
    Ok(vector.mapv(|x| x / norm))
}

/// Dominant eigenpair of a symmetric matrix, eigenvector L2-normalised.
pub fn dominant(matrix: &Array2<f64>) -> Result<EigenPair> {
    let eigen = jacobi(matrix)?;
    let values = eigen.values.to_vec();
    let idx = select_dominant(&values).ok_or_else(|| {
        StrataError::precondition("eigen_decompose", "no eigenvalues")
    })?;
    Ok(EigenPair {
        value: values[idx],
        vector: normalize(eigen.vectors.column(idx))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn tie_break_keeps_first_maximum() {
        assert_eq!(select_dominant(&[3.0, 3.0, 1.0]), Some(0));
        assert_eq!(select_dominant(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(select_dominant(&[0.0, 0.0]), Some(0));
        assert_eq!(select_dominant(&[]), None);
    }

    #[test]
    fn diagonal_tie_selects_first_axis() {
        let m = arr2(&[[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 1.0]]);
        let pair = dominant(&m).unwrap();
        assert_eq!(pair.value, 3.0);
        assert_eq!(pair.vector, arr1(&[1.0, 0.0, 0.0]));
    }

    #[test]
    fn two_by_two() {
        // Eigenvalues 3 and 1, dominant eigenvector (1, 1)/sqrt(2).
        let m = arr2(&[[2.0, 1.0], [1.0, 2.0]]);
        let pair = dominant(&m).unwrap();
        assert!(close(pair.value, 3.0, 1e-12));
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!(close(pair.vector[0].abs(), h, 1e-12));
        assert!(close(pair.vector[1].abs(), h, 1e-12));
        assert!(pair.vector[0] * pair.vector[1] > 0.0);
    }

    #[test]
    fn reconstructs_eigen_equation() {
        let m = arr2(&[[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]]);
        let eigen = jacobi(&m).unwrap();
        for (i, lambda) in eigen.values.iter().enumerate() {
            let v = eigen.vectors.column(i);
            let mv = m.dot(&v);
            for row in 0..3 {
                assert!(close(mv[row], lambda * v[row], 1e-9));
            }
        }
        assert!(close(eigen.values.sum(), 8.0, 1e-9));
    }

    #[test]
    fn deterministic() {
        let m = arr2(&[[1.0, 0.3], [0.3, 0.5]]);
        let a = dominant(&m).unwrap();
        let b = dominant(&m).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(jacobi(&Array2::zeros((0, 0))).is_err());
        assert!(jacobi(&Array2::zeros((2, 3))).is_err());
        assert!(jacobi(&arr2(&[[f64::NAN]])).is_err());
        assert!(normalize(arr1(&[0.0, 0.0]).view()).is_err());
    }
}
