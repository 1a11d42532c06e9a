//! Small-matrix symmetric eigen-decomposition.
//!
//! Ellipsoid construction needs the eigenvalues/eigenvectors of a `D x D`
//! covariance-like matrix for the dimensionalities nested sampling typically
//! targets (a handful up to a few dozen parameters). The cyclic Jacobi
//! eigenvalue algorithm is the standard choice at this scale: it needs no
//! external LAPACK binding, is numerically stable for symmetric matrices, and
//! converges quadratically once off-diagonal elements are small.

use ndarray::{Array1, Array2};

/// Eigenvalues (ascending) and corresponding eigenvectors (columns) of a
/// symmetric matrix. Returns `None` if the sweep limit is reached without the
/// off-diagonal mass falling below `tol` — the caller treats this as
/// `NUMERICAL_DEGENERACY` and marks the ellipsoid degenerate.
pub fn jacobi_eigen_symmetric(
    a: &Array2<f64>,
    max_sweeps: usize,
    tol: f64,
) -> Option<(Array1<f64>, Array2<f64>)> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "jacobi_eigen_symmetric requires a square matrix");

    let mut m = a.clone();
    let mut v = Array2::<f64>::eye(n);

    if n <= 1 {
        return Some((m.diag().to_owned(), v));
    }

    for _ in 0..max_sweeps {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[[p, q]] * m[[p, q]];
            }
        }
        if off.sqrt() < tol {
            return Some((m.diag().to_owned(), v));
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() < f64::EPSILON {
                    continue;
                }
                let app = m[[p, p]];
                let aqq = m[[q, q]];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut off = 0.0;
    for p in 0..n {
        for q in (p + 1)..n {
            off += m[[p, q]] * m[[p, q]];
        }
    }
    if off.sqrt() < tol {
        Some((m.diag().to_owned(), v))
    } else {
        None
    }
}

/// Sorts eigenvalues ascending, permuting eigenvector columns to match.
pub fn sort_ascending(values: &mut Array1<f64>, vectors: &mut Array2<f64>) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].partial_cmp(&values[j]).unwrap());

    let sorted_values = Array1::from_iter(order.iter().map(|&i| values[i]));
    let mut sorted_vectors = Array2::<f64>::zeros(vectors.raw_dim());
    for (new_col, &old_col) in order.iter().enumerate() {
        sorted_vectors
            .column_mut(new_col)
            .assign(&vectors.column(old_col));
    }
    *values = sorted_values;
    *vectors = sorted_vectors;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_has_unit_eigenvalues() {
        let a = Array2::<f64>::eye(3);
        let (mut values, mut vectors) = jacobi_eigen_symmetric(&a, 100, 1e-12).unwrap();
        sort_ascending(&mut values, &mut vectors);
        for &lambda in values.iter() {
            assert_abs_diff_eq!(lambda, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn diagonal_matrix_recovers_its_diagonal() {
        let mut a = Array2::<f64>::zeros((3, 3));
        a[[0, 0]] = 4.0;
        a[[1, 1]] = 1.0;
        a[[2, 2]] = 9.0;
        let (mut values, mut vectors) = jacobi_eigen_symmetric(&a, 100, 1e-12).unwrap();
        sort_ascending(&mut values, &mut vectors);
        assert_abs_diff_eq!(values[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[1], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[2], 9.0, epsilon = 1e-9);
    }

    #[test]
    fn reconstructs_symmetric_matrix() {
        let a = Array2::from_shape_vec((2, 2), vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        let (values, vectors) = jacobi_eigen_symmetric(&a, 100, 1e-12).unwrap();
        let lambda = Array2::from_diag(&values);
        let reconstructed = vectors.dot(&lambda).dot(&vectors.t());
        for ((i, j), &val) in reconstructed.indexed_iter() {
            assert_abs_diff_eq!(val, a[[i, j]], epsilon = 1e-9);
        }
    }
}
