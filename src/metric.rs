//! Distance metric and optional dimensionality-reduction plug-ins consumed
//! by the clusterer (spec §4.2, §6).

use ndarray::{Array1, Array2, ArrayView1};

use crate::linalg::{jacobi_eigen_symmetric, sort_ascending};

pub trait Metric: Sync {
    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64;
}

/// Default metric: ordinary Euclidean distance in parameter space.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMetric;

impl Metric for EuclideanMetric {
    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }
}

/// Projects the live-point cloud into a lower-dimensional space before
/// clustering. The core treats this as opaque; identity is the default.
pub trait Projector: Sync {
    fn project(&self, points: &Array2<f64>) -> Array2<f64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjector;

impl Projector for IdentityProjector {
    fn project(&self, points: &Array2<f64>) -> Array2<f64> {
        points.clone()
    }
}

/// Projects onto the leading `n_components` principal axes of the live-point
/// cloud's covariance, reusing the same eigensolver the ellipsoid builder
/// uses. Falls back to the identity projection if the covariance is
/// degenerate or `n_components >= D`.
pub struct PcaProjector {
    pub n_components: usize,
}

impl Projector for PcaProjector {
    fn project(&self, points: &Array2<f64>) -> Array2<f64> {
        let (m, d) = points.dim();
        if self.n_components == 0 || self.n_components >= d || m < d + 1 {
            return points.clone();
        }

        let mean = points.mean_axis(ndarray::Axis(0)).unwrap();
        let centered = points - &mean.view().insert_axis(ndarray::Axis(0));
        let cov = centered.t().dot(&centered) / m as f64;

        match jacobi_eigen_symmetric(&cov, 100, 1e-10) {
            Some((mut values, mut vectors)) => {
                sort_ascending(&mut values, &mut vectors);
                // take the `n_components` axes with the largest eigenvalues
                let top = vectors.slice(ndarray::s![.., (d - self.n_components)..d]);
                centered.dot(&top)
            }
            None => points.clone(),
        }
    }
}

#[allow(dead_code)]
fn mean_point(points: &Array2<f64>) -> Array1<f64> {
    points.mean_axis(ndarray::Axis(0)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn euclidean_distance_matches_pythagoras() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        let metric = EuclideanMetric;
        assert_abs_diff_eq!(metric.distance(a.view(), b.view()), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn identity_projector_is_a_no_op() {
        let points = Array2::from_shape_vec((2, 3), (0..6).map(|x| x as f64).collect()).unwrap();
        let projected = IdentityProjector.project(&points);
        assert_eq!(projected, points);
    }

    #[test]
    fn pca_projector_reduces_dimensionality() {
        let points = Array2::from_shape_vec(
            (6, 2),
            vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, -1.0, -1.0, -2.0, -2.0, 0.5, 0.5],
        )
        .unwrap();
        let projected = PcaProjector { n_components: 1 }.project(&points);
        assert_eq!(projected.ncols(), 1);
    }
}
