//! The clusterer external interface (spec §4.2) and its default
//! implementation: Lloyd's-algorithm k-means wrapped in an X-means-style
//! search over `k ∈ [k_min, k_max]`, selecting `k` by Bayesian Information
//! Criterion. Grounded on the teacher pack's k-means harness
//! (`krukah/robopoker`'s `clustering::kmeans`): nearest-neighbor assignment,
//! centroid recomputation from assigned points, logged progress.

use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::Rng;

use crate::error::{NsError, Result};
use crate::metric::{EuclideanMetric, Metric};

pub struct ClusterResult {
    pub k: usize,
    pub assignments: Vec<usize>,
    pub centers: Array2<f64>,
}

/// Contract: given the (optionally projected) live-point matrix and a
/// search range, return a chosen `k`, per-point assignment, and centers.
/// Implementations need not guarantee `k` monotonicity between rebuilds, and
/// must tolerate duplicate points and small clusters — the core merges or
/// drops undersized clusters itself (spec §4.4).
pub trait Clusterer: Sync {
    fn cluster<R: Rng + ?Sized>(
        &self,
        points: &Array2<f64>,
        k_min: usize,
        k_max: usize,
        rng: &mut R,
    ) -> Result<ClusterResult>;
}

#[derive(Debug, Clone)]
pub struct KMeansClusterer {
    pub max_iterations: usize,
    pub metric: EuclideanMetric,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        KMeansClusterer {
            max_iterations: 100,
            metric: EuclideanMetric,
        }
    }
}

impl KMeansClusterer {
    fn run_k_means<R: Rng + ?Sized>(
        &self,
        points: &Array2<f64>,
        k: usize,
        rng: &mut R,
    ) -> (Vec<usize>, Array2<f64>) {
        let (m, d) = points.dim();
        let init_idx = sample(rng, m, k);
        let mut centers = Array2::<f64>::zeros((k, d));
        for (j, idx) in init_idx.iter().enumerate() {
            centers.row_mut(j).assign(&points.row(idx));
        }

        let mut assignments = vec![0usize; m];
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for i in 0..m {
                let point = points.row(i);
                let (best, _) = (0..k)
                    .map(|c| (c, self.metric.distance(point, centers.row(c))))
                    .fold((0usize, f64::INFINITY), |acc, cur| {
                        if cur.1 < acc.1 {
                            cur
                        } else {
                            acc
                        }
                    });
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }

            let mut sums = Array2::<f64>::zeros((k, d));
            let mut counts = vec![0usize; k];
            for i in 0..m {
                let c = assignments[i];
                sums.row_mut(c).scaled_add(1.0, &points.row(i));
                counts[c] += 1;
            }
            for c in 0..k {
                if counts[c] > 0 {
                    centers.row_mut(c).assign(&(&sums.row(c) / counts[c] as f64));
                }
            }

            if !changed {
                break;
            }
        }

        (assignments, centers)
    }

    /// Bayesian Information Criterion for a k-means partition under a
    /// spherical-Gaussian-per-cluster model: `BIC = -2 ln L + p ln m`.
    fn bic(&self, points: &Array2<f64>, assignments: &[usize], centers: &Array2<f64>) -> f64 {
        let (m, d) = points.dim();
        let k = centers.nrows();

        let mut rss = 0.0;
        let mut counts = vec![0usize; k];
        for i in 0..m {
            let c = assignments[i];
            counts[c] += 1;
            let dist = self.metric.distance(points.row(i), centers.row(c));
            rss += dist * dist;
        }

        let variance = (rss / ((m.saturating_sub(k)).max(1) * d) as f64).max(1e-12);
        let mut log_lik = 0.0;
        for i in 0..m {
            let c = assignments[i];
            let dist = self.metric.distance(points.row(i), centers.row(c));
            log_lik += -0.5 * d as f64 * (2.0 * std::f64::consts::PI * variance).ln()
                - 0.5 * dist * dist / variance;
        }
        for &count in &counts {
            if count > 0 {
                log_lik += (count as f64) * (count as f64 / m as f64).ln();
            }
        }

        let n_params = k * d + k;
        -2.0 * log_lik + (n_params as f64) * (m as f64).ln()
    }
}

impl Clusterer for KMeansClusterer {
    fn cluster<R: Rng + ?Sized>(
        &self,
        points: &Array2<f64>,
        k_min: usize,
        k_max: usize,
        rng: &mut R,
    ) -> Result<ClusterResult> {
        let m = points.nrows();
        if m == 0 {
            return Err(NsError::ClusteringFailed {
                reason: "no points to cluster".to_string(),
            });
        }
        let k_max = k_max.min(m).max(1);
        let k_min = k_min.max(1).min(k_max);

        let mut best: Option<(f64, usize, Vec<usize>, Array2<f64>)> = None;
        for k in k_min..=k_max {
            let (assignments, centers) = self.run_k_means(points, k, rng);
            let score = self.bic(points, &assignments, &centers);
            debug!("k-means candidate k={k} bic={score:.3}");
            // ties resolved toward the smallest k (spec §9 open question)
            let is_better = match &best {
                None => true,
                Some((best_score, best_k, _, _)) => {
                    score < *best_score - 1e-9 || (k < *best_k && (score - *best_score).abs() < 1e-9)
                }
            };
            if is_better {
                best = Some((score, k, assignments, centers));
            }
        }

        let (_, k, assignments, centers) = best.ok_or_else(|| NsError::ClusteringFailed {
            reason: "empty k search range".to_string(),
        })?;
        Ok(ClusterResult {
            k,
            assignments,
            centers,
        })
    }
}

#[allow(dead_code)]
fn cluster_sizes(assignments: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    for &a in assignments {
        sizes[a] += 1;
    }
    sizes
}

#[allow(dead_code)]
fn mean_row(points: &Array2<f64>) -> Array1<f64> {
    points.mean_axis(Axis(0)).unwrap()
}
