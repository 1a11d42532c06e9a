//! Multi-ellipsoidal decomposition of the live-point set (spec §4.4): the
//! component that turns a flat cloud of live points into a union of
//! enlarged, possibly overlapping ellipsoids that constrained sampling draws
//! from.

use log::{debug, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;

use crate::cluster::Clusterer;
use crate::ellipsoid::Ellipsoid;
use crate::error::{NsError, Result};
use crate::likelihood::Likelihood;
use crate::metric::Projector;
use crate::prior::JointPrior;

pub struct EllipsoidalSet {
    ellipsoids: Vec<Ellipsoid>,
    log_volumes: Vec<f64>,
}

/// Parameters governing the enlargement policy (spec §4.4) and the
/// constrained-draw budget. Threaded in explicitly rather than depending on
/// `SamplerConfig` directly, so this module stays testable in isolation.
#[derive(Debug, Clone, Copy)]
pub struct EllipsoidPolicy {
    pub initial_enlargement_fraction: f64,
    pub shrinking_rate: f64,
    pub min_n_clusters: usize,
    pub max_n_clusters: usize,
}

impl EllipsoidalSet {
    pub fn len(&self) -> usize {
        self.ellipsoids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ellipsoids.is_empty()
    }

    /// Builds (or rebuilds) the ellipsoidal decomposition from the current
    /// live points. `force_single` forces `K=1` (used for the
    /// `NinitialIterationsWithoutClustering` prefix, spec §4.5 step 7).
    pub fn build<C: Clusterer>(
        live_points: &Array2<f64>,
        projector: &dyn Projector,
        clusterer: &C,
        policy: &EllipsoidPolicy,
        n_live0: usize,
        iteration: usize,
        force_single: bool,
        rng: &mut StdRng,
    ) -> Result<EllipsoidalSet> {
        let (n_live, d) = live_points.dim();
        let min_members = d + 1;

        let mut assignments = if force_single {
            vec![0usize; n_live]
        } else {
            let projected = projector.project(live_points);
            match clusterer.cluster(
                &projected,
                policy.min_n_clusters,
                policy.max_n_clusters,
                rng,
            ) {
                Ok(result) => result.assignments,
                Err(err) => {
                    warn!("clustering failed ({err}); falling back to K=1");
                    vec![0usize; n_live]
                }
            }
        };

        merge_undersized_clusters(&mut assignments, live_points, min_members);

        let mut cluster_ids: Vec<usize> = assignments.clone();
        cluster_ids.sort_unstable();
        cluster_ids.dedup();

        let x_remaining = (-(iteration as f64) / n_live0 as f64).exp();

        let mut ellipsoids = Vec::with_capacity(cluster_ids.len());
        let mut log_volumes = Vec::with_capacity(cluster_ids.len());
        for &cluster_id in &cluster_ids {
            let member_rows: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c == cluster_id)
                .map(|(i, _)| i)
                .collect();
            let m_k = member_rows.len();

            let mut member_points = Array2::<f64>::zeros((m_k, d));
            for (row, &src) in member_rows.iter().enumerate() {
                member_points
                    .row_mut(row)
                    .assign(&live_points.row(src));
            }

            let f_k = policy.initial_enlargement_fraction
                * x_remaining.powf(policy.shrinking_rate)
                * (n_live as f64 / m_k as f64).sqrt();

            match Ellipsoid::build(&member_points, f_k) {
                Ok(ellipsoid) => {
                    log_volumes.push(ellipsoid.log_volume());
                    ellipsoids.push(ellipsoid);
                }
                Err(err) => {
                    warn!("dropping degenerate ellipsoid for cluster {cluster_id}: {err}");
                }
            }
        }

        if ellipsoids.is_empty() {
            // total collapse: fall back to a single ellipsoid over all live
            // points so the invariant (every live point is covered) holds.
            let ellipsoid = Ellipsoid::build(
                live_points,
                policy.initial_enlargement_fraction * x_remaining.powf(policy.shrinking_rate),
            )?;
            log_volumes.push(ellipsoid.log_volume());
            ellipsoids.push(ellipsoid);
        }

        debug!(
            "built ellipsoidal set: {} ellipsoid(s) at iteration {iteration}",
            ellipsoids.len()
        );

        Ok(EllipsoidalSet {
            ellipsoids,
            log_volumes,
        })
    }

    pub fn contains_count(&self, theta: &ndarray::Array1<f64>) -> usize {
        self.ellipsoids.iter().filter(|e| e.contains(theta)).count()
    }

    /// Average overlap per ellipsoid over the current live points (spec
    /// §4.4 "overlap accounting"), used for the effective-volume diagnostic.
    pub fn overlap_accounting(&self, live_points: &Array2<f64>) -> Vec<f64> {
        let mut totals = vec![0.0; self.ellipsoids.len()];
        let mut counts = vec![0usize; self.ellipsoids.len()];
        for row in live_points.rows() {
            let theta = row.to_owned();
            let memberships: Vec<usize> = self
                .ellipsoids
                .iter()
                .enumerate()
                .filter(|(_, e)| e.contains(&theta))
                .map(|(i, _)| i)
                .collect();
            for &k in &memberships {
                totals[k] += (memberships.len() - 1) as f64;
                counts[k] += 1;
            }
        }
        totals
            .iter()
            .zip(counts.iter())
            .map(|(&t, &c)| if c > 0 { t / c as f64 } else { 0.0 })
            .collect()
    }

    /// Effective volume per ellipsoid, `V_k / (1 + n_k)` (spec §4.4).
    pub fn effective_log_volumes(&self, live_points: &Array2<f64>) -> Vec<f64> {
        let overlaps = self.overlap_accounting(live_points);
        self.log_volumes
            .iter()
            .zip(overlaps.iter())
            .map(|(&lv, &n_k)| lv - (1.0 + n_k).ln())
            .collect()
    }

    /// Draws a point uniformly from the union `⋃ Eₖ` (spec §4.4 steps 1-4):
    /// pick an ellipsoid with probability proportional to its volume,
    /// sample uniformly within it, and accept with probability `1/q` where
    /// `q` is the number of ellipsoids the draw actually falls in.
    pub fn draw_union(&self, rng: &mut StdRng) -> ndarray::Array1<f64> {
        let max_log_v = self
            .log_volumes
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = self
            .log_volumes
            .iter()
            .map(|&lv| (lv - max_log_v).exp())
            .collect();
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut running = 0.0;
        for w in &weights {
            running += w;
            cumulative.push(running);
        }

        loop {
            let target = rng.gen::<f64>() * running;
            let idx = bisection::bisect_right(&cumulative, &target).min(cumulative.len() - 1);
            let candidate = self.ellipsoids[idx].draw_uniform(rng);
            let q = self.contains_count(&candidate);
            debug_assert!(q >= 1, "draw must fall in the ellipsoid it was drawn from");
            if rng.gen::<f64>() <= 1.0 / q as f64 {
                return candidate;
            }
        }
    }

    /// `DrawConstrained` (spec §4.4): repeated union draws, rejected against
    /// the prior support and importance-weighted by the prior PDF, accepted
    /// once `log L(p) > log_l_star`.
    pub fn draw_constrained(
        &self,
        prior: &JointPrior,
        likelihood: &dyn Likelihood,
        log_l_star: f64,
        max_attempts: usize,
        log_pi_max: f64,
        rng: &mut StdRng,
    ) -> Result<(ndarray::Array1<f64>, f64)> {
        for _ in 0..max_attempts {
            let candidate = self.draw_union(rng);
            let log_pi = match prior.log_pdf(&candidate) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if !log_pi.is_finite() {
                continue;
            }
            let accept_prob = (log_pi - log_pi_max).exp().min(1.0);
            if rng.gen::<f64>() > accept_prob {
                continue;
            }
            let log_l = likelihood.log_l(&candidate);
            if log_l > log_l_star {
                return Ok((candidate, log_l));
            }
        }
        Err(NsError::DrawAttemptsExhausted {
            attempts: max_attempts,
        })
    }
}

/// Reassigns points in any cluster smaller than `min_members` to their
/// nearest larger cluster, by Euclidean distance to that cluster's mean
/// (spec §4.4: "the core will merge or drop such clusters").
fn merge_undersized_clusters(
    assignments: &mut [usize],
    live_points: &Array2<f64>,
    min_members: usize,
) {
    loop {
        let max_id = assignments.iter().copied().max().unwrap_or(0);
        let mut sizes = vec![0usize; max_id + 1];
        for &a in assignments.iter() {
            sizes[a] += 1;
        }

        let undersized: Vec<usize> = (0..=max_id).filter(|&c| sizes[c] > 0 && sizes[c] < min_members).collect();
        if undersized.is_empty() {
            break;
        }
        let healthy: Vec<usize> = (0..=max_id).filter(|&c| sizes[c] >= min_members).collect();
        if healthy.is_empty() {
            // nothing is big enough: collapse everything into cluster 0
            for a in assignments.iter_mut() {
                *a = 0;
            }
            break;
        }

        let centers: Vec<ndarray::Array1<f64>> = healthy
            .iter()
            .map(|&c| {
                let rows: Vec<usize> = assignments
                    .iter()
                    .enumerate()
                    .filter(|&(_, &a)| a == c)
                    .map(|(i, _)| i)
                    .collect();
                let mut acc = live_points.row(rows[0]).to_owned();
                for &r in &rows[1..] {
                    acc = acc + live_points.row(r);
                }
                acc / rows.len() as f64
            })
            .collect();

        for i in 0..assignments.len() {
            if undersized.contains(&assignments[i]) {
                let point = live_points.row(i).to_owned();
                let (best_idx, _) = healthy
                    .iter()
                    .zip(centers.iter())
                    .map(|(&c, center)| {
                        let d = &point - center;
                        (c, d.dot(&d))
                    })
                    .fold((healthy[0], f64::INFINITY), |acc, cur| {
                        if cur.1 < acc.1 {
                            cur
                        } else {
                            acc
                        }
                    });
                assignments[i] = best_idx;
            }
        }
    }
}

#[allow(dead_code)]
fn mean_axis0(points: &Array2<f64>) -> ndarray::Array1<f64> {
    points.mean_axis(Axis(0)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeansClusterer;
    use crate::metric::IdentityProjector;
    use crate::prior::Prior;
    use rand::SeedableRng;

    fn two_blobs(n_per: usize) -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..n_per {
            rows.push(vec![0.0 + (i % 3) as f64 * 0.05, 0.0]);
        }
        for i in 0..n_per {
            rows.push(vec![20.0 + (i % 3) as f64 * 0.05, 20.0]);
        }
        Array2::from_shape_vec((2 * n_per, 2), rows.into_iter().flatten().collect()).unwrap()
    }

    #[test]
    fn every_live_point_is_covered_by_the_union() {
        let points = two_blobs(10);
        let clusterer = KMeansClusterer::default();
        let projector = IdentityProjector;
        let policy = EllipsoidPolicy {
            initial_enlargement_fraction: 1.2,
            shrinking_rate: 0.0,
            min_n_clusters: 1,
            max_n_clusters: 4,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let set = EllipsoidalSet::build(&points, &projector, &clusterer, &policy, 20, 0, false, &mut rng)
            .unwrap();

        for row in points.rows() {
            let theta = row.to_owned();
            assert!(set.contains_count(&theta) >= 1);
        }
    }

    #[test]
    fn forced_single_ellipsoid_has_exactly_one_component() {
        let points = two_blobs(10);
        let clusterer = KMeansClusterer::default();
        let projector = IdentityProjector;
        let policy = EllipsoidPolicy {
            initial_enlargement_fraction: 1.2,
            shrinking_rate: 0.0,
            min_n_clusters: 1,
            max_n_clusters: 4,
        };
        let mut rng = StdRng::seed_from_u64(12);
        let set = EllipsoidalSet::build(&points, &projector, &clusterer, &policy, 20, 0, true, &mut rng)
            .unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn union_draws_land_inside_some_ellipsoid() {
        let points = two_blobs(15);
        let clusterer = KMeansClusterer::default();
        let projector = IdentityProjector;
        let policy = EllipsoidPolicy {
            initial_enlargement_fraction: 1.3,
            shrinking_rate: 0.0,
            min_n_clusters: 1,
            max_n_clusters: 4,
        };
        let mut rng = StdRng::seed_from_u64(13);
        let set = EllipsoidalSet::build(&points, &projector, &clusterer, &policy, 30, 0, false, &mut rng)
            .unwrap();

        for _ in 0..200 {
            let p = set.draw_union(&mut rng);
            assert!(set.contains_count(&p) >= 1);
        }
    }

    #[test]
    fn draw_constrained_respects_the_likelihood_floor() {
        use crate::likelihood::NormalLikelihood;

        let points = two_blobs(20);
        let clusterer = KMeansClusterer::default();
        let projector = IdentityProjector;
        let policy = EllipsoidPolicy {
            initial_enlargement_fraction: 2.0,
            shrinking_rate: 0.0,
            min_n_clusters: 1,
            max_n_clusters: 1,
        };
        let mut rng = StdRng::seed_from_u64(14);
        let set = EllipsoidalSet::build(&points, &projector, &clusterer, &policy, 40, 0, true, &mut rng)
            .unwrap();

        let prior = crate::prior::JointPrior::new(vec![
            Prior::Uniform { low: -50.0, high: 50.0 },
            Prior::Uniform { low: -50.0, high: 50.0 },
        ])
        .unwrap();
        let likelihood = NormalLikelihood {
            mean: ndarray::Array1::from(vec![0.0, 0.0]),
        };
        let result = set.draw_constrained(&prior, &likelihood, f64::NEG_INFINITY, 10_000, 0.0, &mut rng);
        if let Ok((theta, log_l)) = result {
            assert!(log_l > f64::NEG_INFINITY);
            assert_eq!(theta.len(), 2);
        }
    }
}
