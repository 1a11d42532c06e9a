//! Prior external interface (spec §3, §6): per-dimension PDF evaluation,
//! forward draws, and unit-cube mapping, composed dimension-wise into a
//! joint prior whose PDF is the product of its per-dimension factors.

use ndarray::Array1;
use rand::Rng;
use statrs::distribution::{Continuous, ContinuousCDF, Normal as NormalDist};

use crate::error::{NsError, Result};

/// Closed variant set (Design Notes §9: enumerable plug-ins dispatch
/// statically where performance matters).
#[derive(Debug, Clone)]
pub enum Prior {
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, sd: f64 },
    /// Uniform prior discretized onto `levels` equally spaced grid points
    /// spanning `[low, high]`.
    GridUniform { low: f64, high: f64, levels: usize },
}

impl Prior {
    pub fn validate(&self, dim: usize) -> Result<()> {
        match *self {
            Prior::Uniform { low, high } | Prior::GridUniform { low, high, .. } if low >= high => {
                Err(NsError::InvalidPriorBounds { dim, low, high })
            }
            Prior::Normal { sd, .. } if sd <= 0.0 => Err(NsError::InvalidPriorBounds {
                dim,
                low: 0.0,
                high: sd,
            }),
            _ => Ok(()),
        }
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        match *self {
            Prior::Uniform { low, high } => {
                if x >= low && x <= high {
                    -(high - low).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Normal { mean, sd } => {
                let dist = NormalDist::new(mean, sd).expect("validated normal prior");
                dist.ln_pdf(x)
            }
            Prior::GridUniform { low, high, levels } => {
                if x < low || x > high || levels == 0 {
                    return f64::NEG_INFINITY;
                }
                -(high - low).ln()
            }
        }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Uniform { low, high } => rng.gen_range(low..=high),
            Prior::Normal { mean, sd } => {
                let dist = NormalDist::new(mean, sd).expect("validated normal prior");
                use rand::distributions::Distribution;
                dist.sample(rng)
            }
            Prior::GridUniform { low, high, levels } => {
                let step = rng.gen_range(0..levels.max(1));
                low + (high - low) * step as f64 / (levels.max(1) as f64 - 1.0).max(1.0)
            }
        }
    }

    /// Maps a unit-cube coordinate into parameter space, when supported.
    pub fn map_from_unit_cube(&self, u: f64) -> Option<f64> {
        match *self {
            Prior::Uniform { low, high } => Some(low + u * (high - low)),
            Prior::Normal { mean, sd } => {
                let dist = NormalDist::new(mean, sd).expect("validated normal prior");
                Some(dist.inverse_cdf(u.clamp(1e-12, 1.0 - 1e-12)))
            }
            Prior::GridUniform { low, high, levels } => {
                if levels == 0 {
                    return None;
                }
                let idx = ((u * levels as f64).floor() as usize).min(levels - 1);
                Some(low + (high - low) * idx as f64 / (levels as f64 - 1.0).max(1.0))
            }
        }
    }

    pub fn bounding_box(&self) -> (f64, f64) {
        match *self {
            Prior::Uniform { low, high } => (low, high),
            Prior::GridUniform { low, high, .. } => (low, high),
            Prior::Normal { mean, sd } => (mean - 10.0 * sd, mean + 10.0 * sd),
        }
    }
}

/// Dimension-wise composition of `Prior`s; joint PDF is the product
/// (log-sum in log-domain).
#[derive(Debug, Clone)]
pub struct JointPrior {
    dims: Vec<Prior>,
}

impl JointPrior {
    pub fn new(dims: Vec<Prior>) -> Result<JointPrior> {
        for (i, p) in dims.iter().enumerate() {
            p.validate(i)?;
        }
        Ok(JointPrior { dims })
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn log_pdf(&self, theta: &Array1<f64>) -> Result<f64> {
        if theta.len() != self.dims.len() {
            return Err(NsError::DimensionMismatch {
                expected: self.dims.len(),
                got: theta.len(),
            });
        }
        Ok(self
            .dims
            .iter()
            .zip(theta.iter())
            .map(|(p, &x)| p.log_pdf(x))
            .sum())
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        Array1::from_iter(self.dims.iter().map(|p| p.draw(rng)))
    }

    pub fn bounding_box(&self) -> Vec<(f64, f64)> {
        self.dims.iter().map(Prior::bounding_box).collect()
    }

    pub fn dims(&self) -> &[Prior] {
        &self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_pdf_is_zero_outside_bounds() {
        let p = Prior::Uniform {
            low: -1.0,
            high: 1.0,
        };
        assert_eq!(p.log_pdf(2.0), f64::NEG_INFINITY);
        assert_abs_diff_eq!(p.log_pdf(0.0), (0.5f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn joint_prior_rejects_inverted_bounds() {
        let dims = vec![Prior::Uniform { low: 1.0, high: -1.0 }];
        assert!(JointPrior::new(dims).is_err());
    }

    #[test]
    fn joint_prior_is_product_of_dimension_pdfs() {
        let dims = vec![
            Prior::Uniform { low: -1.0, high: 1.0 },
            Prior::Uniform { low: -1.0, high: 1.0 },
        ];
        let joint = JointPrior::new(dims).unwrap();
        let theta = Array1::from(vec![0.0, 0.0]);
        assert_abs_diff_eq!(joint.log_pdf(&theta).unwrap(), (0.25f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn draws_stay_within_support() {
        let dims = vec![Prior::Uniform { low: -5.0, high: 5.0 }];
        let joint = JointPrior::new(dims).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let theta = joint.draw(&mut rng);
            assert!(theta[0] >= -5.0 && theta[0] <= 5.0);
        }
    }

    #[test]
    fn unit_cube_map_round_trips_uniform_bounds() {
        let p = Prior::Uniform { low: 2.0, high: 6.0 };
        assert_abs_diff_eq!(p.map_from_unit_cube(0.0).unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.map_from_unit_cube(1.0).unwrap(), 6.0, epsilon = 1e-12);
    }
}
