//! Likelihood external interface (spec §3, §6): a pure `θ ↦ log L(θ)`
//! function, plus the concrete likelihoods named in the end-to-end
//! scenarios (spec §8).

use ndarray::Array1;
use std::f64::consts::PI;

pub trait Likelihood: Sync {
    /// Must be pure: identical `theta` always yields an identical result.
    /// May return `-inf` for disallowed regions.
    fn log_l(&self, theta: &Array1<f64>) -> f64;
}

/// Isotropic Gaussian bowl `L(θ) = exp(-|θ|²/2) / (2π)^{D/2}`, used in the
/// single 2D Gaussian evidence-recovery scenario (spec §8 scenario 1).
pub struct NormalLikelihood {
    pub mean: Array1<f64>,
}

impl Likelihood for NormalLikelihood {
    fn log_l(&self, theta: &Array1<f64>) -> f64 {
        let d = theta.len() as f64;
        let delta = theta - &self.mean;
        let sq_norm: f64 = delta.dot(&delta);
        -0.5 * sq_norm - 0.5 * d * (2.0 * PI).ln()
    }
}

/// The "eggbox" likelihood (spec §8 scenario 2):
/// `log L(x, y) = (2 + cos(x/2)·cos(y/2))^5`.
pub struct EggboxLikelihood;

impl Likelihood for EggboxLikelihood {
    fn log_l(&self, theta: &Array1<f64>) -> f64 {
        assert_eq!(theta.len(), 2, "eggbox likelihood is defined in 2D");
        let x = theta[0];
        let y = theta[1];
        (2.0 + (x / 2.0).cos() * (y / 2.0).cos()).powi(5)
    }
}

/// Rosenbrock ("banana") likelihood (spec §8 scenario 3):
/// `log L(x, y) = -[100(y - x²)² + (1 - x)²] / 20`.
pub struct RosenbrockLikelihood;

impl Likelihood for RosenbrockLikelihood {
    fn log_l(&self, theta: &Array1<f64>) -> f64 {
        assert_eq!(theta.len(), 2, "rosenbrock likelihood is defined in 2D");
        let x = theta[0];
        let y = theta[1];
        -(100.0 * (y - x * x).powi(2) + (1.0 - x).powi(2)) / 20.0
    }
}

/// Gaussian-noise regression likelihood: `θ` parametrizes `model`, which
/// predicts `y` at each `covariate`; residuals against `observations` are
/// weighted by `uncertainties` (spec §6 input table, §8 scenario 4). This
/// generalizes the teacher's single-column observation reader into a
/// reusable likelihood for any closed-form forward model.
pub struct RegressionLikelihood<M>
where
    M: Fn(&Array1<f64>, f64) -> f64 + Sync,
{
    pub model: M,
    pub covariates: Array1<f64>,
    pub observations: Array1<f64>,
    pub uncertainties: Array1<f64>,
}

impl<M> Likelihood for RegressionLikelihood<M>
where
    M: Fn(&Array1<f64>, f64) -> f64 + Sync,
{
    fn log_l(&self, theta: &Array1<f64>) -> f64 {
        let mut log_l = 0.0;
        for ((&x, &y_obs), &sigma) in self
            .covariates
            .iter()
            .zip(self.observations.iter())
            .zip(self.uncertainties.iter())
        {
            if sigma <= 0.0 {
                return f64::NEG_INFINITY;
            }
            let y_hat = (self.model)(theta, x);
            let residual = y_obs - y_hat;
            log_l += -0.5 * (residual * residual) / (sigma * sigma)
                - 0.5 * (2.0 * PI * sigma * sigma).ln();
        }
        log_l
    }
}

/// Single-Lorentzian ("peak bagging") forward model: `θ = [centroid,
/// amplitude, linewidth]`, evaluated as a Lorentzian profile. Pairs with
/// `RegressionLikelihood` for spec §8 scenario 4.
pub fn lorentzian_model(theta: &Array1<f64>, x: f64) -> f64 {
    let centroid = theta[0];
    let amplitude = theta[1];
    let gamma = theta[2].abs().max(1e-12);
    amplitude / (1.0 + ((x - centroid) / (gamma / 2.0)).powi(2))
}
