//! Run configuration (spec §6 "Configuration surface"), `serde`-deserializable
//! from the driver's config file, matching the teacher's `Config` struct
//! (which used `serde::Deserialize` + `clap`) but covering every option the
//! core actually consults.

use serde::Deserialize;

use crate::error::{NsError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// `N_live₀`: starting live-point count.
    pub initial_n_objects: usize,
    /// Floor for reduction.
    pub min_n_objects: usize,
    /// Rejection budget per replacement draw.
    pub max_n_draw_attempts: usize,
    /// Force `K=1` for this many leading iterations.
    pub n_initial_iterations_without_clustering: usize,
    /// Cluster-rebuild cadence.
    pub n_iterations_with_same_clustering: usize,
    /// `f₀` in the enlargement policy.
    pub initial_enlargement_fraction: f64,
    /// `s` in the enlargement policy, expected in `[0, 1]`.
    pub shrinking_rate: f64,
    /// Stopping threshold on the remaining-evidence ratio.
    pub termination_factor: f64,
    /// Cluster-count search range.
    pub min_n_clusters: usize,
    pub max_n_clusters: usize,
    /// Hard iteration cap (`N_max`).
    pub n_max_iterations: usize,
    /// Credible-interval level used in `parameterSummary.txt`.
    #[serde(default = "default_credible_level")]
    pub credible_level: f64,
    /// Seed for the sampler's single logical RNG stream.
    #[serde(default)]
    pub seed: u64,
}

fn default_credible_level() -> f64 {
    0.68
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_n_objects == 0 {
            return Err(NsError::InvalidPriorBounds {
                dim: 0,
                low: 0.0,
                high: self.initial_n_objects as f64,
            });
        }
        if self.min_n_objects > self.initial_n_objects {
            return Err(NsError::InvalidPriorBounds {
                dim: 0,
                low: self.min_n_objects as f64,
                high: self.initial_n_objects as f64,
            });
        }
        if self.min_n_clusters == 0 || self.min_n_clusters > self.max_n_clusters {
            return Err(NsError::InvalidPriorBounds {
                dim: 0,
                low: self.min_n_clusters as f64,
                high: self.max_n_clusters as f64,
            });
        }
        if !(0.0..=1.0).contains(&self.shrinking_rate) {
            return Err(NsError::InvalidPriorBounds {
                dim: 0,
                low: self.shrinking_rate,
                high: 1.0,
            });
        }
        if self.termination_factor <= 0.0 {
            return Err(NsError::InvalidPriorBounds {
                dim: 0,
                low: self.termination_factor,
                high: f64::INFINITY,
            });
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            initial_n_objects: 500,
            min_n_objects: 50,
            max_n_draw_attempts: 10_000,
            n_initial_iterations_without_clustering: 0,
            n_iterations_with_same_clustering: 50,
            initial_enlargement_fraction: 1.2,
            shrinking_rate: 0.2,
            termination_factor: 0.01,
            min_n_clusters: 1,
            max_n_clusters: 6,
            n_max_iterations: 200_000,
            credible_level: 0.68,
            seed: 0,
        }
    }
}
