//! The posterior sample (spec §3): an append-only sequence of
//! `(θ, log L, log weight)` triples, plus the summary statistics the
//! `parameterSummary.txt` output needs (spec §6).

use ndarray::Array1;
use ordered_float::OrderedFloat;

#[derive(Debug, Clone)]
pub struct PosteriorSample {
    thetas: Vec<Array1<f64>>,
    log_ls: Vec<f64>,
    log_weights: Vec<f64>,
}

impl Default for PosteriorSample {
    fn default() -> Self {
        PosteriorSample {
            thetas: Vec::new(),
            log_ls: Vec::new(),
            log_weights: Vec::new(),
        }
    }
}

impl PosteriorSample {
    pub fn len(&self) -> usize {
        self.thetas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thetas.is_empty()
    }

    pub fn push(&mut self, theta: Array1<f64>, log_l: f64, log_weight: f64) {
        self.thetas.push(theta);
        self.log_ls.push(log_l);
        self.log_weights.push(log_weight);
    }

    pub fn thetas(&self) -> &[Array1<f64>] {
        &self.thetas
    }

    pub fn log_ls(&self) -> &[f64] {
        &self.log_ls
    }

    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    /// Normalized (linear-domain) posterior weights, `exp(log w_i - log Z)`.
    pub fn normalized_weights(&self, log_z: f64) -> Vec<f64> {
        self.log_weights
            .iter()
            .map(|&lw| (lw - log_z).exp())
            .collect()
    }

    pub fn summary(&self, dim: usize, log_z: f64, credible_level: f64) -> ParameterSummary {
        let weights = self.normalized_weights(log_z);
        let values: Vec<f64> = self.thetas.iter().map(|t| t[dim]).collect();

        let weight_sum: f64 = weights.iter().sum();
        let mean: f64 = values
            .iter()
            .zip(weights.iter())
            .map(|(&v, &w)| v * w)
            .sum::<f64>()
            / weight_sum;

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by_key(|&i| OrderedFloat(values[i]));

        let median = weighted_quantile(&values, &weights, &order, 0.5);
        let lower = weighted_quantile(&values, &weights, &order, (1.0 - credible_level) / 2.0);
        let upper = weighted_quantile(&values, &weights, &order, 1.0 - (1.0 - credible_level) / 2.0);

        let mode_idx = weights
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mode = values.get(mode_idx).copied().unwrap_or(f64::NAN);

        ParameterSummary {
            mean,
            median,
            mode,
            credible_lower: lower,
            credible_upper: upper,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterSummary {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub credible_lower: f64,
    pub credible_upper: f64,
}

fn weighted_quantile(values: &[f64], weights: &[f64], order: &[usize], q: f64) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || values.is_empty() {
        return f64::NAN;
    }
    let target = q * total;
    let mut cumulative = 0.0;
    for &idx in order {
        cumulative += weights[idx];
        if cumulative >= target {
            return values[idx];
        }
    }
    values[*order.last().unwrap()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_weights_sum_near_one_for_equal_log_z() {
        let mut sample = PosteriorSample::default();
        for i in 0..5 {
            sample.push(Array1::from(vec![i as f64]), -1.0, (0.2f64).ln());
        }
        let weights = sample.normalized_weights(0.0);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn summary_mean_matches_uniform_weighting() {
        let mut sample = PosteriorSample::default();
        for i in 0..5 {
            sample.push(Array1::from(vec![i as f64]), -1.0, (0.2f64).ln());
        }
        let summary = sample.summary(0, 0.0, 0.68);
        assert!((summary.mean - 2.0).abs() < 1e-9);
    }

    #[test]
    fn credible_interval_brackets_the_median() {
        let mut sample = PosteriorSample::default();
        for i in 0..11 {
            sample.push(Array1::from(vec![i as f64]), -1.0, (1.0 / 11.0f64).ln());
        }
        let summary = sample.summary(0, 0.0, 0.5);
        assert!(summary.credible_lower <= summary.median);
        assert!(summary.median <= summary.credible_upper);
    }
}
