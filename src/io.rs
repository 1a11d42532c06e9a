//! Plain-text columnar I/O (spec §6): the three-column observation table the
//! driver reads, and the run-result files it writes at the end of a run.
//! Generalizes the teacher's `fs::read_to_string(...).split(' ')` single
//! column reader into the three-column `(covariate, observation,
//! uncertainty)` table format, and adds the output side entirely.

use std::fs;
use std::path::Path;

use ndarray::Array1;

use crate::config::SamplerConfig;
use crate::error::{NsError, Result};
use crate::posterior::PosteriorSample;

pub struct ObservationTable {
    pub covariates: Array1<f64>,
    pub observations: Array1<f64>,
    pub uncertainties: Array1<f64>,
}

pub fn read_observation_table(path: &Path) -> Result<ObservationTable> {
    let contents = fs::read_to_string(path).map_err(|source| NsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut covariates = Vec::new();
    let mut observations = Vec::new();
    let mut uncertainties = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 3 {
            continue;
        }
        let parse = |s: &str| -> Result<f64> {
            s.parse::<f64>().map_err(|_| NsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("could not parse '{s}' as a float"),
                ),
            })
        };
        covariates.push(parse(cols[0])?);
        observations.push(parse(cols[1])?);
        uncertainties.push(parse(cols[2])?);
    }

    Ok(ObservationTable {
        covariates: Array1::from(covariates),
        observations: Array1::from(observations),
        uncertainties: Array1::from(uncertainties),
    })
}

pub struct RunSummary {
    pub log_z: f64,
    pub log_z_error: f64,
    pub information_gain: f64,
    pub n_iterations: usize,
}

/// Writes the output file layout described in spec §6: one `parameter{d}.txt`
/// per dimension, `logLikelihood.txt`, `posteriorDistribution.txt`,
/// `evidenceInformation.txt`, `parameterSummary.txt`, and a trailing sampler
/// configuration block.
pub fn write_results(
    output_dir: &Path,
    posterior: &PosteriorSample,
    summary: &RunSummary,
    config: &SamplerConfig,
    credible_level: f64,
) -> Result<()> {
    fs::create_dir_all(output_dir).map_err(|source| NsError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let n_dims = posterior.thetas().first().map(|t| t.len()).unwrap_or(0);

    for dim in 0..n_dims {
        let path = output_dir.join(format!("parameter{dim}.txt"));
        let body: String = posterior
            .thetas()
            .iter()
            .map(|theta| format!("{}\n", theta[dim]))
            .collect();
        write_file(&path, &body)?;
    }

    let log_l_path = output_dir.join("logLikelihood.txt");
    let log_l_body: String = posterior
        .log_ls()
        .iter()
        .map(|l| format!("{l}\n"))
        .collect();
    write_file(&log_l_path, &log_l_body)?;

    let weights = posterior.normalized_weights(summary.log_z);
    let total: f64 = weights.iter().sum();
    let posterior_path = output_dir.join("posteriorDistribution.txt");
    let posterior_body: String = weights
        .iter()
        .map(|&w| format!("{}\n", if total > 0.0 { w / total } else { 0.0 }))
        .collect();
    write_file(&posterior_path, &posterior_body)?;

    let evidence_path = output_dir.join("evidenceInformation.txt");
    let evidence_body = format!(
        "{}\n{}\n{}\n{}\n",
        summary.log_z, summary.log_z_error, summary.information_gain, summary.n_iterations
    );
    write_file(&evidence_path, &evidence_body)?;

    let summary_path = output_dir.join("parameterSummary.txt");
    let mut summary_body = String::new();
    for dim in 0..n_dims {
        let s = posterior.summary(dim, summary.log_z, credible_level);
        summary_body.push_str(&format!(
            "{} {} {} {} {}\n",
            s.mean, s.median, s.mode, s.credible_lower, s.credible_upper
        ));
    }
    write_file(&summary_path, &summary_body)?;

    let config_path = output_dir.join("samplerConfiguration.txt");
    let config_body = format!(
        "minNclusters={}\nmaxNclusters={}\ninitialEnlargementFraction={}\nshrinkingRate={}\ninitialNobjects={}\nminNobjects={}\nterminationFactor={}\n",
        config.min_n_clusters,
        config.max_n_clusters,
        config.initial_enlargement_fraction,
        config.shrinking_rate,
        config.initial_n_objects,
        config.min_n_objects,
        config.termination_factor,
    );
    write_file(&config_path, &config_body)?;

    Ok(())
}

fn write_file(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body).map_err(|source| NsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
