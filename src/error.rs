use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the nested sampling core and its plug-ins.
///
/// Mirrors the error kinds named in the design: numerical degeneracies are
/// recovered locally by callers (clamped eigenvalues, K=1 fallback) and never
/// reach a caller as one of these variants; the others propagate.
#[derive(Debug, Error)]
pub enum NsError {
    #[error("invalid prior bounds for dimension {dim}: low ({low}) >= high ({high})")]
    InvalidPriorBounds { dim: usize, low: f64, high: f64 },

    #[error("prior dimensionality mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("non-finite log-likelihood encountered during initialization at live slot {slot}")]
    NonFiniteLikelihood { slot: usize },

    #[error("exhausted {attempts} draw attempts without satisfying the likelihood constraint")]
    DrawAttemptsExhausted { attempts: usize },

    #[error("clustering failed: {reason}")]
    ClusteringFailed { reason: String },

    #[error("covariance matrix is numerically degenerate: {reason}")]
    NumericalDegeneracy { reason: String },

    #[error("failed to write results to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NsError>;
