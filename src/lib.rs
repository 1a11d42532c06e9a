//! Multi-ellipsoidal nested sampling for Bayesian evidence estimation and
//! parameter estimation.
//!
//! The crate is organized around the pieces a driver wires together: a
//! [`prior::JointPrior`] and a [`likelihood::Likelihood`] define the problem,
//! a [`cluster::Clusterer`] partitions live points, an [`ellipsoidal_set`]
//! turns a partition into a samplable region, and [`sampler::NestedSampler`]
//! runs the loop that ties them together into a [`posterior::PosteriorSample`].

pub mod cluster;
pub mod config;
pub mod ellipsoid;
pub mod ellipsoidal_set;
pub mod error;
pub mod io;
pub mod likelihood;
pub mod linalg;
pub mod metric;
pub mod posterior;
pub mod prior;
pub mod reducer;
pub mod sampler;

pub use config::SamplerConfig;
pub use error::{NsError, Result};
pub use likelihood::Likelihood;
pub use posterior::{ParameterSummary, PosteriorSample};
pub use prior::{JointPrior, Prior};
pub use sampler::{NestedSampler, RunOutcome, SamplerState, TerminationReason};
