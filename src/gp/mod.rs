//! gp — Gaussian-process engine and its pluggable capabilities.
//!
//! Purpose
//! -------
//! Provide the GP regression engine the warped-time model delegates to:
//! covariance assembly, Cholesky-based marginal likelihood with an exact
//! gradient over the full flat input vector, and the posterior predictive.
//! Kernel and noise functional forms are capabilities selected at
//! configuration time.
//!
//! Key behaviors
//! -------------
//! - [`engine::GaussianProcess`] implements `observe(flat) -> ℓ` (with
//!   gradient) and `produce(flat, new_inputs) -> (mean, std)`.
//! - [`kernel::Covariance`] / [`noise::NoiseModel`] are the capability
//!   traits; [`kernel::SimilarityKind`] and [`noise::NoiseKind`] are the
//!   string-parsable registries that build them.
//! - Errors are reported as [`errors::GpError`], split into shape errors and
//!   numerical failures.
//!
//! Conventions
//! -----------
//! - Hyperparameters enter the engine on a log scale.
//! - Input points have [`engine::INPUT_DIM`] coordinates: warped time, raw
//!   time.

pub mod engine;
pub mod errors;
pub mod kernel;
pub mod noise;

// ---- Re-exports ----

pub use self::engine::{GaussianProcess, INPUT_DIM, Posterior};
pub use self::errors::{GpError, GpResult};
pub use self::kernel::{Covariance, HyperParam, HyperRole, SimilarityKind};
pub use self::noise::{NoiseKind, NoiseModel};

pub mod prelude {
    pub use super::engine::{GaussianProcess, Posterior};
    pub use super::errors::{GpError, GpResult};
    pub use super::kernel::{Covariance, HyperRole, SimilarityKind};
    pub use super::noise::{NoiseKind, NoiseModel};
}
