//! loglik_optimizer — argmin-powered log-likelihood maximizer.
//!
//! Purpose
//! -------
//! Provide a high-level, Argmin-backed optimization layer for **maximizing
//! log-likelihoods** `ℓ(θ)`. Models implement a single trait,
//! [`LogLikelihood`], and are fitted with [`maximize`] (or through the
//! [`Maximizer`] seam) using L-BFGS with a configurable line search,
//! tolerances, and finite-difference fallbacks.
//!
//! Key behaviors
//! -------------
//! - Convert log-likelihoods `ℓ(θ)` into Argmin cost functions
//!   `c(θ) = -ℓ(θ)` via [`adapter::ArgMinAdapter`].
//! - [`maximize`]:
//!   - validates the initial guess with [`LogLikelihood::check`],
//!   - selects an L-BFGS solver via [`builders`] based on [`traits::LineSearcher`],
//!   - executes the solver via [`run::run_lbfgs`], and
//!   - normalizes results into an [`OptimOutcome`].
//! - Tolerate solver breakdowns: a run interrupted by a model or line-search
//!   error still yields an [`OptimOutcome`] with the best iterate, the number
//!   of completed iterations, and the error in `failure`.
//! - Finite-difference gradients ([`finite_diff`]) when a model has no
//!   analytic gradient.
//!
//! Invariants & assumptions
//! ------------------------
//! - The optimizer **always maximizes** `ℓ(θ)` by minimizing `c(θ) = -ℓ(θ)`;
//!   models implement `ℓ(θ)` and `∇ℓ(θ)`, never the cost.
//! - [`LogLikelihood::value`] and [`LogLikelihood::grad`] report invalid
//!   inputs as [`OptError`](crate::optimization::errors::OptError) values.
//! - Configuration types ([`Tolerances`], [`MLEOptions`]) are validated on
//!   construction.
//!
//! Conventions
//! -----------
//! - Parameters live in an unconstrained space as [`Theta`] (`Array1<f64>`).
//! - [`OptimOutcome::value`] is a log-likelihood, not a cost.
//!
//! Downstream usage
//! ----------------
//! - The warped GP model implements [`LogLikelihood`] with its observation
//!   window as `Data`; the forecasting loop fits it once per step through
//!   [`Maximizer`].
//!
//! Testing notes
//! -------------
//! - Unit tests in submodules cover sign conventions ([`adapter`]), solver
//!   construction ([`builders`]), differencing ([`finite_diff`]), option
//!   validation ([`traits`], [`validation`]) and clean vs interrupted runs
//!   ([`run`]).

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::maximize;
pub use self::traits::{LineSearcher, LogLikelihood, MLEOptions, Maximizer, OptimOutcome, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::api::maximize;
    pub use super::traits::{
        LineSearcher, LogLikelihood, MLEOptions, Maximizer, OptimOutcome, Tolerances,
    };
    pub use super::types::{Cost, Grad, Theta};
}
