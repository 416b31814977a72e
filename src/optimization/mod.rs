//! optimization — log-likelihood maximization stack and its error surface.
//!
//! Purpose
//! -------
//! Provide the optimizer the warped-time model is fitted with: an
//! Argmin-backed L-BFGS maximizer of a log-likelihood `ℓ(θ)` plus a single
//! error/result surface. Callers implement a log-likelihood, choose
//! tolerances, and obtain the fitted point and diagnostics without touching
//! backend solver details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **maximizing log-likelihoods** `ℓ(θ)`
//!   (`loglik_optimizer`), including configuration of solvers and stopping
//!   criteria.
//! - Keep solver failures inside the outcome: a run that stops on a line
//!   search or model error still reports the best point it reached, how many
//!   iterations completed, and why it stopped.
//! - Normalize configuration issues, model failures, and backend solver
//!   errors into a single enum (`errors::OptError`) with a common result
//!   alias (`OptResult<T>`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers operate in an unconstrained parameter space `θ`; models that
//!   need positive quantities keep them on a log scale.
//! - Log-likelihood implementations report invalid states as `OptError`
//!   values, never panics.
//!
//! Conventions
//! -----------
//! - All solvers maximize `ℓ(θ)` by minimizing an internal cost
//!   `c(θ) = -ℓ(θ)`; user-facing APIs and outcomes are expressed in `ℓ`.
//! - Parameters and gradients use the `ndarray` aliases `Theta` and `Grad`.
//! - This layer performs no logging of its own beyond the optional argmin
//!   slog observer (`obs_slog` feature); the forecasting loop reports
//!   outcomes through `tracing`.
//!
//! Downstream usage
//! ----------------
//! - Models implement `LogLikelihood` and are driven either by `maximize`
//!   directly or through the `Maximizer` trait, which `MLEOptions`
//!   implements and which test code can replace with a scripted optimizer.
//!
//! Testing notes
//! -------------
//! - Submodules test solver wiring, tolerance handling, error conversions,
//!   and failure-tolerant runs on toy objectives.

pub mod errors;
pub mod loglik_optimizer;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use warped_gp::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loglik_optimizer::prelude::*;
}
