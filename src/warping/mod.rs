//! warping — Gaussian-process regression on a latent, monotonically warped
//! time axis, with expanding-window forecasting.
//!
//! Purpose
//! -------
//! Fit a GP to a univariate series whose time axis runs on an unknown
//! intrinsic clock. The clock is a cumulative product of positive per-step
//! rates whose log-values are estimated jointly with the kernel
//! hyperparameters and a regularising prior, by maximizing the composite
//! log-likelihood with L-BFGS.
//!
//! Key behaviors
//! -------------
//! - [`core`]: validated data, parameter layout, the warp transform and its
//!   suffix-sum sensitivities, prior capabilities, the evaluation tape, and
//!   configuration.
//! - [`models`]: the composite model and the forecasting loop.
//! - [`errors`]: [`WarpError`] split into numerical (per-step) and fatal
//!   failures.
//!
//! Conventions
//! -----------
//! - Parameter vectors are laid out as `[kernel θ | prior θ | log-rates |
//!   latent inputs | latent outputs]`, the last two only for
//!   [`ModelVariant::LatentInputs`].
//! - Everything on the optimizer side is on a log scale.
//!
//! Downstream usage
//! ----------------
//! - Load a [`Series`] (see [`crate::io::load_series`]), build a
//!   [`ForecastLoop`] from a [`ModelSpec`], [`MLEOptions`] and
//!   [`ForecastOptions`], then `run` or `for_each_step`.
//!
//! [`MLEOptions`]: crate::optimization::loglik_optimizer::MLEOptions

pub mod core;
pub mod errors;
pub mod models;

// ---- Re-exports ----

pub use self::core::{
    ForecastOptions, GaussianPriors, InitPolicy, ModelSpec, ModelVariant, NormalPrior,
    ParamLayout, PriorModel, Series, Standardization, Window,
};
pub use self::errors::{WarpError, WarpResult};
pub use self::models::{Forecast, ForecastLoop, ForecastRecord, WarpedGpModel};

// ---- Prelude ----
//
//     use warped_gp::warping::prelude::*;

pub mod prelude {
    pub use super::{
        Forecast, ForecastLoop, ForecastOptions, ForecastRecord, GaussianPriors, InitPolicy,
        ModelSpec, ModelVariant, PriorModel, Series, WarpError, WarpResult, WarpedGpModel,
        Window,
    };
}
