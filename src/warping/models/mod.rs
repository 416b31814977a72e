//! models — the composite warped-time GP model and its forecasting driver.
//!
//! Purpose
//! -------
//! Wire `warping::core` (layout, warp, priors, tape) to the GP engine and the
//! log-likelihood optimizer.
//!
//! Key behaviors
//! -------------
//! - [`WarpedGpModel`] evaluates the composite log-likelihood, assembles its
//!   gradient through the warp, and forecasts one step ahead. It implements
//!   [`LogLikelihood`](crate::optimization::loglik_optimizer::LogLikelihood)
//!   over a [`Window`](crate::warping::core::Window).
//! - [`ForecastLoop`] runs the expanding-window backtest and tolerates
//!   optimizer failures and per-step numerical failures.
//!
//! Invariants & assumptions
//! ------------------------
//! - The model's tape is single-owner scratch; concurrent use of one
//!   [`WarpedGpModel`] is not supported.

pub mod composite;
pub mod forecast;

pub use self::composite::{Forecast, WarpedGpModel};
pub use self::forecast::{ForecastLoop, ForecastRecord};
