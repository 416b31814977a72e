//! warped_gp — Gaussian-process forecasting on a learned, warped time axis.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the expanding-window forecaster to Python via the `_warped_gp`
//! extension module. When the `python-bindings` feature is enabled, this
//! module defines the Python-facing classes and the `forecasting` submodule.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules: `gp` (kernels, noise, posterior),
//!   `warping` (time warp, priors, composite model, forecasting loop),
//!   `optimization` (L-BFGS maximizer), `io` (CSV in/out) and `evaluation`
//!   (NLPD scoring).
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer for the
//!   `_warped_gp` Python extension.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; the PyO3 items below
//!   only convert inputs, dispatch, and map errors.
//!
//! Conventions
//! -----------
//! - Core errors are rich enums internally and become `ValueError` at the
//!   PyO3 boundary.
//! - Python classes live under `_warped_gp.forecasting`, registered in
//!   `sys.modules` as `warped_gp.forecasting`.
//!
//! Downstream usage
//! ----------------
//! - Rust callers build a [`warping::ForecastLoop`] and feed it a
//!   [`warping::Series`]; the `warped-gp` binary does exactly that over CSV.
//!
//! Testing notes
//! -------------
//! - Unit tests sit next to each module; `tests/` exercises the public API
//!   end to end (gradient checks, loop resilience, CSV round trip).

pub mod evaluation;
pub mod gp;
pub mod io;
pub mod optimization;
pub mod utils;
pub mod warping;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    evaluation::{NlpdOptions, summarize},
    utils::{extract_f64_vec, extract_forecast_opts, extract_mle_opts, extract_model_spec},
    warping::{core::data::Series, models::forecast::ForecastLoop, models::forecast::ForecastRecord},
};

/// WarpedGP — Python-facing expanding-window forecaster.
///
/// Purpose
/// -------
/// Expose [`ForecastLoop`] to Python: fit a warped-time GP on every prefix
/// of a series and forecast the next point.
///
/// Parameters
/// ----------
/// Constructed from Python via `WarpedGP(kernel="matern", ...)`:
/// - `kernel`, `period`: similarity kernel name and seasonal period.
/// - `noise`, `noise_variance`: noise kernel name and constant variance.
/// - `variant`: `"warped"` or `"latent"`.
/// - `tol_grad`, `tol_cost`, `max_iter`, `line_searcher`, `lbfgs_mem`:
///   optimizer configuration for each fit.
/// - `min_window`, `warn_within`, `init`, `jitter_scale`, `seed`: loop
///   configuration.
///
/// Notes
/// -----
/// - The wrapped model keeps a per-call scratch tape, so the class is
///   `unsendable`.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "warped_gp.forecasting", unsendable)]
pub struct WarpedGP {
    inner: ForecastLoop,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl WarpedGP {
    #[new]
    #[pyo3(
        signature = (
            kernel = None,
            period = None,
            noise = None,
            noise_variance = None,
            variant = None,
            tol_grad = None,
            tol_cost = None,
            max_iter = None,
            line_searcher = None,
            lbfgs_mem = None,
            min_window = None,
            warn_within = None,
            init = None,
            jitter_scale = None,
            seed = None,
        ),
        text_signature = "(kernel=None, period=None, noise=None, noise_variance=None, \
                          variant=None, tol_grad=None, tol_cost=None, max_iter=None, \
                          line_searcher=None, lbfgs_mem=None, min_window=None, \
                          warn_within=None, init=None, jitter_scale=None, seed=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kernel: Option<&str>, period: Option<f64>, noise: Option<&str>,
        noise_variance: Option<f64>, variant: Option<&str>, tol_grad: Option<f64>,
        tol_cost: Option<f64>, max_iter: Option<usize>, line_searcher: Option<&str>,
        lbfgs_mem: Option<usize>, min_window: Option<usize>, warn_within: Option<usize>,
        init: Option<&str>, jitter_scale: Option<f64>, seed: Option<u64>,
    ) -> PyResult<Self> {
        let spec = extract_model_spec(kernel, period, noise, noise_variance)?;
        let mle = extract_mle_opts(tol_grad, tol_cost, max_iter, line_searcher, lbfgs_mem)?;
        let opts =
            extract_forecast_opts(variant, min_window, warn_within, init, jitter_scale, seed, true)?;
        let inner = ForecastLoop::from_spec(&spec, mle, opts)?;
        Ok(WarpedGP { inner })
    }

    /// Names of the reported hyperparameters, in column order.
    #[getter]
    pub fn hyper_names(&self) -> Vec<&'static str> {
        self.inner.hyper_names()
    }

    /// Run the backtest on `(x, y)`; `x` must be strictly increasing.
    #[pyo3(signature = (x, y, normalize = true), text_signature = "(x, y, /, normalize=True)")]
    pub fn backtest<'py>(
        &mut self, py: Python<'py>, x: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>, normalize: bool,
    ) -> PyResult<BacktestResult> {
        let x = extract_f64_vec(py, x, "x")?;
        let y = extract_f64_vec(py, y, "y")?;
        let series = Series::new(x, y)?;
        self.inner.set_normalize(normalize);
        let records = self.inner.run(&series)?;
        Ok(BacktestResult { records, hyper_names: self.inner.hyper_names() })
    }
}

/// BacktestResult — per-step records of a `WarpedGP.backtest` run.
///
/// Columns are exposed as lists; missing forecasts are `nan`.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "warped_gp.forecasting")]
pub struct BacktestResult {
    records: Vec<ForecastRecord>,
    hyper_names: Vec<&'static str>,
}

#[cfg(feature = "python-bindings")]
impl BacktestResult {
    fn column(&self, f: impl Fn(&ForecastRecord) -> f64) -> Vec<f64> {
        self.records.iter().map(f).collect()
    }
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl BacktestResult {
    #[getter]
    pub fn x(&self) -> Vec<f64> {
        self.column(|r| r.input)
    }

    #[getter]
    pub fn y(&self) -> Vec<f64> {
        self.column(|r| r.actual)
    }

    #[getter]
    pub fn mean(&self) -> Vec<f64> {
        self.column(|r| r.forecast.map_or(f64::NAN, |f| f.mean))
    }

    #[getter]
    pub fn std(&self) -> Vec<f64> {
        self.column(|r| r.forecast.map_or(f64::NAN, |f| f.std))
    }

    #[getter]
    pub fn noise_std(&self) -> Vec<f64> {
        self.column(|r| r.forecast.map_or(f64::NAN, |f| f.noise_std))
    }

    #[getter]
    pub fn ll0(&self) -> Vec<f64> {
        self.column(|r| r.ll0)
    }

    #[getter]
    pub fn ll(&self) -> Vec<f64> {
        self.column(|r| r.ll)
    }

    /// One row of hyperparameters per step.
    #[getter]
    pub fn hyper(&self) -> Vec<Vec<f64>> {
        self.records.iter().map(|r| r.hyper.clone()).collect()
    }

    #[getter]
    pub fn hyper_names(&self) -> Vec<&'static str> {
        self.hyper_names.clone()
    }

    #[getter]
    pub fn iterations(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.iterations).collect()
    }

    #[getter]
    pub fn converged(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.converged).collect()
    }

    /// Mean negative log predictive density over the valid steps.
    #[pyo3(signature = (skip = 0, with_noise = false), text_signature = "(skip=0, with_noise=False)")]
    pub fn mean_nlpd(&self, skip: usize, with_noise: bool) -> f64 {
        summarize(&self.records, &NlpdOptions { skip, with_noise, ..NlpdOptions::default() }).mean
    }

    pub fn __len__(&self) -> usize {
        self.records.len()
    }
}

#[cfg(feature = "python-bindings")]
#[pymodule]
fn _warped_gp<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let forecasting_mod = PyModule::new(_py, "forecasting")?;
    forecasting(_py, m, &forecasting_mod)?;

    _py.import("sys")?.getattr("modules")?.set_item("warped_gp.forecasting", forecasting_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn forecasting<'py>(
    _py: Python, warped_gp: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<WarpedGP>()?;
    m.add_class::<BacktestResult>()?;
    warped_gp.add_submodule(m)?;
    Ok(())
}
