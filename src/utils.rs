//! utils — Python argument extraction for the `WarpedGP` binding.
//!
//! Converts array-likes into `f64` buffers and turns the loose keyword
//! arguments of the Python constructor into validated Rust configuration.
//! Every error surfaces as a `ValueError`/`TypeError` on the Python side.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    gp::{kernel::SimilarityKind, noise::NoiseKind},
    optimization::loglik_optimizer::traits::{LineSearcher, MLEOptions, Tolerances},
    warping::{
        core::options::{ForecastOptions, InitPolicy, ModelSpec, ModelVariant},
        errors::{WarpError, WarpResult},
    },
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

/// Accept a contiguous `float64` ndarray, anything with `.to_numpy()`
/// (pandas), or a plain sequence of floats.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Copy an array-like into an owned vector.
#[cfg(feature = "python-bindings")]
pub fn extract_f64_vec<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>, name: &str,
) -> PyResult<Vec<f64>> {
    let arr = extract_f64_array(py, raw_data)?;
    let slice = arr.as_slice().map_err(|_| {
        PyValueError::new_err(format!("{name} must be a 1-D contiguous float64 array or sequence"))
    })?;
    Ok(slice.to_vec())
}

/// Kernel and noise choice from their string names plus optional
/// overrides for the seasonal period and the constant noise variance.
#[cfg(feature = "python-bindings")]
pub fn extract_model_spec(
    kernel: Option<&str>, period: Option<f64>, noise: Option<&str>, noise_variance: Option<f64>,
) -> PyResult<ModelSpec> {
    let mut similarity: SimilarityKind = kernel.unwrap_or("matern").parse()?;
    if let Some(period) = period {
        match similarity {
            SimilarityKind::Seasonal { .. } => similarity = SimilarityKind::Seasonal { period },
            _ => {
                return Err(PyValueError::new_err("period only applies to the seasonal kernel"));
            }
        }
    }
    let mut noise_kind: NoiseKind = noise.unwrap_or("uniform").parse()?;
    if let Some(variance) = noise_variance {
        match noise_kind {
            NoiseKind::Constant { .. } => noise_kind = NoiseKind::Constant { variance },
            NoiseKind::Uniform => {
                return Err(PyValueError::new_err(
                    "noise_variance only applies to the constant noise kernel",
                ));
            }
        }
    }
    Ok(ModelSpec { similarity, noise: noise_kind })
}

#[cfg(feature = "python-bindings")]
pub fn extract_mle_opts(
    tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> PyResult<MLEOptions> {
    Ok(build_mle_opts(tol_grad, tol_cost, max_iter, line_searcher, lbfgs_mem)?)
}

#[cfg(feature = "python-bindings")]
fn build_mle_opts(
    tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> WarpResult<MLEOptions> {
    // Unset tolerances fall back to the CLI defaults.
    let tol_grad = tol_grad.or(Some(1e-6));
    let max_iter = max_iter.or(Some(100));
    let tols = Tolerances::new(tol_grad, tol_cost, max_iter)?;
    let ls = match line_searcher {
        Some(name) => name.parse::<LineSearcher>()?,
        None => LineSearcher::MoreThuente,
    };
    Ok(MLEOptions::new(tols, ls, false, lbfgs_mem)?)
}

/// Loop options; `init` is `"zeros"` or `"jitter"`.
#[cfg(feature = "python-bindings")]
pub fn extract_forecast_opts(
    variant: Option<&str>, min_window: Option<usize>, warn_within: Option<usize>,
    init: Option<&str>, jitter_scale: Option<f64>, seed: Option<u64>, normalize: bool,
) -> PyResult<ForecastOptions> {
    let defaults = ForecastOptions::default();
    let variant: ModelVariant = match variant {
        Some(name) => name.parse()?,
        None => defaults.variant,
    };
    let init = match init.unwrap_or("zeros").trim().to_lowercase().as_str() {
        "zeros" => InitPolicy::Zeros,
        "jitter" => InitPolicy::jitter(jitter_scale.unwrap_or(0.1), seed.unwrap_or(0))?,
        other => {
            return Err(WarpError::InvalidOption {
                name: "init",
                value: other.to_string(),
                reason: "Valid options are 'zeros' or 'jitter'.",
            }
            .into());
        }
    };
    let opts = ForecastOptions {
        min_window: min_window.unwrap_or(defaults.min_window),
        warn_within: warn_within.unwrap_or(defaults.warn_within),
        init,
        variant,
        normalize,
    };
    opts.validate()?;
    Ok(opts)
}
