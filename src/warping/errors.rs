//! Errors for the warped-time GP stack (data validation, parameter layout,
//! tape usage, configuration, and numerical failures).
//!
//! This module defines [`WarpError`] and the [`WarpResult`] alias used across
//! the `warping` module, the CSV front-end, and the Python surface. Errors
//! fall into two classes that the forecasting loop treats differently:
//!
//! - **numerical** ([`WarpError::is_numerical`]): the GP covariance was not
//!   positive definite, a density came out invalid, or the optimizer's model
//!   evaluation failed at some trial point. These depend on the parameters
//!   being tried; one forecasting step is marked invalid and the run goes on.
//! - **everything else**: shape mismatches, malformed input records, bad
//!   configuration, tape misuse. These are fatal for the whole run.
//!
//! ## Conventions
//! - Indices are 0-based; CSV line numbers are 1-based.
//! - GP engine errors and optimizer errors are wrapped, not flattened, so
//!   callers can still match on the inner variant.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};
use statrs::distribution::NormalError;

use crate::gp::errors::GpError;
use crate::optimization::errors::OptError;

/// Result alias for the warped-time model stack.
pub type WarpResult<T> = Result<T, WarpError>;

/// Unified error type for the warped-time model stack.
#[derive(Debug, Clone, PartialEq)]
pub enum WarpError {
    // ---- Input/data validation ----
    /// Series holds no observations.
    EmptySeries,

    /// Inputs and outputs have different lengths.
    LengthMismatch { inputs: usize, outputs: usize },

    /// An input (time) value is NaN/±inf.
    NonFiniteInput { index: usize, value: f64 },

    /// An output value is NaN/±inf.
    NonFiniteOutput { index: usize, value: f64 },

    /// Inputs must be strictly increasing.
    NonIncreasingInput { index: usize, previous: f64, value: f64 },

    /// Requested window end exceeds the series.
    WindowOutOfRange { end: usize, len: usize },

    /// Outputs cannot be standardised (zero or undefined spread).
    DegenerateOutputs { std: f64 },

    // ---- Record parsing ----
    /// A CSV record could not be parsed.
    MalformedRecord { line: usize, reason: String },

    /// Underlying reader/writer failure.
    Io { text: String },

    // ---- Parameter layout ----
    /// Parameter vector length does not match the layout for this window.
    ParamLengthMismatch { expected: usize, found: usize },

    /// Warp-rate count does not match the number of consecutive input pairs.
    RateLengthMismatch { expected: usize, found: usize },

    /// Prior was built for a different kernel arity than the GP carries.
    PriorArityMismatch { expected: usize, found: usize },

    // ---- Tape ----
    /// `gradient()` called without a matching successful `observe()`.
    TapeEmpty,

    // ---- Configuration ----
    /// An option value is out of range or unrecognised.
    InvalidOption { name: &'static str, value: String, reason: &'static str },

    // ---- Numerical ----
    /// A prior density could not be formed or evaluated.
    InvalidDensity { what: &'static str, value: f64 },

    /// Wrapper for GP engine errors.
    Gp(GpError),

    /// Wrapper for optimizer errors.
    Optimizer(OptError),
}

impl WarpError {
    /// `true` for failures that only invalidate the current fit or forecast.
    pub fn is_numerical(&self) -> bool {
        match self {
            WarpError::InvalidDensity { .. } => true,
            WarpError::Gp(e) => e.is_numerical(),
            WarpError::Optimizer(OptError::ModelEvaluation { .. })
            | WarpError::Optimizer(OptError::NonFiniteCost { .. }) => true,
            _ => false,
        }
    }
}

impl std::error::Error for WarpError {}

impl std::fmt::Display for WarpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Input/data validation ----
            WarpError::EmptySeries => write!(f, "Series is empty"),
            WarpError::LengthMismatch { inputs, outputs } => {
                write!(f, "Inputs ({inputs}) and outputs ({outputs}) differ in length")
            }
            WarpError::NonFiniteInput { index, value } => {
                write!(f, "Non-finite input at index {index}: {value}")
            }
            WarpError::NonFiniteOutput { index, value } => {
                write!(f, "Non-finite output at index {index}: {value}")
            }
            WarpError::NonIncreasingInput { index, previous, value } => {
                write!(
                    f,
                    "Inputs must be strictly increasing: index {index} has {value} after {previous}"
                )
            }
            WarpError::WindowOutOfRange { end, len } => {
                write!(f, "Window end {end} out of range for series of length {len}")
            }
            WarpError::DegenerateOutputs { std } => {
                write!(f, "Outputs cannot be standardised: standard deviation is {std}")
            }

            // ---- Record parsing ----
            WarpError::MalformedRecord { line, reason } => {
                write!(f, "Malformed record on line {line}: {reason}")
            }
            WarpError::Io { text } => write!(f, "I/O error: {text}"),

            // ---- Parameter layout ----
            WarpError::ParamLengthMismatch { expected, found } => {
                write!(f, "Parameter vector length mismatch: expected {expected}, found {found}")
            }
            WarpError::RateLengthMismatch { expected, found } => {
                write!(f, "Warp rate count mismatch: expected {expected}, found {found}")
            }
            WarpError::PriorArityMismatch { expected, found } => {
                write!(f, "Prior expects {expected} kernel hyperparameters, GP has {found}")
            }

            // ---- Tape ----
            WarpError::TapeEmpty => {
                write!(f, "Gradient requested without a matching observe() on the same parameters")
            }

            // ---- Configuration ----
            WarpError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid option {name} = {value}: {reason}")
            }

            // ---- Numerical ----
            WarpError::InvalidDensity { what, value } => {
                write!(f, "Invalid {what} in prior density: {value}")
            }
            WarpError::Gp(e) => write!(f, "GP engine: {e}"),
            WarpError::Optimizer(e) => write!(f, "Optimizer: {e}"),
        }
    }
}

impl From<GpError> for WarpError {
    fn from(err: GpError) -> Self {
        WarpError::Gp(err)
    }
}

impl From<OptError> for WarpError {
    fn from(err: OptError) -> Self {
        WarpError::Optimizer(err)
    }
}

impl From<std::io::Error> for WarpError {
    fn from(err: std::io::Error) -> Self {
        WarpError::Io { text: err.to_string() }
    }
}

impl From<NormalError> for WarpError {
    fn from(err: NormalError) -> Self {
        let what = match err {
            NormalError::MeanInvalid => "mean",
            NormalError::StandardDeviationInvalid => "standard deviation",
            _ => "normal distribution parameter",
        };
        WarpError::InvalidDensity { what, value: f64::NAN }
    }
}

/// Map model errors onto the optimizer surface.
///
/// Layout mismatches keep their numbers; numerical failures become
/// `ModelEvaluation` so the runner can tell them apart from bad input.
impl From<WarpError> for OptError {
    fn from(err: WarpError) -> Self {
        match err {
            WarpError::Optimizer(e) => e,
            WarpError::ParamLengthMismatch { expected, found } => {
                OptError::ThetaLengthMismatch { expected, actual: found }
            }
            e if e.is_numerical() => OptError::ModelEvaluation { text: e.to_string() },
            e => OptError::ModelInput { text: e.to_string() },
        }
    }
}

/// Convert a [`WarpError`] into a Python `ValueError` with the error message.
#[cfg(feature = "python-bindings")]
impl std::convert::From<WarpError> for PyErr {
    fn from(err: WarpError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
