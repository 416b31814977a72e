//! Errors raised by the Gaussian-process engine and its kernel capabilities.
//!
//! Shape problems (flat vectors that do not split into the documented
//! regions) are programming errors on the caller's side; numerical problems
//! (a covariance matrix that is not positive definite, non-finite kernel
//! values) depend on the hyperparameters being tried and are recoverable
//! from the caller's point of view. [`GpError::is_numerical`] draws that
//! line.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

/// Result alias for GP engine operations.
pub type GpResult<T> = Result<T, GpError>;

#[derive(Debug, Clone, PartialEq)]
pub enum GpError {
    // ---- Shape ----
    /// A flat vector or input block does not match the engine layout.
    ShapeMismatch { what: &'static str, expected: usize, found: usize },

    /// The flat vector holds no observations.
    NoObservations,

    // ---- Numerical ----
    /// Cholesky factorization of the covariance failed.
    SingularCovariance { size: usize },

    /// A covariance entry came out NaN or infinite.
    NonFiniteCovariance { row: usize, col: usize, value: f64 },

    /// A flat-vector entry is NaN or infinite.
    NonFiniteInput { index: usize, value: f64 },

    // ---- Capability ----
    /// Finite-difference fallback of a capability failed.
    DerivativeFailed { capability: &'static str, reason: String },

    /// No kernel or noise capability is registered under this name.
    UnknownCapability { name: String, reason: &'static str },

    /// A capability setting (period, fixed variance) is out of range.
    InvalidCapabilityParam { name: &'static str, value: f64, reason: &'static str },
}

impl GpError {
    /// `true` when the error depends on the hyperparameters being tried.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            GpError::SingularCovariance { .. }
                | GpError::NonFiniteCovariance { .. }
                | GpError::NonFiniteInput { .. }
                | GpError::DerivativeFailed { .. }
        )
    }
}

impl std::error::Error for GpError {}

impl std::fmt::Display for GpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpError::ShapeMismatch { what, expected, found } => {
                write!(f, "GP {what} shape mismatch: expected {expected}, found {found}")
            }
            GpError::NoObservations => write!(f, "GP has no observations"),
            GpError::SingularCovariance { size } => {
                write!(f, "Covariance matrix of size {size} is not positive definite")
            }
            GpError::NonFiniteCovariance { row, col, value } => {
                write!(f, "Non-finite covariance entry at ({row}, {col}): {value}")
            }
            GpError::NonFiniteInput { index, value } => {
                write!(f, "Non-finite GP input at index {index}: {value}")
            }
            GpError::DerivativeFailed { capability, reason } => {
                write!(f, "Derivative of '{capability}' failed: {reason}")
            }
            GpError::UnknownCapability { name, reason } => {
                write!(f, "Unknown capability '{name}': {reason}")
            }
            GpError::InvalidCapabilityParam { name, value, reason } => {
                write!(f, "Invalid {name} {value}: {reason}")
            }
        }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<GpError> for PyErr {
    fn from(err: GpError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
