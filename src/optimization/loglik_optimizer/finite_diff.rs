//! loglik_optimizer::finite_diff — finite-difference gradient helpers.
//!
//! Purpose
//! -------
//! Provide finite-difference gradient approximations around a parameter
//! vector, together with error capture and validation, so that the rest of
//! the crate can request derivatives without depending directly on the
//! `finitediff` API.
//!
//! Key behaviors
//! -------------
//! - Compute forward- and central-difference gradients of objectives that
//!   cannot return `Result` from inside the differencing closure, capturing
//!   the first error in a shared cell ([`run_fd_diff`], [`run_central_diff`]).
//! - Offer a fallible-objective entry point, [`fd_gradient`], that wraps the
//!   capture pattern for callers whose objective already returns
//!   [`OptResult`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Any error raised by the objective during differencing is treated as a
//!   hard failure of the whole gradient.
//! - Returned gradients satisfy [`validate_grad`] (correct length, finite).
//!
//! Conventions
//! -----------
//! - Step sizes are the ones `finitediff` chooses (square root of machine
//!   epsilon for forward differences, cube root for central differences).
//!
//! Downstream usage
//! ----------------
//! - The optimizer adapter falls back to these helpers when a model does not
//!   implement an analytic gradient.
//! - Covariance capabilities without analytic partials use [`fd_gradient`]
//!   for their default `cov_grad`.
//!
//! Testing notes
//! -------------
//! - Unit tests cover agreement with analytic gradients, error propagation
//!   from the closure, and rejection of non-finite results.
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Grad, Theta, validation::validate_grad},
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Differencing scheme used by [`fd_gradient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdScheme {
    Forward,
    Central,
}

/// run_fd_diff — forward-difference gradient with error capture and validation.
///
/// Parameters
/// ----------
/// - `theta`: `&Theta`
///   Point at which the gradient is approximated; its length defines the
///   expected gradient dimension.
/// - `func`: `&G`
///   Objective passed to `forward_diff`. It is expected to route evaluation
///   errors into `closure_err` and return `NaN` in that case.
/// - `closure_err`: `&RefCell<Option<Error>>`
///   Shared cell holding the first error raised inside `func`. Cleared on
///   entry.
///
/// Errors
/// ------
/// - The captured closure error, converted into `OptError`.
/// - `OptError::GradientDimMismatch` / `OptError::InvalidGradient` from
///   [`validate_grad`].
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}

/// run_central_diff — central-difference counterpart of [`run_fd_diff`].
///
/// Same contract as [`run_fd_diff`]; twice the evaluations, one order more
/// accurate.
pub fn run_central_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.central_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}

/// Finite-difference gradient of a fallible objective.
///
/// The first error returned by `f` aborts the gradient and is returned
/// as-is.
pub fn fd_gradient<F>(f: F, theta: &Theta, scheme: FdScheme) -> OptResult<Grad>
where
    F: Fn(&Theta) -> OptResult<f64>,
{
    let closure_err: RefCell<Option<Error>> = RefCell::new(None);
    let wrapped = |x: &Theta| -> f64 {
        match f(x) {
            Ok(v) => v,
            Err(e) => {
                let mut slot = closure_err.borrow_mut();
                if slot.is_none() {
                    *slot = Some(Error::from(e));
                }
                f64::NAN
            }
        }
    };
    match scheme {
        FdScheme::Forward => run_fd_diff(theta, &wrapped, &closure_err),
        FdScheme::Central => run_central_diff(theta, &wrapped, &closure_err),
    }
}

/// Convenience wrapper for objectives that cannot fail.
pub fn fd_gradient_infallible<F>(f: F, theta: &Theta, scheme: FdScheme) -> OptResult<Grad>
where
    F: Fn(&Theta) -> f64,
{
    fd_gradient(|x| Ok(f(x)), theta, scheme).map_err(|e| match e {
        OptError::InvalidGradient { index, value, .. } => OptError::InvalidGradient {
            index,
            value,
            reason: "Finite-difference gradient produced a non-finite entry.",
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Forward and central differences on a smooth objective.
    // - Error capture from inside the differencing closure.
    // - Validation of non-finite results.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Both schemes approximate the analytic gradient of a quadratic.
    //
    // Given
    // -----
    // - f(θ) = θ·θ at θ = (0.5, -1.5).
    //
    // Expect
    // ------
    // - Gradients close to 2θ (central tighter than forward).
    fn fd_gradient_matches_quadratic() {
        // Arrange
        let theta: Theta = Array1::from(vec![0.5_f64, -1.5]);
        let f = |x: &Theta| Ok(x.dot(x));

        // Act
        let fwd = fd_gradient(f, &theta, FdScheme::Forward).expect("forward diff should work");
        let ctr = fd_gradient(f, &theta, FdScheme::Central).expect("central diff should work");

        // Assert
        for i in 0..2 {
            assert!((fwd[i] - 2.0 * theta[i]).abs() < 1e-6);
            assert!((ctr[i] - 2.0 * theta[i]).abs() < 1e-8);
        }
    }

    #[test]
    // Purpose
    // -------
    // An error raised by the objective aborts the gradient.
    //
    // Given
    // -----
    // - An objective that always fails with `ModelEvaluation`.
    //
    // Expect
    // ------
    // - The same error is returned.
    fn fd_gradient_propagates_objective_error() {
        // Arrange
        let theta: Theta = Array1::from(vec![1.0_f64]);
        let f = |_: &Theta| -> OptResult<f64> {
            Err(OptError::ModelEvaluation { text: "boom".to_string() })
        };

        // Act
        let err = fd_gradient(f, &theta, FdScheme::Central).unwrap_err();

        // Assert
        assert_eq!(err, OptError::ModelEvaluation { text: "boom".to_string() });
    }

    #[test]
    // Purpose
    // -------
    // Non-finite objective values are rejected by validation.
    //
    // Given
    // -----
    // - An objective returning +∞ everywhere.
    //
    // Expect
    // ------
    // - `OptError::InvalidGradient`.
    fn fd_gradient_rejects_non_finite_result() {
        // Arrange
        let theta: Theta = Array1::from(vec![0.0_f64, 0.0]);

        // Act
        let err = fd_gradient_infallible(|_| f64::INFINITY, &theta, FdScheme::Forward).unwrap_err();

        // Assert
        assert!(matches!(err, OptError::InvalidGradient { .. }));
    }
}
