//! Adapter that exposes a user `LogLikelihood` as an `argmin` problem.
//!
//! We convert a *maximization* of a log-likelihood `ℓ(θ)` into a *minimization*
//! problem by defining the cost as `c(θ) = -ℓ(θ)`. Analytic gradients (if
//! provided by the model) are negated accordingly. If a gradient is not
//! provided, we finite-difference the **cost** closure, so no sign flip is
//! needed in that branch.
//!
//! Rejected trials: once one point has evaluated, a *numerical* model
//! failure (singular covariance, overflowed warp, non-finite value) at a
//! later trial point is answered with a finite penalty instead of an error.
//! The penalty sits above the starting cost and grows quadratically away
//! from the best point seen, so every line search backs off towards it
//! instead of aborting the run. Fatal model errors still propagate.
use std::cell::{Cell, RefCell};

use crate::optimization::{
    errors::OptError,
    loglik_optimizer::{
        finite_diff::{run_central_diff, run_fd_diff},
        traits::LogLikelihood,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};

/// Margin, in units of `1 + |c(θ₀)|`, by which a rejected trial's cost
/// exceeds the starting cost.
const REJECT_MARGIN: f64 = 1.0;

/// Costs seen so far: the first finite cost and the best point.
#[derive(Debug, Clone)]
struct Anchor {
    start_cost: Cost,
    best_cost: Cost,
    best_theta: Theta,
}

/// Bridges a user `LogLikelihood` to `argmin`'s `CostFunction` and `Gradient`.
///
/// - `CostFunction::cost` returns `-ℓ(θ)` (negative log-likelihood).
/// - `Gradient::gradient` returns:
///   - `-∇ℓ(θ)` if the model provides an analytic gradient, or
///   - a finite-difference gradient of the cost (no sign flip needed).
/// - Numerical failures after the first successful evaluation become
///   rejected trials (see [`ArgMinAdapter::rejected_cost`]).
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: LogLikelihood> {
    pub f: &'a F,
    pub data: &'a F::Data,
    anchor: RefCell<Option<Anchor>>,
    rejected: Cell<usize>,
}

impl<'a, F: LogLikelihood> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the cost `c(θ) = -ℓ(θ)`.
    ///
    /// # Errors
    /// - Any non-numerical `OptError` from the model's `value`.
    /// - Numerical failures (`ModelEvaluation`, `NonFiniteCost`) only while
    ///   no point has evaluated yet; afterwards they give the rejected-trial
    ///   cost.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let evaluated = self.f.value(theta, self.data).and_then(|output| match output.is_finite() {
            true => Ok(-output),
            false => Err(OptError::NonFiniteCost { value: output }),
        });
        match evaluated {
            Ok(cost) => {
                self.record(theta, cost);
                Ok(cost)
            }
            Err(err) if is_rejectable(&err) => match self.rejected_cost(theta) {
                Some(penalty) => {
                    self.rejected.set(self.rejected.get() + 1);
                    Ok(penalty)
                }
                None => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }
}

impl<'a, F: LogLikelihood> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient of the cost at `θ`.
    ///
    /// Behavior:
    /// - If the model implements `grad(θ, data)`, validate it and return `-grad`.
    /// - Otherwise difference the **cost**: central first; if the cost failed
    ///   anywhere on the stencil or the result is not finite, retry once with
    ///   forward differences.
    ///
    /// # Errors
    /// - Model errors from `grad` (anything but `GradientNotImplemented`).
    /// - Errors raised by cost evaluations during differencing.
    /// - Validation errors for wrong length or non-finite entries.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, theta.len())?;
                Ok(-g)
            }
            Err(err) if is_rejectable(&err) => match self.rejected_gradient(theta) {
                Some(g) => Ok(g),
                None => Err(err.into()),
            },
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.cost(theta) {
                        Ok(val) => val,
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                match run_central_diff(theta, &cost_func, &closure_err) {
                    Ok(g) => Ok(g),
                    Err(_) => Ok(run_fd_diff(theta, &cost_func, &closure_err)?),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<'a, F: LogLikelihood> ArgMinAdapter<'a, F> {
    /// Construct a new adapter over a model and its data.
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data, anchor: RefCell::new(None), rejected: Cell::new(0) }
    }

    /// Number of trial points answered with the rejected-trial cost.
    pub fn rejected_trials(&self) -> usize {
        self.rejected.get()
    }

    /// Cost reported for a trial point the model could not evaluate:
    /// `c(θ₀) + REJECT_MARGIN·(1 + |c(θ₀)|) + ½‖θ − θ_best‖²`.
    ///
    /// Any accepted line-search point has a cost at or below `c(θ₀)`, so the
    /// value always fails the sufficient-decrease test, and the quadratic
    /// term gives the search a finite slope pointing back to `θ_best`.
    /// `None` before the first successful evaluation.
    pub fn rejected_cost(&self, theta: &Theta) -> Option<Cost> {
        let anchor = self.anchor.borrow();
        let anchor = anchor.as_ref()?;
        if anchor.best_theta.len() != theta.len() {
            return None;
        }
        let diff = theta - &anchor.best_theta;
        let base = anchor.start_cost + REJECT_MARGIN * (1.0 + anchor.start_cost.abs());
        Some(base + 0.5 * diff.dot(&diff))
    }

    /// Gradient of [`Self::rejected_cost`]: `θ − θ_best`.
    ///
    /// `None` before the first successful evaluation and at `θ_best` itself,
    /// where a zero gradient would read as convergence.
    fn rejected_gradient(&self, theta: &Theta) -> Option<Grad> {
        let anchor = self.anchor.borrow();
        let anchor = anchor.as_ref()?;
        if anchor.best_theta.len() != theta.len() || anchor.best_theta == *theta {
            return None;
        }
        Some(theta - &anchor.best_theta)
    }

    fn record(&self, theta: &Theta, cost: Cost) {
        let mut anchor = self.anchor.borrow_mut();
        match anchor.as_mut() {
            None => {
                *anchor =
                    Some(Anchor { start_cost: cost, best_cost: cost, best_theta: theta.clone() });
            }
            Some(a) if cost < a.best_cost && a.best_theta.len() == theta.len() => {
                a.best_cost = cost;
                a.best_theta.assign(theta);
            }
            Some(_) => {}
        }
    }
}

/// Failures that only say "this θ is numerically unusable".
fn is_rejectable(err: &OptError) -> bool {
    matches!(err, OptError::ModelEvaluation { .. } | OptError::NonFiniteCost { .. })
}
