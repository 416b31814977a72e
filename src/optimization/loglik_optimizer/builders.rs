//! loglik_optimizer::builders — L-BFGS solver construction.
//!
//! Solvers are built from [`MLEOptions`] alone: history size and the optional
//! gradient / cost-change tolerances. The starting point and the iteration
//! cap belong to the executor and are applied in [`super::run::run_lbfgs`].
//! Tolerances rejected by argmin surface as [`OptError`](crate::optimization::errors::OptError)
//! through the crate's `From<argmin::core::Error>` conversion.
//!
//! Both line searches are bounded to steps in `[ε, MAX_STEP]`. Hager–Zhang
//! otherwise opens its bracket at a step of 1e5 along the L-BFGS direction,
//! which for log-scale parameters lands far outside the representable range.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        traits::MLEOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
};

/// Largest step length, in units of the L-BFGS direction, a line search
/// may try.
pub const MAX_STEP: f64 = 10.0;

/// L-BFGS with a Hager–Zhang line search.
///
/// History size is `opts.lbfgs_mem`, or [`DEFAULT_LBFGS_MEM`] when unset.
///
/// # Errors
/// Tolerances argmin refuses (non-finite or non-positive).
pub fn build_optimizer_hager_zhang(opts: &MLEOptions) -> OptResult<LbfgsHagerZhang> {
    build_lbfgs(HagerZhangLS::new().with_bounds(f64::EPSILON, MAX_STEP)?, opts)
}

/// L-BFGS with a More–Thuente line search.
///
/// Same configuration rules as [`build_optimizer_hager_zhang`].
pub fn build_optimizer_more_thuente(opts: &MLEOptions) -> OptResult<LbfgsMoreThuente> {
    build_lbfgs(MoreThuenteLS::new().with_bounds(f64::EPSILON.sqrt(), MAX_STEP)?, opts)
}

fn build_lbfgs<L>(line_search: L, opts: &MLEOptions) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LBFGS::new(line_search, mem), opts)
}

/// Apply the optional gradient-norm and cost-change tolerances.
///
/// A `None` tolerance leaves argmin's default in place.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &MLEOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}
