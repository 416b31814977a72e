//! Execution helper that runs an `argmin` solver on a log-likelihood problem and
//! returns a crate-friendly [`OptimOutcome`].
//!
//! A solver error does not discard the work already done: an observer records
//! the best iterate after every iteration, and a failed run is reported as an
//! interrupted outcome carrying that iterate and the error.
use std::sync::{Arc, Mutex};

use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{
        FnEvalMap, Grad, LogLikelihood, MLEOptions, OptimOutcome, Theta, adapter::ArgMinAdapter,
    },
};
#[cfg(feature = "obs_slog")]
use argmin::core::{CostFunction, Gradient};
use argmin::core::{
    Error, Executor, IterState, KV, State,
    observers::{Observe, ObserverMode},
};
#[cfg(feature = "obs_slog")]
use argmin_math::ArgminL2Norm;

type LbfgsState = IterState<Theta, Grad, (), (), (), f64>;

/// `fn_evals` key counting trial points the model could not evaluate.
pub const REJECTED_TRIALS: &str = "rejected_trials";

/// Progress snapshot shared between the executor's observer and the runner.
#[derive(Debug, Default, Clone)]
struct Progress {
    iterations: u64,
    best_param: Option<Theta>,
    best_cost: Option<f64>,
    fn_evals: FnEvalMap,
}

/// Observer that copies the best iterate out of the solver state after every
/// iteration, so it survives an `Err` from `Executor::run`.
#[derive(Debug, Clone, Default)]
struct ProgressTracker {
    inner: Arc<Mutex<Progress>>,
}

impl Observe<LbfgsState> for ProgressTracker {
    fn observe_iter(&mut self, state: &LbfgsState, _kv: &KV) -> Result<(), Error> {
        if let Ok(mut progress) = self.inner.lock() {
            progress.iterations = state.get_iter() + 1;
            if let Some(best) = state.get_best_param() {
                progress.best_param = Some(best.clone());
                progress.best_cost = Some(state.get_best_cost());
            }
            progress.fn_evals = state.get_func_counts().clone();
        }
        Ok(())
    }
}

impl ProgressTracker {
    fn snapshot(&self) -> Progress {
        match self.inner.lock() {
            Ok(progress) => progress.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Run an `argmin` optimization for a log-likelihood problem.
///
/// This is the shared runner used by both line-search variants. It wires up:
/// - the model via [`ArgMinAdapter`],
/// - the chosen `Solver` (L-BFGS with Hager–Zhang/More–Thuente),
/// - the initial parameter `theta0`,
/// - a progress observer (always) and the slog observer (`obs_slog`),
/// - optional `max_iters`,
///   then executes the solver and converts the result into [`OptimOutcome`].
///
/// # Returns
/// - On a clean run: the validated outcome (best point, `ℓ(θ̂)`, status,
///   counters, last gradient norm).
/// - On a solver error, or when the final state fails validation: an
///   [`OptimOutcome::interrupted`] holding the best iterate recorded by the
///   observer (falling back to `theta0` if no iteration completed), the
///   number of completed iterations, and the error.
///
/// # Errors
/// - Only the `obs_slog` pre-run diagnostics can fail here; solver errors are
///   folded into the outcome.
///
/// # Examples
/// ```ignore
/// let problem = ArgMinAdapter::new(&model, &data);
/// let solver  = build_optimizer_hager_zhang(&opts)?;
/// let out     = run_lbfgs(theta0.clone(), &opts, problem, solver)?;
/// println!("done in {} iters, status: {}", out.iterations, out.status);
/// ```
pub fn run_lbfgs<'a, F, S>(
    theta0: Theta, opts: &MLEOptions, problem: ArgMinAdapter<'a, F>, solver: S,
) -> OptResult<OptimOutcome>
where
    F: LogLikelihood,
    S: argmin::core::Solver<ArgMinAdapter<'a, F>, LbfgsState> + Send + 'static,
{
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        log_initial_state(&theta0, &problem)?;
    }
    let tracker = ProgressTracker::default();
    let fallback = theta0.clone();
    let mut optimizer = Executor::new(problem, solver);
    optimizer = optimizer.configure(|state| state.param(theta0));
    optimizer = optimizer.add_observer(tracker.clone(), ObserverMode::Always);
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }

    match optimizer.run() {
        Ok(res) => {
            let mut result = res.state().clone();
            let iterations = result.get_iter();
            let mut function_counts = result.get_func_counts().clone();
            if let Some(problem) = res.problem.problem.as_ref() {
                function_counts
                    .insert(REJECTED_TRIALS.to_string(), problem.rejected_trials() as u64);
            }
            let termination = result.get_termination_status().clone();
            let grad = result.take_gradient();
            let best_cost = result.get_best_cost();
            let best_param = result.take_best_param();
            let salvage = best_param.clone().unwrap_or(fallback);
            OptimOutcome::new(
                best_param,
                -best_cost,
                termination,
                iterations,
                function_counts.clone(),
                grad,
            )
            .or_else(|err| {
                Ok(OptimOutcome::interrupted(
                    salvage,
                    -best_cost,
                    iterations as usize,
                    function_counts,
                    err,
                ))
            })
        }
        Err(err) => Ok(interrupted_from(tracker.snapshot(), fallback, OptError::from(err))),
    }
}

// ---- Helper Methods ----

fn interrupted_from(progress: Progress, fallback: Theta, failure: OptError) -> OptimOutcome {
    let value = progress.best_cost.map(|c| -c).unwrap_or(f64::NAN);
    let theta = progress.best_param.unwrap_or(fallback);
    OptimOutcome::interrupted(
        theta,
        value,
        progress.iterations as usize,
        progress.fn_evals,
        failure,
    )
}

#[cfg(feature = "obs_slog")]
fn log_initial_state<F>(theta0: &Theta, problem: &ArgMinAdapter<'_, F>) -> OptResult<()>
where
    F: LogLikelihood,
{
    let ll0 = -problem.cost(theta0)?;
    let g0n = problem.gradient(theta0).ok().map(|g| g.l2_norm());

    eprintln!(
        "init: ell(theta0) = {:.6}{}",
        ll0,
        g0n.map(|n| format!(", ||grad|| = {:.6}", n)).unwrap_or_default()
    );
    Ok(())
}
