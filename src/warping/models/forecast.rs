//! Expanding-window one-step-ahead forecasting loop.
//!
//! Purpose
//! -------
//! Backtest a [`WarpedGpModel`] on a series: for each prefix length `end`
//! from `min_window` up to `len - 1`, fit from a fresh starting point,
//! forecast `X[end]`, and emit one [`ForecastRecord`].
//!
//! Key behaviors
//! -------------
//! - Per step: initial point from the `InitPolicy` → diagnostic `ll0` →
//!   maximize through the [`Maximizer`] seam → diagnostic `ll` at the
//!   returned point → posterior predictive at the next input → record.
//! - Optimizer failure never aborts the run: the returned point (best
//!   iterate or the start) is used as is. A failure at or below
//!   `warn_within` iterations is logged with `tracing::warn!` because it
//!   means the fit never got going; later failures are logged at debug.
//! - Numerical failures while evaluating diagnostics or forecasting mark the
//!   value `NaN` / the forecast `None`, are logged, and the loop moves on.
//!   Everything else (shape errors, configuration errors, a maximizer that
//!   refuses to start) stops the run with `Err`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Steps are independent: nothing but the read-only series carries over
//!   from one step to the next.
//! - The model tape is released after every diagnostic evaluation.
//!
//! Conventions
//! -----------
//! - With `normalize`, outputs are standardised once for the whole run and
//!   records are reported in standardised units.
//! - `hyper` holds `exp` of the kernel and prior hyperparameters in layout
//!   order; [`ForecastLoop::hyper_names`] gives their names.
use ndarray::Array1;
use tracing::{debug, info, warn};

use crate::optimization::loglik_optimizer::{MLEOptions, Maximizer};
use crate::warping::{
    core::{
        data::{Series, Window},
        options::{ForecastOptions, ModelSpec},
        priors::{GaussianPriors, PriorModel},
    },
    errors::{WarpError, WarpResult},
    models::composite::{Forecast, WarpedGpModel},
};

/// Output of one forecasting step.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    /// Window size the step was fitted on; also the index of the forecast
    /// target.
    pub end: usize,
    pub input: f64,
    pub actual: f64,
    /// `None` when the posterior could not be computed.
    pub forecast: Option<Forecast>,
    /// Log-likelihood at the initial point.
    pub ll0: f64,
    /// Log-likelihood at the fitted point.
    pub ll: f64,
    /// Exponentiated kernel and prior hyperparameters.
    pub hyper: Vec<f64>,
    pub iterations: usize,
    pub status: String,
    pub converged: bool,
}

/// Expanding-window backtest driver.
#[derive(Debug)]
pub struct ForecastLoop<P: PriorModel = GaussianPriors, M: Maximizer = MLEOptions> {
    model: WarpedGpModel<P>,
    maximizer: M,
    opts: ForecastOptions,
}

impl ForecastLoop<GaussianPriors, MLEOptions> {
    /// Build the model from `spec` (with `opts.variant`) and drive it with
    /// L-BFGS.
    pub fn from_spec(spec: &ModelSpec, mle: MLEOptions, opts: ForecastOptions) -> WarpResult<Self> {
        let model = WarpedGpModel::from_spec(spec, opts.variant)?;
        Self::new(model, mle, opts)
    }
}

impl<P: PriorModel, M: Maximizer> ForecastLoop<P, M> {
    /// # Errors
    /// - `WarpError::InvalidOption` for invalid options or when the model's
    ///   variant differs from `opts.variant`.
    pub fn new(model: WarpedGpModel<P>, maximizer: M, opts: ForecastOptions) -> WarpResult<Self> {
        opts.validate()?;
        if model.variant() != opts.variant {
            return Err(WarpError::InvalidOption {
                name: "variant",
                value: format!("{:?}", opts.variant),
                reason: "Model was built for a different variant.",
            });
        }
        Ok(Self { model, maximizer, opts })
    }

    pub fn model(&self) -> &WarpedGpModel<P> {
        &self.model
    }

    pub fn options(&self) -> &ForecastOptions {
        &self.opts
    }

    pub fn set_normalize(&mut self, normalize: bool) {
        self.opts.normalize = normalize;
    }

    pub fn hyper_names(&self) -> Vec<&'static str> {
        self.model.hyper_names()
    }

    /// The series the steps run on: standardised when `normalize` is set.
    ///
    /// # Errors
    /// - `WarpError::DegenerateOutputs` when standardisation is impossible.
    pub fn prepare(&self, series: &Series) -> WarpResult<Series> {
        if self.opts.normalize {
            let (z, st) = series.standardized()?;
            debug!(mean = st.mean, std = st.std, "standardised outputs");
            Ok(z)
        } else {
            Ok(series.clone())
        }
    }

    /// Run every step on `series`, handing each record to `f` as soon as it
    /// is ready. Returns the number of steps.
    ///
    /// # Errors
    /// - Fatal errors from [`ForecastLoop::step`], or the first error `f`
    ///   returns.
    pub fn for_each_step<F>(&self, series: &Series, mut f: F) -> WarpResult<usize>
    where
        F: FnMut(&ForecastRecord) -> WarpResult<()>,
    {
        let series = self.prepare(series)?;
        let mut steps = 0;
        for end in self.opts.min_window..series.len() {
            let record = self.step(&series, end)?;
            f(&record)?;
            steps += 1;
        }
        info!(steps, "forecasting done");
        Ok(steps)
    }

    /// Collect all records.
    pub fn run(&self, series: &Series) -> WarpResult<Vec<ForecastRecord>> {
        let mut records = Vec::new();
        self.for_each_step(series, |r| {
            records.push(r.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// Fit on `X[0:end]` and forecast `X[end]`. `series` is used as given
    /// (no standardisation).
    ///
    /// # Errors
    /// - `WarpError::WindowOutOfRange` unless `1 <= end < series.len()`.
    /// - Non-numerical model errors and maximizer start-up errors.
    pub fn step(&self, series: &Series, end: usize) -> WarpResult<ForecastRecord> {
        if end >= series.len() {
            return Err(WarpError::WindowOutOfRange { end, len: series.len() });
        }
        let window = series.window(end)?;
        let input = series.x()[end];
        let actual = series.y()[end];

        let x0 = self.model.initial_point(&window, &self.opts.init);
        let ll0 = self.diagnostic(&x0, &window, end, "initial")?;

        let outcome = self.maximizer.maximize(&self.model, Array1::from(x0), &window)?;
        match &outcome.failure {
            Some(failure) if outcome.iterations <= self.opts.warn_within => {
                warn!(end, iterations = outcome.iterations, %failure, "failed to optimize");
            }
            Some(failure) => {
                debug!(end, iterations = outcome.iterations, %failure, "optimizer stopped early");
            }
            None => {
                debug!(end, iterations = outcome.iterations, status = %outcome.status, "optimizer finished");
            }
        }

        let theta = outcome.theta_hat.to_vec();
        let ll = self.diagnostic(&theta, &window, end, "fitted")?;

        let forecast = match self.model.forecast(&theta, &window, input) {
            Ok(f) => Some(f),
            Err(e) if e.is_numerical() => {
                warn!(end, error = %e, "failed to forecast");
                None
            }
            Err(e) => return Err(e),
        };

        let layout = self.model.layout(window.len());
        let hyper = theta[..layout.n_hyper()].iter().map(|v| v.exp()).collect();

        info!(
            end,
            ll0,
            ll,
            iterations = outcome.iterations,
            status = %outcome.status,
            "forecast step"
        );
        Ok(ForecastRecord {
            end,
            input,
            actual,
            forecast,
            ll0,
            ll,
            hyper,
            iterations: outcome.iterations,
            status: outcome.status,
            converged: outcome.converged,
        })
    }

    /// Log-likelihood for reporting; numerical failures become `NaN`.
    fn diagnostic(&self, x: &[f64], window: &Window, end: usize, which: &str) -> WarpResult<f64> {
        let result = self.model.observe(x, window);
        self.model.release();
        match result {
            Ok(v) => Ok(v),
            Err(e) if e.is_numerical() => {
                warn!(end, which, error = %e, "log-likelihood not available");
                Ok(f64::NAN)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::{engine::GaussianProcess, kernel::Matern52, noise::ConstantNoise};
    use crate::optimization::{
        errors::{OptError, OptResult},
        loglik_optimizer::{FnEvalMap, LogLikelihood, OptimOutcome, Theta},
    };
    use crate::warping::core::options::ModelVariant;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Record count and contents over a short series.
    // - Resilience to an optimizer failing after one iteration.
    // - Numerical failures at the fitted point.
    // - Fatal errors from the maximizer.
    // -------------------------------------------------------------------------

    /// Returns the start point as a failure after one iteration.
    struct FailAfterOne;

    impl Maximizer for FailAfterOne {
        fn maximize<F: LogLikelihood>(
            &self, _f: &F, theta0: Theta, _data: &F::Data,
        ) -> OptResult<OptimOutcome> {
            Ok(OptimOutcome::interrupted(
                theta0,
                f64::NAN,
                1,
                FnEvalMap::new(),
                OptError::ModelEvaluation { text: "line search failed".into() },
            ))
        }
    }

    /// Returns a point with an enormous length scale.
    struct Degenerate;

    impl Maximizer for Degenerate {
        fn maximize<F: LogLikelihood>(
            &self, _f: &F, theta0: Theta, _data: &F::Data,
        ) -> OptResult<OptimOutcome> {
            let mut theta = theta0;
            theta[1] = 60.0;
            Ok(OptimOutcome::interrupted(
                theta,
                f64::NAN,
                3,
                FnEvalMap::new(),
                OptError::ModelEvaluation { text: "stalled".into() },
            ))
        }
    }

    /// Refuses to start.
    struct Refuses;

    impl Maximizer for Refuses {
        fn maximize<F: LogLikelihood>(
            &self, _f: &F, _theta0: Theta, _data: &F::Data,
        ) -> OptResult<OptimOutcome> {
            Err(OptError::InvalidLBFGSMem { mem: 0, reason: "test" })
        }
    }

    fn series() -> Series {
        Series::new(vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![-0.3, 0.2, -0.1, 0.0, 0.4])
            .expect("valid series")
    }

    fn default_model() -> WarpedGpModel {
        WarpedGpModel::from_spec(&ModelSpec::default(), ModelVariant::Warped).expect("builds")
    }

    #[test]
    // Purpose
    // -------
    // A failing optimizer still yields one forecast record per step.
    //
    // Given
    // -----
    // - Five points, min_window 2, a maximizer failing after one iteration.
    //
    // Expect
    // ------
    // - Three records (ends 2, 3, 4), each with a finite forecast, ll = ll0
    //   (the start point was kept), and `converged == false`.
    fn failing_optimizer_does_not_abort() {
        // Arrange
        let opts = ForecastOptions { normalize: false, ..ForecastOptions::default() };
        let fl = ForecastLoop::new(default_model(), FailAfterOne, opts).expect("valid");

        // Act
        let records = fl.run(&series()).expect("run");

        // Assert
        assert_eq!(records.iter().map(|r| r.end).collect::<Vec<_>>(), vec![2, 3, 4]);
        for r in &records {
            let f = r.forecast.expect("forecast available");
            assert!(f.mean.is_finite() && f.std.is_finite());
            assert_eq!(r.ll.to_bits(), r.ll0.to_bits());
            assert!(!r.converged);
            assert_eq!(r.iterations, 1);
            assert_eq!(r.hyper, vec![1.0; 4]);
            assert_eq!(r.input, r.end as f64);
        }
    }

    #[test]
    // Purpose
    // -------
    // A singular covariance at the fitted point invalidates only that step.
    //
    // Given
    // -----
    // - Matérn with zero noise; the maximizer returns log l = 60, making
    //   every covariance entry equal.
    //
    // Expect
    // ------
    // - Records for every step with `ll` NaN and no forecast; `ll0` finite.
    fn numerical_failure_marks_step_invalid() {
        let gp = GaussianProcess::new(Box::new(Matern52), Box::new(ConstantNoise { variance: 0.0 }));
        let priors = GaussianPriors::for_params(gp.params()).expect("valid");
        let model = WarpedGpModel::new(gp, priors, ModelVariant::Warped).expect("valid");
        let opts = ForecastOptions { normalize: false, ..ForecastOptions::default() };
        let fl = ForecastLoop::new(model, Degenerate, opts).expect("valid");

        let records = fl.run(&series()).expect("run continues");

        assert_eq!(records.len(), 3);
        for r in &records {
            assert!(r.ll0.is_finite());
            assert!(r.ll.is_nan());
            assert!(r.forecast.is_none());
        }
    }

    #[test]
    // Purpose
    // -------
    // Start-up errors from the maximizer and bad windows are fatal.
    //
    // Given
    // -----
    // - A maximizer that always returns `Err`; a step past the series end.
    //
    // Expect
    // ------
    // - `WarpError::Optimizer` from `run`; `WindowOutOfRange` from `step`.
    fn startup_errors_are_fatal() {
        let opts = ForecastOptions { normalize: false, ..ForecastOptions::default() };
        let fl = ForecastLoop::new(default_model(), Refuses, opts).expect("valid");
        assert!(matches!(fl.run(&series()), Err(WarpError::Optimizer(_))));
        assert_eq!(
            fl.step(&series(), 5).unwrap_err(),
            WarpError::WindowOutOfRange { end: 5, len: 5 }
        );
    }

    #[test]
    // Purpose
    // -------
    // The streaming API stops on the callback's first error and options are
    // cross-checked against the model.
    //
    // Given
    // -----
    // - A callback failing on the second record; options asking for the
    //   latent variant with a warped model.
    //
    // Expect
    // ------
    // - The callback error is returned after two calls; construction fails.
    fn streaming_and_variant_checks() {
        let opts = ForecastOptions { normalize: false, ..ForecastOptions::default() };
        let fl = ForecastLoop::new(default_model(), FailAfterOne, opts).expect("valid");
        let mut seen = 0;
        let err = fl
            .for_each_step(&series(), |_| {
                seen += 1;
                if seen == 2 { Err(WarpError::Io { text: "closed".into() }) } else { Ok(()) }
            })
            .unwrap_err();
        assert_eq!(seen, 2);
        assert_eq!(err, WarpError::Io { text: "closed".into() });

        let latent = ForecastOptions { variant: ModelVariant::LatentInputs, ..opts };
        assert!(ForecastLoop::new(default_model(), FailAfterOne, latent).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Real L-BFGS fits improve on the starting likelihood.
    //
    // Given
    // -----
    // - The default model, standardised outputs, 30 iterations.
    //
    // Expect
    // ------
    // - Three records; wherever both are finite, ll >= ll0 - 1e-8.
    fn lbfgs_fit_improves_likelihood() {
        let mut mle = MLEOptions::default();
        mle.tols.max_iter = Some(30);
        let fl = ForecastLoop::from_spec(&ModelSpec::default(), mle, ForecastOptions::default())
            .expect("valid");
        let records = fl.run(&series()).expect("run");
        assert_eq!(records.len(), 3);
        for r in records.iter().filter(|r| r.ll.is_finite() && r.ll0.is_finite()) {
            assert!(r.ll >= r.ll0 - 1e-8, "end {}: ll {} < ll0 {}", r.end, r.ll, r.ll0);
        }
    }
}
