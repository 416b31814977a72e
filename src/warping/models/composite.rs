//! Composite warped-time GP model — the single integration point between the
//! warp, the GP engine, and the prior.
//!
//! Purpose
//! -------
//! Own the parameter-vector layout, evaluate the total log-likelihood
//! `ℓ(x) = ℓ_GP(flat(x)) + ℓ_prior(x)`, and assemble its gradient over the
//! whole parameter vector by chaining the GP gradient through the warp.
//!
//! Key behaviors
//! -------------
//! - [`WarpedGpModel::observe`] validates the length, warps the window's
//!   inputs, builds the engine's flat vector `[kernel θ | (wᵢ, xᵢ)… | y…]`,
//!   evaluates both sub-models with their gradients, and records them on the
//!   model's [`Tape`].
//! - [`WarpedGpModel::gradient`] consumes the tape:
//!   1. start from the prior gradient,
//!   2. add the GP kernel/noise partials onto the shared coordinates,
//!   3. add the suffix-sum rate sensitivity for every warp log-rate,
//!   4. for [`ModelVariant::LatentInputs`], route input/output partials onto
//!      the latent copies, then pin the last latent input and all latent
//!      outputs to exactly zero.
//! - [`WarpedGpModel::forecast`] queries the posterior at one new input,
//!   extrapolating the warp with a unit rate.
//! - Implements [`LogLikelihood`] with [`Window`] as data, so the optimizer
//!   stack drives it directly.
//!
//! Invariants & assumptions
//! ------------------------
//! - The tape is reset at the start of every `observe` and written only on
//!   success; `gradient` without a matching `observe` is
//!   `WarpError::TapeEmpty`.
//! - Repeated evaluation at the same point is bit-for-bit deterministic.
//! - The prior's kernel arity equals the GP's (checked in
//!   [`WarpedGpModel::new`]).
//!
//! Conventions
//! -----------
//! - Each GP input point is `(warped time, raw time)`: the similarity sees
//!   the warp, periodic components can still see the raw clock.
//!
//! Downstream usage
//! ----------------
//! - [`crate::warping::models::forecast::ForecastLoop`] builds one model per
//!   run and refits it on every window.
//!
//! Testing notes
//! -------------
//! - Gradient against forward differences for window sizes 1–4 and both
//!   variants, pinned-coordinate zeroing, tape misuse, determinism.
use std::cell::RefCell;

use ndarray::Array1;

use crate::gp::{
    engine::{GaussianProcess, INPUT_DIM},
    kernel::{RAW, WARPED},
};
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Grad, LogLikelihood, Theta},
};
use crate::warping::{
    core::{
        data::Window,
        layout::ParamLayout,
        options::{InitPolicy, ModelSpec, ModelVariant},
        priors::{GaussianPriors, PriorModel},
        tape::{Tape, TapeEntry},
        transform::{input_sensitivity, next_warped, rate_sensitivity, warp_forward},
    },
    errors::{WarpError, WarpResult},
};

/// Posterior predictive at one forecast input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub mean: f64,
    /// Latent-function standard deviation (noise excluded).
    pub std: f64,
    pub noise_std: f64,
}

/// GP regression on a warped time axis with priors over all parameters.
#[derive(Debug)]
pub struct WarpedGpModel<P: PriorModel = GaussianPriors> {
    gp: GaussianProcess,
    prior: P,
    variant: ModelVariant,
    tape: RefCell<Tape>,
}

impl WarpedGpModel<GaussianPriors> {
    /// Build the GP from `spec` and pair it with role-based default priors.
    ///
    /// # Errors
    /// - `WarpError::Gp` when a capability rejects its parameters.
    pub fn from_spec(spec: &ModelSpec, variant: ModelVariant) -> WarpResult<Self> {
        let gp = GaussianProcess::new(spec.similarity.build()?, spec.noise.build()?);
        let prior = GaussianPriors::for_params(gp.params())?;
        Self::new(gp, prior, variant)
    }
}

impl<P: PriorModel> WarpedGpModel<P> {
    /// # Errors
    /// - `WarpError::PriorArityMismatch` if the prior expects a different
    ///   number of kernel hyperparameters than `gp` carries.
    pub fn new(gp: GaussianProcess, prior: P, variant: ModelVariant) -> WarpResult<Self> {
        if prior.n_kernel() != gp.n_theta() {
            return Err(WarpError::PriorArityMismatch {
                expected: prior.n_kernel(),
                found: gp.n_theta(),
            });
        }
        Ok(Self { gp, prior, variant, tape: RefCell::new(Tape::new()) })
    }

    pub fn gp(&self) -> &GaussianProcess {
        &self.gp
    }

    pub fn prior(&self) -> &P {
        &self.prior
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn layout(&self, n_points: usize) -> ParamLayout {
        ParamLayout {
            n_simil: self.gp.similarity().n_theta(),
            n_noise: self.gp.noise().n_theta(),
            n_prior: self.prior.n_theta(),
            n_points,
            variant: self.variant,
        }
    }

    /// Names of the kernel and prior hyperparameters, in layout order.
    pub fn hyper_names(&self) -> Vec<&'static str> {
        self.gp.params().chain(self.prior.params().iter()).map(|p| p.name).collect()
    }

    /// Starting point for a fit on `window`.
    ///
    /// Hyperparameters and rates come from `init`; latent copies start at the
    /// observations.
    pub fn initial_point(&self, window: &Window, init: &InitPolicy) -> Vec<f64> {
        let layout = self.layout(window.len());
        let mut x = init.initial_point(layout.rates().end, window.len());
        if self.variant == ModelVariant::LatentInputs {
            x.extend_from_slice(&window.x);
            x.extend_from_slice(&window.y);
        }
        x
    }

    /// Drop the recorded evaluation.
    pub fn release(&self) {
        self.tape.borrow_mut().release();
    }

    /// Composite log-likelihood at `x`; records both sub-gradients.
    ///
    /// # Errors
    /// - `WarpError::ParamLengthMismatch` if `x` does not fit the layout for
    ///   this window.
    /// - Numerical failures from the GP engine or the prior (see
    ///   [`WarpError::is_numerical`]); the tape is left empty.
    pub fn observe(&self, x: &[f64], window: &Window) -> WarpResult<f64> {
        self.tape.borrow_mut().release();
        let layout = self.layout(window.len());
        layout.check(x.len())?;
        let (inputs, outputs) = self.inputs_outputs(x, window, &layout);
        let flat = self.gp_flat(x, &layout, inputs, outputs)?;

        let mut gp_grad = vec![0.0; flat.len()];
        let ll_gp = self.gp.observe(&flat, Some(&mut gp_grad))?;
        let mut prior_grad = vec![0.0; x.len()];
        let ll_prior = self.prior.observe(x, &layout, Some(&mut prior_grad))?;
        let value = ll_gp + ll_prior;

        self.tape.borrow_mut().record(TapeEntry {
            x: x.to_vec(),
            value,
            inputs: inputs.to_vec(),
            prior_grad,
            gp_grad,
        });
        Ok(value)
    }

    /// Gradient of the last successful [`WarpedGpModel::observe`].
    ///
    /// # Errors
    /// - `WarpError::TapeEmpty` if there is no recorded evaluation.
    /// - `WarpError::ParamLengthMismatch` if the recording belongs to a
    ///   different window size.
    pub fn gradient(&self, window: &Window) -> WarpResult<Vec<f64>> {
        let tape = self.tape.borrow();
        let entry = tape.entry()?;
        let layout = self.layout(window.len());
        layout.check(entry.x.len())?;
        self.assemble(entry, &layout)
    }

    /// `observe` followed by `gradient`.
    pub fn value_and_gradient(&self, x: &[f64], window: &Window) -> WarpResult<(f64, Vec<f64>)> {
        let value = self.observe(x, window)?;
        Ok((value, self.gradient(window)?))
    }

    /// Posterior predictive at `next_x` given parameters `x` fitted on
    /// `window`.
    ///
    /// # Errors
    /// - `WarpError::ParamLengthMismatch` for a mis-sized `x`.
    /// - `WarpError::Gp` when the covariance is singular or `next_x` is not
    ///   finite.
    pub fn forecast(&self, x: &[f64], window: &Window, next_x: f64) -> WarpResult<Forecast> {
        let layout = self.layout(window.len());
        layout.check(x.len())?;
        let (inputs, outputs) = self.inputs_outputs(x, window, &layout);
        let flat = self.gp_flat(x, &layout, inputs, outputs)?;
        let warped = warp_forward(inputs, &x[layout.rates()])?;
        let (last_raw, last_warped) = match (inputs.last(), warped.last()) {
            (Some(&r), Some(&w)) => (r, w),
            _ => return Err(WarpError::EmptySeries),
        };
        let z = next_warped(last_raw, last_warped, next_x, 0.0);
        let post = self.gp.produce(&flat, &[z, next_x])?;
        Ok(Forecast { mean: post.mean[0], std: post.std[0], noise_std: post.noise_std })
    }

    // ---- Internals ----

    fn inputs_outputs<'a>(
        &self, x: &'a [f64], window: &'a Window, layout: &ParamLayout,
    ) -> (&'a [f64], &'a [f64]) {
        match self.variant {
            ModelVariant::Warped => (&window.x, &window.y),
            ModelVariant::LatentInputs => (&x[layout.latent_inputs()], &x[layout.latent_outputs()]),
        }
    }

    fn gp_flat(
        &self, x: &[f64], layout: &ParamLayout, inputs: &[f64], outputs: &[f64],
    ) -> WarpResult<Vec<f64>> {
        let warped = warp_forward(inputs, &x[layout.rates()])?;
        let mut flat = Vec::with_capacity(self.gp.flat_len(inputs.len()));
        flat.extend_from_slice(&x[layout.kernel()]);
        for (w, r) in warped.iter().zip(inputs) {
            let mut point = [0.0; INPUT_DIM];
            point[WARPED] = *w;
            point[RAW] = *r;
            flat.extend_from_slice(&point);
        }
        flat.extend_from_slice(outputs);
        Ok(flat)
    }

    fn assemble(&self, entry: &TapeEntry, layout: &ParamLayout) -> WarpResult<Vec<f64>> {
        let nk = layout.n_kernel();
        let n = layout.n_points;
        let gp = &entry.gp_grad;
        let mut g = entry.prior_grad.clone();

        for k in layout.kernel() {
            g[k] += gp[k];
        }

        let point = |i: usize, c: usize| gp[nk + i * INPUT_DIM + c];
        let g_warped: Vec<f64> = (0..n).map(|i| point(i, WARPED)).collect();
        let rates = &entry.x[layout.rates()];
        let mut d_rates = vec![0.0; rates.len()];
        rate_sensitivity(&entry.inputs, rates, &g_warped, &mut d_rates)?;
        for (k, d) in layout.rates().zip(&d_rates) {
            g[k] += d;
        }

        if self.variant == ModelVariant::LatentInputs {
            let mut d_inputs = vec![0.0; n];
            input_sensitivity(rates, &g_warped, &mut d_inputs)?;
            for (i, k) in layout.latent_inputs().enumerate() {
                g[k] += d_inputs[i] + point(i, RAW);
            }
            let out = nk + n * INPUT_DIM;
            for (i, k) in layout.latent_outputs().enumerate() {
                g[k] += gp[out + i];
            }
            // Last input and all outputs are fixed targets.
            if let Some(last) = layout.latent_inputs().last() {
                g[last] = 0.0;
            }
            for k in layout.latent_outputs() {
                g[k] = 0.0;
            }
        }
        Ok(g)
    }
}

impl<P: PriorModel> LogLikelihood for WarpedGpModel<P> {
    type Data = Window;

    fn value(&self, theta: &Theta, data: &Window) -> OptResult<f64> {
        Ok(self.observe(&theta.to_vec(), data)?)
    }

    /// Length must match the layout for `data`; entries must be finite.
    fn check(&self, theta: &Theta, data: &Window) -> OptResult<()> {
        self.layout(data.len()).check(theta.len())?;
        if let Some((index, value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OptError::ModelInput {
                text: format!("non-finite starting value {value} at index {index}"),
            });
        }
        Ok(())
    }

    /// Reuses the tape when the optimizer asks for the gradient at the point
    /// it just evaluated.
    fn grad(&self, theta: &Theta, data: &Window) -> OptResult<Grad> {
        let x = theta.to_vec();
        let recorded = self.tape.borrow().entry_at(&x).is_some();
        if !recorded {
            self.observe(&x, data)?;
        }
        Ok(Array1::from(self.gradient(data)?))
    }
}
