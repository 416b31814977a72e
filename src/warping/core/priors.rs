//! Priors over kernel hyperparameters and the warp.
//!
//! Purpose
//! -------
//! Supply the log-density term the composite model adds to the GP marginal
//! likelihood, with its exact gradient over the full parameter vector.
//!
//! Key behaviors
//! -------------
//! - [`PriorModel`] is the capability seam: it may introduce its own
//!   hyperparameters (region 2 of the layout) and reads kernel
//!   hyperparameters and warp log-rates directly from the parameter vector.
//! - [`GaussianPriors`] places one normal density per kernel hyperparameter,
//!   chosen by [`HyperRole`]: log-variance `N(-1, 1)` (scales mostly below
//!   one), log-length-scale `N(-2, 2)`, log-noise `N(-0.5, 1)`.
//! - It adds a renewal-process prior on the warp with one extra
//!   hyperparameter `t`: `t ~ N(-σ²/2, σ)` with `σ = 1/√(1 + m)` for `m` warp
//!   rates, and each log-rate `θᵢ ~ N(0, eᵗ)`. The spread of `t` shrinks as
//!   the window grows, so longer windows pull the warp towards identity.
//!
//! Invariants & assumptions
//! ------------------------
//! - The prior's kernel arity must match the GP it is paired with; the
//!   composite model checks this at construction.
//! - Densities come from `statrs::distribution::Normal`; an invalid scale
//!   (e.g. `eᵗ` overflowing) is `WarpError::InvalidDensity`, a numerical
//!   failure.
//!
//! Conventions
//! -----------
//! - All densities are over log-scale quantities.
//! - Gradients are analytic: `∂/∂x log N(x; μ, σ) = -(x - μ)/σ²`, and for the
//!   rate terms `∂/∂θ = -θ e^{-2t}`, `∂/∂t = -1 + θ² e^{-2t}`.
use statrs::distribution::{Continuous, Normal};

use crate::gp::kernel::{HyperParam, HyperRole};
use crate::warping::{
    core::layout::ParamLayout,
    errors::{WarpError, WarpResult},
};

/// Log-density capability over the composite parameter vector.
pub trait PriorModel: std::fmt::Debug + Send + Sync {
    /// Prior-introduced hyperparameters (layout region 2), possibly empty.
    fn params(&self) -> &'static [HyperParam];

    fn n_theta(&self) -> usize {
        self.params().len()
    }

    /// Number of kernel hyperparameters this prior expects.
    fn n_kernel(&self) -> usize;

    /// Log-density of `x` laid out by `layout`; when `grad` is given it is
    /// overwritten with the gradient over all of `x`.
    fn observe(&self, x: &[f64], layout: &ParamLayout, grad: Option<&mut [f64]>)
        -> WarpResult<f64>;
}

/// One normal density on a log-scale hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalPrior {
    mean: f64,
    std: f64,
    density: Normal,
}

impl NormalPrior {
    /// # Errors
    /// - `WarpError::InvalidDensity` if `std` is not positive or either
    ///   argument is not finite.
    pub fn new(mean: f64, std: f64) -> WarpResult<Self> {
        Ok(Self { mean, std, density: Normal::new(mean, std)? })
    }

    /// Default prior for a hyperparameter of the given role.
    pub fn for_role(role: HyperRole) -> WarpResult<Self> {
        match role {
            HyperRole::Variance => Self::new(-1.0, 1.0),
            HyperRole::LengthScale => Self::new(-2.0, 2.0),
            HyperRole::Noise => Self::new(-0.5, 1.0),
            HyperRole::Warp => Self::new(0.0, 1.0),
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    #[inline]
    fn ln_pdf(&self, x: f64) -> f64 {
        self.density.ln_pdf(x)
    }

    #[inline]
    fn d_ln_pdf(&self, x: f64) -> f64 {
        -(x - self.mean) / (self.std * self.std)
    }
}

const RENEWAL_PARAMS: [HyperParam; 1] = [HyperParam::new("t", HyperRole::Warp)];

/// Role-based normal priors on kernel hyperparameters plus the renewal warp
/// prior.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPriors {
    hyper: Vec<NormalPrior>,
}

impl GaussianPriors {
    pub fn new(hyper: Vec<NormalPrior>) -> Self {
        Self { hyper }
    }

    /// Default priors for the given kernel hyperparameters, in order.
    pub fn for_params<'a>(params: impl IntoIterator<Item = &'a HyperParam>) -> WarpResult<Self> {
        let hyper = params
            .into_iter()
            .map(|p| NormalPrior::for_role(p.role))
            .collect::<WarpResult<Vec<_>>>()?;
        Ok(Self { hyper })
    }

    pub fn hyper(&self) -> &[NormalPrior] {
        &self.hyper
    }

    /// Density of the warp hyperparameter `t` for `m` warp rates.
    pub fn renewal(m: usize) -> WarpResult<NormalPrior> {
        let sigma = 1.0 / (1.0 + m as f64).sqrt();
        NormalPrior::new(-0.5 * sigma * sigma, sigma)
    }
}

impl PriorModel for GaussianPriors {
    fn params(&self) -> &'static [HyperParam] {
        &RENEWAL_PARAMS
    }

    fn n_kernel(&self) -> usize {
        self.hyper.len()
    }

    fn observe(
        &self, x: &[f64], layout: &ParamLayout, mut grad: Option<&mut [f64]>,
    ) -> WarpResult<f64> {
        if layout.n_kernel() != self.n_kernel() {
            return Err(WarpError::PriorArityMismatch {
                expected: self.n_kernel(),
                found: layout.n_kernel(),
            });
        }
        if layout.n_prior != self.n_theta() {
            return Err(WarpError::ParamLengthMismatch {
                expected: self.n_theta(),
                found: layout.n_prior,
            });
        }
        layout.check(x.len())?;
        if let Some(g) = grad.as_deref_mut() {
            if g.len() != x.len() {
                return Err(WarpError::ParamLengthMismatch { expected: x.len(), found: g.len() });
            }
            g.iter_mut().for_each(|v| *v = 0.0);
        }

        let mut ll = 0.0;
        for (k, prior) in self.hyper.iter().enumerate() {
            ll += prior.ln_pdf(x[k]);
            if let Some(g) = grad.as_deref_mut() {
                g[k] = prior.d_ln_pdf(x[k]);
            }
        }

        // Renewal process.
        let t_idx = layout.prior().start;
        let t = x[t_idx];
        let rates = layout.rates();
        let t_prior = Self::renewal(rates.len())?;
        ll += t_prior.ln_pdf(t);
        let mut d_t = t_prior.d_ln_pdf(t);

        let rate_std = t.exp();
        let rate_density = Normal::new(0.0, rate_std)
            .map_err(|_| WarpError::InvalidDensity { what: "warp rate std", value: rate_std })?;
        let inv_var = (-2.0 * t).exp();
        for k in rates {
            let theta = x[k];
            ll += rate_density.ln_pdf(theta);
            d_t += -1.0 + theta * theta * inv_var;
            if let Some(g) = grad.as_deref_mut() {
                g[k] = -theta * inv_var;
            }
        }
        if let Some(g) = grad.as_deref_mut() {
            g[t_idx] = d_t;
        }

        if !ll.is_finite() {
            return Err(WarpError::InvalidDensity { what: "log density", value: ll });
        }
        Ok(ll)
    }
}
