//! Parameter-vector layout of the composite model.
//!
//! The optimizer sees one flat vector split into contiguous regions, in
//! order: kernel hyperparameters (similarity then noise, log scale), prior
//! hyperparameters, warp log-rates (one per consecutive pair of inputs), and,
//! for [`ModelVariant::LatentInputs`], latent inputs followed by latent
//! outputs. Region sizes depend only on capability arities and the window
//! size.
use std::ops::Range;

use crate::warping::{
    core::options::ModelVariant,
    errors::{WarpError, WarpResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLayout {
    pub n_simil: usize,
    pub n_noise: usize,
    pub n_prior: usize,
    pub n_points: usize,
    pub variant: ModelVariant,
}

impl ParamLayout {
    pub fn n_kernel(&self) -> usize {
        self.n_simil + self.n_noise
    }

    /// Kernel plus prior hyperparameters (the reported ones).
    pub fn n_hyper(&self) -> usize {
        self.n_kernel() + self.n_prior
    }

    pub fn n_rates(&self) -> usize {
        self.n_points.saturating_sub(1)
    }

    fn n_latent(&self) -> usize {
        match self.variant {
            ModelVariant::Warped => 0,
            ModelVariant::LatentInputs => self.n_points,
        }
    }

    pub fn kernel(&self) -> Range<usize> {
        0..self.n_kernel()
    }

    pub fn prior(&self) -> Range<usize> {
        let start = self.n_kernel();
        start..start + self.n_prior
    }

    pub fn rates(&self) -> Range<usize> {
        let start = self.prior().end;
        start..start + self.n_rates()
    }

    /// Empty for [`ModelVariant::Warped`].
    pub fn latent_inputs(&self) -> Range<usize> {
        let start = self.rates().end;
        start..start + self.n_latent()
    }

    /// Empty for [`ModelVariant::Warped`].
    pub fn latent_outputs(&self) -> Range<usize> {
        let start = self.latent_inputs().end;
        start..start + self.n_latent()
    }

    pub fn len(&self) -> usize {
        self.latent_outputs().end
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// - `WarpError::ParamLengthMismatch` if `found != self.len()`.
    pub fn check(&self, found: usize) -> WarpResult<()> {
        if found != self.len() {
            return Err(WarpError::ParamLengthMismatch { expected: self.len(), found });
        }
        Ok(())
    }
}
