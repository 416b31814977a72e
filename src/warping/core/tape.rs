//! Single-use record of one composite `observe`, consumed by `gradient`.
//!
//! The composite model owns exactly one [`Tape`]. `observe` resets it on
//! entry and records into it only after both sub-models succeeded, so a
//! failed evaluation always leaves the tape empty. `gradient` reads the
//! recorded sub-gradients; asking for a gradient at a point that was not the
//! last successfully observed one is a usage error.

use crate::warping::errors::{WarpError, WarpResult};

/// What one successful `observe` leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct TapeEntry {
    /// Parameter vector the entry belongs to.
    pub x: Vec<f64>,
    /// Composite log-likelihood at `x`.
    pub value: f64,
    /// Raw inputs the warp was applied to (observed or latent).
    pub inputs: Vec<f64>,
    /// Prior gradient over the full parameter vector.
    pub prior_grad: Vec<f64>,
    /// GP gradient over the engine's flat vector.
    pub gp_grad: Vec<f64>,
}

#[derive(Debug, Default)]
pub struct Tape {
    entry: Option<TapeEntry>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: TapeEntry) {
        self.entry = Some(entry);
    }

    /// Drop whatever was recorded.
    pub fn release(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// The recorded entry.
    ///
    /// # Errors
    /// - `WarpError::TapeEmpty` if nothing is recorded.
    pub fn entry(&self) -> WarpResult<&TapeEntry> {
        self.entry.as_ref().ok_or(WarpError::TapeEmpty)
    }

    /// The recorded entry if it was taken at exactly `x` (bitwise).
    pub fn entry_at(&self, x: &[f64]) -> Option<&TapeEntry> {
        self.entry.as_ref().filter(|e| {
            e.x.len() == x.len() && e.x.iter().zip(x).all(|(a, b)| a.to_bits() == b.to_bits())
        })
    }
}
