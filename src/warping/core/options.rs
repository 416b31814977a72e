//! Configuration for the warped-time model and the forecasting loop.
//!
//! Purpose
//! -------
//! Replace process-wide flags with explicit configuration values that are
//! threaded into [`crate::warping::models::forecast::ForecastLoop`]: which
//! kernel capabilities to build ([`ModelSpec`]), which parameter layout to
//! use ([`ModelVariant`]), how to seed each step's initial point
//! ([`InitPolicy`]), and the loop's own knobs ([`ForecastOptions`]).
//!
//! Key behaviors
//! -------------
//! - [`ModelVariant`] and [`InitPolicy`] parse from short strings so the CLI
//!   and the Python surface share one vocabulary.
//! - [`InitPolicy::initial_point`] is deterministic: the jitter RNG is seeded
//!   from the configured seed and the window end, so a step's initial point
//!   does not depend on which steps ran before it.
//! - [`ForecastOptions::validate`] rejects inconsistent settings up front.
//!
//! Conventions
//! -----------
//! - Initial points are in the optimizer's space: log-scale hyperparameters
//!   and log-rates. Latent input/output copies (when present) are filled by
//!   the composite model, not by the policy.
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::gp::{kernel::SimilarityKind, noise::NoiseKind};
use crate::warping::errors::{WarpError, WarpResult};

/// Which parameter layout the composite model optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelVariant {
    /// Kernel, prior, and warp-rate regions only; outputs are observed `Y`.
    #[default]
    Warped,
    /// Additionally carries latent copies of the window's inputs and outputs.
    /// The last input and all outputs are pinned.
    LatentInputs,
}

impl FromStr for ModelVariant {
    type Err = WarpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "warped" => Ok(ModelVariant::Warped),
            "latent" | "latent-inputs" | "latentinputs" => Ok(ModelVariant::LatentInputs),
            _ => Err(WarpError::InvalidOption {
                name: "variant",
                value: s.to_string(),
                reason: "Valid variants are 'warped' or 'latent'.",
            }),
        }
    }
}

/// Odd 64-bit multiplier (golden ratio) used to spread the seed before the
/// window end is added.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// How each step's initial parameter vector is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitPolicy {
    /// All zeros: unit hyperparameters and an identity warp.
    #[default]
    Zeros,
    /// Independent `Uniform(-scale, scale)` draws.
    Jitter { scale: f64, seed: u64 },
}

impl InitPolicy {
    /// Validated jitter policy.
    ///
    /// # Errors
    /// - `WarpError::InvalidOption` if `scale` is not finite and positive.
    pub fn jitter(scale: f64, seed: u64) -> WarpResult<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(WarpError::InvalidOption {
                name: "jitter scale",
                value: scale.to_string(),
                reason: "Jitter scale must be finite and positive.",
            });
        }
        Ok(InitPolicy::Jitter { scale, seed })
    }

    /// Initial values for `len` optimizer coordinates at window end `end`.
    pub fn initial_point(&self, len: usize, end: usize) -> Vec<f64> {
        match *self {
            InitPolicy::Zeros => vec![0.0; len],
            InitPolicy::Jitter { scale, seed } => {
                let mut rng =
                    ChaCha8Rng::seed_from_u64(seed.wrapping_mul(SEED_MIX).wrapping_add(end as u64));
                (0..len).map(|_| rng.gen_range(-scale..scale)).collect()
            }
        }
    }
}

/// Kernel capabilities to build the GP from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub similarity: SimilarityKind,
    pub noise: NoiseKind,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self { similarity: SimilarityKind::Matern52, noise: NoiseKind::Uniform }
    }
}

/// Knobs of the expanding-window forecasting loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastOptions {
    /// Smallest window that is fitted; the first forecast targets index
    /// `min_window`.
    pub min_window: usize,
    /// Optimizer failures at or below this many iterations are logged as
    /// warnings.
    pub warn_within: usize,
    pub init: InitPolicy,
    pub variant: ModelVariant,
    /// Standardise outputs (mean 0, sample std 1) before the run.
    pub normalize: bool,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            min_window: 2,
            warn_within: 1,
            init: InitPolicy::Zeros,
            variant: ModelVariant::Warped,
            normalize: true,
        }
    }
}

impl ForecastOptions {
    /// # Errors
    /// - `WarpError::InvalidOption` when `min_window` is zero or the jitter
    ///   scale is invalid.
    pub fn validate(&self) -> WarpResult<()> {
        if self.min_window == 0 {
            return Err(WarpError::InvalidOption {
                name: "min window",
                value: "0".to_string(),
                reason: "At least one observation is needed to fit.",
            });
        }
        if let InitPolicy::Jitter { scale, seed } = self.init {
            InitPolicy::jitter(scale, seed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - String parsing of variants.
    // - Determinism, range and per-(seed, end) independence of the jitter
    //   policy; the zeros default.
    // - Option validation.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Variant names parse case-insensitively; unknown names are rejected.
    //
    // Given
    // -----
    // - "Warped", "latent", "both".
    //
    // Expect
    // ------
    // - Two variants and an `InvalidOption`.
    fn variant_parsing() {
        assert_eq!("Warped".parse::<ModelVariant>(), Ok(ModelVariant::Warped));
        assert_eq!("latent".parse::<ModelVariant>(), Ok(ModelVariant::LatentInputs));
        assert!(matches!(
            "both".parse::<ModelVariant>(),
            Err(WarpError::InvalidOption { name: "variant", .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Jitter draws are bounded and reproducible per (seed, end).
    //
    // Given
    // -----
    // - Jitter(scale 0.1, seed 7) at ends 3 and 4.
    //
    // Expect
    // ------
    // - Same end gives the same vector, a different end differs, every value
    //   lies in (-0.1, 0.1).
    fn jitter_is_deterministic_and_bounded() {
        // Arrange
        let policy = InitPolicy::jitter(0.1, 7).expect("valid scale");

        // Act
        let a = policy.initial_point(6, 3);
        let b = policy.initial_point(6, 3);
        let c = policy.initial_point(6, 4);

        // Assert
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| v.abs() < 0.1));
        assert_eq!(InitPolicy::Zeros.initial_point(3, 3), vec![0.0; 3]);
    }

    #[test]
    // Purpose
    // -------
    // Swapping seed and window end yields a different stream, and the
    // default policy is zeros.
    //
    // Given
    // -----
    // - Jitter seeds 2 and 0 evaluated at ends 0 and 2 respectively; seeds
    //   1 and 0 at ends 0 and 1.
    //
    // Expect
    // ------
    // - Each pair of initial points differs; `InitPolicy::default()` is
    //   `Zeros`.
    fn seed_and_end_do_not_collide() {
        // Arrange
        let p2 = InitPolicy::jitter(0.5, 2).expect("valid scale");
        let p1 = InitPolicy::jitter(0.5, 1).expect("valid scale");
        let p0 = InitPolicy::jitter(0.5, 0).expect("valid scale");

        // Act
        let seed2_end0 = p2.initial_point(8, 0);
        let seed0_end2 = p0.initial_point(8, 2);
        let seed1_end0 = p1.initial_point(8, 0);
        let seed0_end1 = p0.initial_point(8, 1);

        // Assert
        assert_ne!(seed2_end0, seed0_end2);
        assert_ne!(seed1_end0, seed0_end1);
        assert_eq!(InitPolicy::default(), InitPolicy::Zeros);
    }

    #[test]
    // Purpose
    // -------
    // Inconsistent loop options are rejected.
    //
    // Given
    // -----
    // - min_window = 0; a jitter scale of -1.
    //
    // Expect
    // ------
    // - Both fail validation; the defaults pass.
    fn options_validation() {
        assert!(ForecastOptions::default().validate().is_ok());
        let zero = ForecastOptions { min_window: 0, ..ForecastOptions::default() };
        assert!(zero.validate().is_err());
        let bad = ForecastOptions {
            init: InitPolicy::Jitter { scale: -1.0, seed: 0 },
            ..ForecastOptions::default()
        };
        assert!(bad.validate().is_err());
    }
}
