//! core — building blocks of the warped-time model.
//!
//! Purpose
//! -------
//! Collect the pieces the composite model and the forecasting loop are made
//! of: validated data ([`data`]), the parameter-vector layout ([`layout`]),
//! the monotone warp and its sensitivities ([`transform`]), prior
//! capabilities ([`priors`]), the single-use evaluation record ([`tape`]),
//! and configuration ([`options`]).
//!
//! Invariants & assumptions
//! ------------------------
//! - Every function here is deterministic and free of global state.
//! - Shape checks live next to the data they guard: [`layout::ParamLayout`]
//!   for parameter vectors, [`data::Series`] / [`data::Window`] for
//!   observations, [`transform`] for rate counts.
//!
//! Conventions
//! -----------
//! - Indexing is 0-based; warp rate `i` sits between inputs `i` and `i + 1`.
//! - Hyperparameters and rates are stored on a log scale.

pub mod data;
pub mod layout;
pub mod options;
pub mod priors;
pub mod tape;
pub mod transform;

// ---- Re-exports ----

pub use self::data::{Series, Standardization, Window};
pub use self::layout::ParamLayout;
pub use self::options::{ForecastOptions, InitPolicy, ModelSpec, ModelVariant};
pub use self::priors::{GaussianPriors, NormalPrior, PriorModel};
pub use self::tape::{Tape, TapeEntry};
pub use self::transform::{
    input_sensitivity, next_warped, rate_sensitivity, suffix_sums, warp_forward,
};
