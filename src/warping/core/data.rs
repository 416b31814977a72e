//! Validated time series and the observation windows cut from it.
//!
//! Purpose
//! -------
//! Centralise input validation so the composite model and the forecasting
//! loop can assume clean data: equal lengths, finite values, strictly
//! increasing inputs.
//!
//! Key behaviors
//! -------------
//! - [`Series::new`] validates a whole series once.
//! - [`Series::window`] returns the prefix `X[0:end]`, `Y[0:end]` as an owned
//!   [`Window`], which is what the optimizer carries as model data.
//! - [`Series::standardized`] rescales outputs to mean 0 and sample standard
//!   deviation 1 (via `statrs`), returning the applied [`Standardization`].
//!
//! Invariants & assumptions
//! ------------------------
//! - A [`Series`] is non-empty; a [`Window`] may hold a single point.
//! - Inputs are strictly increasing in both, which the warp needs to keep
//!   its ordering guarantee meaningful.
//!
//! Testing notes
//! -------------
//! - Validation failures are checked one by one; standardisation is checked
//!   on a small series with known moments.
use statrs::statistics::Statistics;

use crate::warping::errors::{WarpError, WarpResult};

fn validate(x: &[f64], y: &[f64]) -> WarpResult<()> {
    if x.len() != y.len() {
        return Err(WarpError::LengthMismatch { inputs: x.len(), outputs: y.len() });
    }
    if x.is_empty() {
        return Err(WarpError::EmptySeries);
    }
    for (index, &value) in x.iter().enumerate() {
        if !value.is_finite() {
            return Err(WarpError::NonFiniteInput { index, value });
        }
        if index > 0 && value <= x[index - 1] {
            return Err(WarpError::NonIncreasingInput { index, previous: x[index - 1], value });
        }
    }
    if let Some((index, &value)) = y.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(WarpError::NonFiniteOutput { index, value });
    }
    Ok(())
}

/// Observed `(x, y)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    x: Vec<f64>,
    y: Vec<f64>,
}

/// Affine map applied to the outputs: `y' = (y - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardization {
    pub mean: f64,
    pub std: f64,
}

impl Series {
    /// # Errors
    /// - `WarpError::LengthMismatch`, `EmptySeries`, `NonFiniteInput`,
    ///   `NonIncreasingInput`, `NonFiniteOutput`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> WarpResult<Self> {
        validate(&x, &y)?;
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// First `end` observations.
    ///
    /// # Errors
    /// - `WarpError::WindowOutOfRange` when `end` is 0 or exceeds the series.
    pub fn window(&self, end: usize) -> WarpResult<Window> {
        if end == 0 || end > self.len() {
            return Err(WarpError::WindowOutOfRange { end, len: self.len() });
        }
        Ok(Window { x: self.x[..end].to_vec(), y: self.y[..end].to_vec() })
    }

    /// Copy with outputs rescaled to mean 0 and sample standard deviation 1.
    ///
    /// # Errors
    /// - `WarpError::DegenerateOutputs` when the sample standard deviation is
    ///   zero or undefined (fewer than two points).
    pub fn standardized(&self) -> WarpResult<(Series, Standardization)> {
        let mean = self.y.iter().mean();
        let std = self.y.iter().std_dev();
        if !std.is_finite() || std <= 0.0 {
            return Err(WarpError::DegenerateOutputs { std });
        }
        let y = self.y.iter().map(|v| (v - mean) / std).collect();
        Ok((Series { x: self.x.clone(), y }, Standardization { mean, std }))
    }
}

/// Observation window handed to the composite model.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Window {
    /// # Errors
    /// - Same validation as [`Series::new`].
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> WarpResult<Self> {
        validate(&x, &y)?;
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}
