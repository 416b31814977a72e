//! Warp transform — cumulative monotone map from raw to warped time, and its
//! reverse-mode sensitivities.
//!
//! Purpose
//! -------
//! Turn raw input times and per-step log-rates into the warped time axis
//! the GP kernel sees, and push a gradient with respect to the warped axis
//! back onto the log-rates and the raw inputs.
//!
//! Key behaviors
//! -------------
//! - [`warp_forward`]: `w₀ = x₀`, `wᵢ₊₁ = wᵢ + e^{θᵢ}(xᵢ₊₁ − xᵢ)`.
//! - [`suffix_sums`]: `Sₖ = Σ_{j≥k} gⱼ` with `Sₙ = 0`. Every warped point
//!   after step `i` moves with `θᵢ`, so the rate sensitivity is a suffix sum
//!   rather than a single entry of the downstream gradient.
//! - [`rate_sensitivity`]: `∂L/∂θᵢ = e^{θᵢ}(xᵢ₊₁ − xᵢ)·Sᵢ₊₁`.
//! - [`input_sensitivity`]: `∂L/∂xᵢ = [i=0]S₀ + [i≥1]λᵢ₋₁Sᵢ − [i≤n−2]λᵢSᵢ₊₁`.
//! - [`next_warped`]: extrapolate one point past the window.
//!
//! Invariants & assumptions
//! ------------------------
//! - `log_rates.len() == raw.len() - 1` (zero rates for one point); any
//!   other length is `WarpError::RateLengthMismatch`.
//! - Since `e^θ > 0`, the warp preserves strict order: the warped sequence is
//!   strictly increasing exactly when the raw one is (barring overflow).
//!
//! Testing notes
//! -------------
//! - Order preservation, the one-point identity, and both sensitivities
//!   against finite differences of a linear functional.
use crate::warping::errors::{WarpError, WarpResult};

fn check_rates(n_points: usize, log_rates: &[f64]) -> WarpResult<()> {
    let expected = n_points.saturating_sub(1);
    if log_rates.len() != expected {
        return Err(WarpError::RateLengthMismatch { expected, found: log_rates.len() });
    }
    Ok(())
}

/// Warped time for every raw input.
///
/// # Errors
/// - `WarpError::RateLengthMismatch` when `log_rates` is not one shorter
///   than `raw`.
pub fn warp_forward(raw: &[f64], log_rates: &[f64]) -> WarpResult<Vec<f64>> {
    check_rates(raw.len(), log_rates)?;
    let mut warped = Vec::with_capacity(raw.len());
    if let Some(&first) = raw.first() {
        warped.push(first);
        for (i, theta) in log_rates.iter().enumerate() {
            let prev = warped[i];
            warped.push(prev + theta.exp() * (raw[i + 1] - raw[i]));
        }
    }
    Ok(warped)
}

/// Suffix sums `S` of `g`, with one trailing zero (`S.len() == g.len() + 1`).
pub fn suffix_sums(g: &[f64]) -> Vec<f64> {
    let mut s = vec![0.0; g.len() + 1];
    for k in (0..g.len()).rev() {
        s[k] = s[k + 1] + g[k];
    }
    s
}

/// Gradient of a downstream loss with respect to the log-rates, given its
/// gradient `g_warped` with respect to the warped inputs.
///
/// `out` is overwritten; its length must equal `log_rates.len()`.
///
/// # Errors
/// - `WarpError::RateLengthMismatch` on inconsistent lengths.
pub fn rate_sensitivity(
    raw: &[f64], log_rates: &[f64], g_warped: &[f64], out: &mut [f64],
) -> WarpResult<()> {
    check_rates(raw.len(), log_rates)?;
    check_rates(g_warped.len(), log_rates)?;
    check_rates(out.len() + 1, log_rates)?;
    let s = suffix_sums(g_warped);
    for (i, o) in out.iter_mut().enumerate() {
        *o = log_rates[i].exp() * (raw[i + 1] - raw[i]) * s[i + 1];
    }
    Ok(())
}

/// Gradient of a downstream loss with respect to the raw inputs, through the
/// warp only.
///
/// `out` is overwritten; its length must equal `g_warped.len()`.
///
/// # Errors
/// - `WarpError::RateLengthMismatch` on inconsistent lengths.
pub fn input_sensitivity(log_rates: &[f64], g_warped: &[f64], out: &mut [f64]) -> WarpResult<()> {
    let n = g_warped.len();
    check_rates(n, log_rates)?;
    check_rates(out.len(), log_rates)?;
    let s = suffix_sums(g_warped);
    for (i, o) in out.iter_mut().enumerate() {
        let mut v = if i == 0 { s[0] } else { log_rates[i - 1].exp() * s[i] };
        if i + 1 < n {
            v -= log_rates[i].exp() * s[i + 1];
        }
        *o = v;
    }
    Ok(())
}

/// Warped position of `next_raw`, extrapolating from the last warped point
/// with rate `e^{log_rate}`.
#[inline]
pub fn next_warped(last_raw: f64, last_warped: f64, next_raw: f64, log_rate: f64) -> f64 {
    last_warped + log_rate.exp() * (next_raw - last_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Strict order preservation for arbitrary finite rates.
    // - The one-point identity.
    // - Rate and input sensitivities against finite differences of
    //   L(w) = Σ cᵢ wᵢ.
    // -------------------------------------------------------------------------

    const RAW: [f64; 4] = [0.0, 0.5, 1.7, 2.0];
    const RATES: [f64; 3] = [0.3, -1.2, 0.8];
    const WEIGHTS: [f64; 4] = [0.4, -1.1, 2.0, 0.7];

    fn linear_loss(raw: &[f64], rates: &[f64]) -> f64 {
        let w = warp_forward(raw, rates).expect("consistent lengths");
        w.iter().zip(WEIGHTS.iter()).map(|(a, b)| a * b).sum()
    }

    #[test]
    // Purpose
    // -------
    // The warp never reverses or collapses time.
    //
    // Given
    // -----
    // - Increasing raw inputs and rates spanning [-5, 5].
    //
    // Expect
    // ------
    // - Strictly increasing output with w₀ = x₀.
    fn warp_preserves_strict_order() {
        let raw = [0.1, 0.3, 0.35, 2.0, 2.1];
        for rates in [[-5.0, 5.0, 0.0, 1.0], [0.0; 4], [3.0, -3.0, -5.0, 0.2]] {
            let w = warp_forward(&raw, &rates).expect("consistent lengths");
            assert_eq!(w[0], raw[0]);
            assert!(w.windows(2).all(|p| p[1] > p[0]), "not increasing: {w:?}");
        }
    }

    #[test]
    // Purpose
    // -------
    // One point and no rates is the identity; a wrong rate count is an error.
    //
    // Given
    // -----
    // - raw = [2.5] with no rates; raw of length 3 with one rate.
    //
    // Expect
    // ------
    // - [2.5]; `RateLengthMismatch { expected: 2, found: 1 }`.
    fn single_point_identity_and_length_check() {
        assert_eq!(warp_forward(&[2.5], &[]).expect("ok"), vec![2.5]);
        assert_eq!(
            warp_forward(&[0.0, 1.0, 2.0], &[0.0]),
            Err(WarpError::RateLengthMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    // Purpose
    // -------
    // Suffix sums carry a trailing zero.
    //
    // Given
    // -----
    // - g = [1, 2, 3].
    //
    // Expect
    // ------
    // - [6, 5, 3, 0].
    fn suffix_sums_shape() {
        assert_eq!(suffix_sums(&[1.0, 2.0, 3.0]), vec![6.0, 5.0, 3.0, 0.0]);
        assert_eq!(suffix_sums(&[]), vec![0.0]);
    }

    #[test]
    // Purpose
    // -------
    // Rate sensitivity equals the derivative of L with respect to each θᵢ.
    //
    // Given
    // -----
    // - Fixed raw inputs, rates, and linear weights.
    //
    // Expect
    // ------
    // - Agreement with central differences within 1e-7.
    fn rate_sensitivity_matches_finite_differences() {
        // Arrange
        let mut out = [0.0; 3];
        let h = 1e-6;

        // Act
        rate_sensitivity(&RAW, &RATES, &WEIGHTS, &mut out).expect("consistent lengths");

        // Assert
        for i in 0..RATES.len() {
            let (mut up, mut dn) = (RATES, RATES);
            up[i] += h;
            dn[i] -= h;
            let fd = (linear_loss(&RAW, &up) - linear_loss(&RAW, &dn)) / (2.0 * h);
            assert_abs_diff_eq!(out[i], fd, epsilon = 1e-7);
        }
    }

    #[test]
    // Purpose
    // -------
    // Input sensitivity equals the derivative of L with respect to each xᵢ.
    //
    // Given
    // -----
    // - Same setup as the rate test.
    //
    // Expect
    // ------
    // - Agreement with central differences within 1e-7.
    fn input_sensitivity_matches_finite_differences() {
        let mut out = [0.0; 4];
        input_sensitivity(&RATES, &WEIGHTS, &mut out).expect("consistent lengths");
        let h = 1e-6;
        for i in 0..RAW.len() {
            let (mut up, mut dn) = (RAW, RAW);
            up[i] += h;
            dn[i] -= h;
            let fd = (linear_loss(&up, &RATES) - linear_loss(&dn, &RATES)) / (2.0 * h);
            assert_abs_diff_eq!(out[i], fd, epsilon = 1e-7);
        }
    }

    #[test]
    // Purpose
    // -------
    // Extrapolation with rate 0 continues at unit speed.
    //
    // Given
    // -----
    // - last raw 2, last warped 5, next raw 2.5.
    //
    // Expect
    // ------
    // - 5.5 at log-rate 0; 5 + e·0.5 at log-rate 1.
    fn next_warped_extrapolates() {
        assert_eq!(next_warped(2.0, 5.0, 2.5, 0.0), 5.5);
        assert_abs_diff_eq!(next_warped(2.0, 5.0, 2.5, 1.0), 5.0 + 0.5 * 1f64.exp(), epsilon = 1e-15);
    }
}
