//! gp::kernel — similarity (covariance) capabilities.
//!
//! Purpose
//! -------
//! Define the contract every similarity kernel satisfies ([`Covariance`]) and
//! ship the concrete kernels the forecasting model is configured with:
//! Matérn-5/2, squared exponential ("normal"), and a seasonal kernel that
//! adds a periodic component on raw time to a Matérn trend on warped time.
//!
//! Key behaviors
//! -------------
//! - Kernels evaluate `k(a, b)` for two input points given their
//!   hyperparameters on the **natural** scale; the engine exponentiates the
//!   log-scale optimizer values before calling in.
//! - Kernels that know their partial derivatives report them through
//!   [`Covariance::cov_grad`]; others inherit a central finite-difference
//!   fallback and advertise `is_differentiable() == false`.
//! - [`SimilarityKind`] is the configuration-time registry: it parses from a
//!   string and builds a boxed capability.
//!
//! Invariants & assumptions
//! ------------------------
//! - Input points carry two coordinates: index 0 is warped time, index 1 is
//!   raw time. Kernels only read the coordinates they model.
//! - All kernels are stationary and symmetric: `k(a, b) = k(b, a)`.
//!
//! Conventions
//! -----------
//! - Hyperparameter order is fixed per kernel and described by
//!   [`Covariance::params`]; `theta.len() == params().len()`.
//! - A variance hyperparameter `c` enters squared (`c²`).
use std::f64::consts::PI;
use std::str::FromStr;

use ndarray::Array1;

use crate::gp::errors::{GpError, GpResult};
use crate::optimization::loglik_optimizer::finite_diff::{FdScheme, fd_gradient_infallible};

/// Index of the warped-time coordinate in an input point.
pub const WARPED: usize = 0;
/// Index of the raw-time coordinate in an input point.
pub const RAW: usize = 1;

/// What a hyperparameter controls; drives default priors and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperRole {
    Variance,
    LengthScale,
    Noise,
    Warp,
}

/// Name and role of one hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperParam {
    pub name: &'static str,
    pub role: HyperRole,
}

impl HyperParam {
    pub const fn new(name: &'static str, role: HyperRole) -> Self {
        Self { name, role }
    }
}

/// Similarity-kernel capability.
pub trait Covariance: std::fmt::Debug + Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Hyperparameters in the order `theta` carries them.
    fn params(&self) -> &'static [HyperParam];

    fn n_theta(&self) -> usize {
        self.params().len()
    }

    /// Covariance between `a` and `b` under natural-scale `theta`.
    fn cov(&self, theta: &[f64], a: &[f64], b: &[f64]) -> f64;

    /// Whether [`Covariance::cov_grad`] is analytic.
    fn is_differentiable(&self) -> bool {
        false
    }

    /// Covariance and its partials with respect to `theta`, `a` and `b`.
    ///
    /// The output slices are overwritten. The default differences
    /// [`Covariance::cov`] centrally over the concatenation `(theta, a, b)`.
    fn cov_grad(
        &self, theta: &[f64], a: &[f64], b: &[f64], d_theta: &mut [f64], d_a: &mut [f64],
        d_b: &mut [f64],
    ) -> GpResult<f64> {
        let (nt, na) = (theta.len(), a.len());
        let z: Array1<f64> = theta.iter().chain(a).chain(b).copied().collect();
        let f = |z: &Array1<f64>| {
            let z = z.as_slice().unwrap_or(&[]);
            self.cov(&z[..nt], &z[nt..nt + na], &z[nt + na..])
        };
        let g = fd_gradient_infallible(f, &z, FdScheme::Central).map_err(|e| {
            GpError::DerivativeFailed { capability: self.name(), reason: e.to_string() }
        })?;
        for (k, v) in d_theta.iter_mut().enumerate() {
            *v = g[k];
        }
        for (k, v) in d_a.iter_mut().enumerate() {
            *v = g[nt + k];
        }
        for (k, v) in d_b.iter_mut().enumerate() {
            *v = g[nt + na + k];
        }
        Ok(self.cov(theta, a, b))
    }
}

// ---- Shared profiles ----

/// Matérn-5/2 profile `(1 + s + s²/3)·e^{-s}`.
#[inline]
pub fn matern52(s: f64) -> f64 {
    let e = (-s).exp();
    if e == 0.0 {
        return 0.0;
    }
    (1.0 + s + s * s / 3.0) * e
}

/// Matérn-5/2 term `c²·m(√5|r|/l)` with partials `(∂c, ∂l, ∂r)`.
///
/// Once `e^{-s}` underflows the term and all its partials are exactly 0;
/// at `r = 0` the `r` partial is 0 whatever `l`.
#[inline]
fn matern52_term(c: f64, l: f64, r: f64) -> (f64, f64, f64, f64) {
    let c2 = c * c;
    if r == 0.0 {
        return (c2, 2.0 * c, 0.0, 0.0);
    }
    let s = 5f64.sqrt() * r.abs() / l;
    let e = (-s).exp();
    if e == 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let m = (1.0 + s + s * s / 3.0) * e;
    let dc = 2.0 * c * m;
    let dl = c2 * s * s * (1.0 + s) * e / (3.0 * l);
    let dr = -c2 * 5.0 * r * (1.0 + s) * e / (3.0 * l * l);
    (c2 * m, dc, dl, dr)
}

/// Periodic term `c²·exp(-2 sin²(π r / p) / l²)` with partials `(∂c, ∂l, ∂r)`.
///
/// Same underflow rule as [`matern52_term`]; `sin²(π r / p) = 0` gives the
/// peak value with zero `l` and `r` partials.
#[inline]
fn periodic_term(c: f64, l: f64, period: f64, r: f64) -> (f64, f64, f64, f64) {
    let c2 = c * c;
    let u = PI * r / period;
    let q = u.sin().powi(2);
    if q == 0.0 {
        return (c2, 2.0 * c, 0.0, 0.0);
    }
    let e = (-2.0 * q / (l * l)).exp();
    if e == 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let dc = 2.0 * c * e;
    let dl = c2 * e * 4.0 * q / (l * l * l);
    let dr = -c2 * e * 2.0 * PI * (2.0 * u).sin() / (period * l * l);
    (c2 * e, dc, dl, dr)
}

fn zero(xs: &mut [f64]) {
    xs.iter_mut().for_each(|x| *x = 0.0);
}

// ---- Kernels ----

/// `c²·Matérn52(l)` on warped time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matern52;

const MATERN_PARAMS: [HyperParam; 2] =
    [HyperParam::new("c", HyperRole::Variance), HyperParam::new("l", HyperRole::LengthScale)];

impl Covariance for Matern52 {
    fn name(&self) -> &'static str {
        "matern"
    }

    fn params(&self) -> &'static [HyperParam] {
        &MATERN_PARAMS
    }

    fn cov(&self, theta: &[f64], a: &[f64], b: &[f64]) -> f64 {
        theta[0] * theta[0] * matern52(5f64.sqrt() * (a[WARPED] - b[WARPED]).abs() / theta[1])
    }

    fn is_differentiable(&self) -> bool {
        true
    }

    fn cov_grad(
        &self, theta: &[f64], a: &[f64], b: &[f64], d_theta: &mut [f64], d_a: &mut [f64],
        d_b: &mut [f64],
    ) -> GpResult<f64> {
        let (k, dc, dl, dr) = matern52_term(theta[0], theta[1], a[WARPED] - b[WARPED]);
        d_theta[0] = dc;
        d_theta[1] = dl;
        zero(d_a);
        zero(d_b);
        d_a[WARPED] = dr;
        d_b[WARPED] = -dr;
        Ok(k)
    }
}

/// `c²·exp(-r²/(2l²))` on warped time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredExponential;

impl Covariance for SquaredExponential {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn params(&self) -> &'static [HyperParam] {
        &MATERN_PARAMS
    }

    fn cov(&self, theta: &[f64], a: &[f64], b: &[f64]) -> f64 {
        let r = a[WARPED] - b[WARPED];
        if r == 0.0 {
            return theta[0] * theta[0];
        }
        theta[0] * theta[0] * (-r * r / (2.0 * theta[1] * theta[1])).exp()
    }

    fn is_differentiable(&self) -> bool {
        true
    }

    fn cov_grad(
        &self, theta: &[f64], a: &[f64], b: &[f64], d_theta: &mut [f64], d_a: &mut [f64],
        d_b: &mut [f64],
    ) -> GpResult<f64> {
        let (c, l) = (theta[0], theta[1]);
        let r = a[WARPED] - b[WARPED];
        zero(d_a);
        zero(d_b);
        if r == 0.0 {
            d_theta[0] = 2.0 * c;
            d_theta[1] = 0.0;
            return Ok(c * c);
        }
        let e = (-r * r / (2.0 * l * l)).exp();
        if e == 0.0 {
            zero(d_theta);
            return Ok(0.0);
        }
        let k = c * c * e;
        d_theta[0] = 2.0 * c * e;
        d_theta[1] = k * r * r / (l * l * l);
        d_a[WARPED] = -k * r / (l * l);
        d_b[WARPED] = k * r / (l * l);
        Ok(k)
    }
}

/// Matérn-5/2 trend on warped time plus a periodic season on raw time:
/// `c1²·Matérn52(l1) + c2²·Periodic(l2, period)`.
#[derive(Debug, Clone, Copy)]
pub struct SeasonalMatern {
    pub period: f64,
}

const SEASONAL_PARAMS: [HyperParam; 4] = [
    HyperParam::new("c1", HyperRole::Variance),
    HyperParam::new("c2", HyperRole::Variance),
    HyperParam::new("l1", HyperRole::LengthScale),
    HyperParam::new("l2", HyperRole::LengthScale),
];

impl Covariance for SeasonalMatern {
    fn name(&self) -> &'static str {
        "seasonal"
    }

    fn params(&self) -> &'static [HyperParam] {
        &SEASONAL_PARAMS
    }

    fn cov(&self, theta: &[f64], a: &[f64], b: &[f64]) -> f64 {
        let trend = matern52_term(theta[0], theta[2], a[WARPED] - b[WARPED]).0;
        let season = periodic_term(theta[1], theta[3], self.period, a[RAW] - b[RAW]).0;
        trend + season
    }

    fn is_differentiable(&self) -> bool {
        true
    }

    fn cov_grad(
        &self, theta: &[f64], a: &[f64], b: &[f64], d_theta: &mut [f64], d_a: &mut [f64],
        d_b: &mut [f64],
    ) -> GpResult<f64> {
        let (kt, dc1, dl1, dr1) = matern52_term(theta[0], theta[2], a[WARPED] - b[WARPED]);
        let (ks, dc2, dl2, dr2) = periodic_term(theta[1], theta[3], self.period, a[RAW] - b[RAW]);
        d_theta[0] = dc1;
        d_theta[1] = dc2;
        d_theta[2] = dl1;
        d_theta[3] = dl2;
        zero(d_a);
        zero(d_b);
        d_a[WARPED] = dr1;
        d_b[WARPED] = -dr1;
        d_a[RAW] = dr2;
        d_b[RAW] = -dr2;
        Ok(kt + ks)
    }
}

// ---- Registry ----

/// Configuration-time choice of similarity kernel.
///
/// Parses case-insensitively from `"matern"`, `"normal"` (alias `"se"`), and
/// `"seasonal"` / `"seasonal:<period>"` (period defaults to 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityKind {
    Matern52,
    SquaredExponential,
    Seasonal { period: f64 },
}

impl SimilarityKind {
    /// Build the boxed capability.
    ///
    /// # Errors
    /// - `GpError::InvalidCapabilityParam` for a non-positive or non-finite
    ///   period.
    pub fn build(&self) -> GpResult<Box<dyn Covariance>> {
        match *self {
            SimilarityKind::Matern52 => Ok(Box::new(Matern52)),
            SimilarityKind::SquaredExponential => Ok(Box::new(SquaredExponential)),
            SimilarityKind::Seasonal { period } => {
                if !period.is_finite() || period <= 0.0 {
                    return Err(GpError::InvalidCapabilityParam {
                        name: "period",
                        value: period,
                        reason: "Period must be finite and positive.",
                    });
                }
                Ok(Box::new(SeasonalMatern { period }))
            }
        }
    }
}

impl FromStr for SimilarityKind {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (head, arg) = match lower.split_once(':') {
            Some((h, a)) => (h, Some(a)),
            None => (lower.as_str(), None),
        };
        let unknown = || GpError::UnknownCapability {
            name: s.to_string(),
            reason: "Valid kernels are 'matern', 'normal', or 'seasonal[:period]'.",
        };
        match (head, arg) {
            ("matern" | "matern52", None) => Ok(SimilarityKind::Matern52),
            ("normal" | "se", None) => Ok(SimilarityKind::SquaredExponential),
            ("seasonal", None) => Ok(SimilarityKind::Seasonal { period: 1.0 }),
            ("seasonal", Some(p)) => {
                let period = p.trim().parse::<f64>().map_err(|_| unknown())?;
                Ok(SimilarityKind::Seasonal { period })
            }
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Analytic partials of every shipped kernel against the finite-
    //   difference fallback of the same kernel.
    // - Symmetry and the zero-distance value.
    // - Registry parsing.
    // -------------------------------------------------------------------------

    /// Wraps a kernel but hides its analytic gradient.
    #[derive(Debug)]
    struct Opaque<K: Covariance>(K);

    impl<K: Covariance> Covariance for Opaque<K> {
        fn name(&self) -> &'static str {
            "opaque"
        }
        fn params(&self) -> &'static [HyperParam] {
            self.0.params()
        }
        fn cov(&self, theta: &[f64], a: &[f64], b: &[f64]) -> f64 {
            self.0.cov(theta, a, b)
        }
    }

    fn compare<K: Covariance + Copy>(k: K, theta: &[f64], a: &[f64], b: &[f64]) {
        let nt = theta.len();
        let (mut t1, mut a1, mut b1) = (vec![0.0; nt], vec![0.0; 2], vec![0.0; 2]);
        let (mut t2, mut a2, mut b2) = (vec![0.0; nt], vec![0.0; 2], vec![0.0; 2]);
        let v1 = k.cov_grad(theta, a, b, &mut t1, &mut a1, &mut b1).expect("analytic");
        let v2 = Opaque(k).cov_grad(theta, a, b, &mut t2, &mut a2, &mut b2).expect("fd");
        assert!((v1 - v2).abs() < 1e-12);
        for (x, y) in t1.iter().chain(&a1).chain(&b1).zip(t2.iter().chain(&a2).chain(&b2)) {
            assert!((x - y).abs() < 1e-6, "analytic {x} vs fd {y} for {}", k.name());
        }
    }

    #[test]
    // Purpose
    // -------
    // Analytic kernel partials agree with central differences.
    //
    // Given
    // -----
    // - Each kernel at non-trivial hyperparameters and two distinct points.
    //
    // Expect
    // ------
    // - All partials within 1e-6.
    fn analytic_partials_match_finite_differences() {
        let a = [0.3, 0.25];
        let b = [1.1, 0.9];
        compare(Matern52, &[0.8, 1.3], &a, &b);
        compare(SquaredExponential, &[1.2, 0.7], &a, &b);
        compare(SeasonalMatern { period: 0.6 }, &[0.8, 0.5, 1.3, 0.9], &a, &b);
    }

    #[test]
    // Purpose
    // -------
    // Kernels are symmetric and equal c² at zero distance.
    //
    // Given
    // -----
    // - Matérn with c = 2 and a pair of points.
    //
    // Expect
    // ------
    // - k(a, b) == k(b, a); k(a, a) == 4.
    fn kernels_are_symmetric_with_variance_at_zero_distance() {
        let k = Matern52;
        let theta = [2.0, 0.5];
        let a = [0.0, 0.0];
        let b = [0.7, 0.7];
        assert_eq!(k.cov(&theta, &a, &b), k.cov(&theta, &b, &a));
        assert!((k.cov(&theta, &a, &a) - 4.0).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Registry names parse, and seasonal periods are validated on build.
    //
    // Given
    // -----
    // - "Matern", "se", "seasonal:12", "seasonal:-1", "cosine".
    //
    // Expect
    // ------
    // - Matching variants; negative period fails to build; unknown name errors.
    fn registry_parses_and_validates() {
        assert_eq!("Matern".parse::<SimilarityKind>(), Ok(SimilarityKind::Matern52));
        assert_eq!("se".parse::<SimilarityKind>(), Ok(SimilarityKind::SquaredExponential));
        assert_eq!(
            "seasonal:12".parse::<SimilarityKind>(),
            Ok(SimilarityKind::Seasonal { period: 12.0 })
        );
        let bad = "seasonal:-1".parse::<SimilarityKind>().expect("parses");
        assert!(matches!(bad.build(), Err(GpError::InvalidCapabilityParam { .. })));
        assert!(matches!(
            "cosine".parse::<SimilarityKind>(),
            Err(GpError::UnknownCapability { .. })
        ));
        assert_eq!(SimilarityKind::Seasonal { period: 2.0 }.build().expect("builds").n_theta(), 4);
    }

    fn grad_of(k: &dyn Covariance, theta: &[f64], a: &[f64], b: &[f64]) -> (f64, Vec<f64>) {
        let (mut t, mut da, mut db) = (vec![0.0; theta.len()], vec![0.0; 2], vec![0.0; 2]);
        let v = k.cov_grad(theta, a, b, &mut t, &mut da, &mut db).expect("analytic");
        t.extend(da);
        t.extend(db);
        (v, t)
    }

    #[test]
    // Purpose
    // -------
    // Length scales far below the point spacing give a vanished covariance
    // with finite (zero) partials instead of NaN.
    //
    // Given
    // -----
    // - l = 1e-120 with unit separation, for every shipped kernel.
    //
    // Expect
    // ------
    // - Value 0 and every partial exactly 0.
    fn tiny_length_scale_gives_zero_partials_not_nan() {
        let a = [0.0, 0.0];
        let b = [1.0, 1.3];
        let cases: [(&dyn Covariance, Vec<f64>); 3] = [
            (&Matern52, vec![1.0, 1e-120]),
            (&SquaredExponential, vec![1.0, 1e-120]),
            (&SeasonalMatern { period: 1.0 }, vec![1.0, 1.0, 1e-120, 1e-120]),
        ];

        for (k, theta) in cases {
            let (v, partials) = grad_of(k, &theta, &a, &b);
            assert_eq!(v, 0.0, "{}", k.name());
            assert_eq!(k.cov(&theta, &a, &b), 0.0, "{}", k.name());
            for p in &partials {
                assert_eq!(*p, 0.0, "{} partials {partials:?}", k.name());
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Zero separation keeps the peak value and finite partials even when
    // `l²` underflows.
    //
    // Given
    // -----
    // - l = 1e-200 (l² == 0) and identical points for every shipped kernel.
    //
    // Expect
    // ------
    // - Value c² (c1² + c2² for seasonal), ∂c = 2c, all other partials 0.
    fn zero_separation_is_finite_for_underflowing_length_scale() {
        let p = [0.4, 0.4];
        let (v, partials) = grad_of(&Matern52, &[1.5, 1e-200], &p, &p);
        assert_eq!(v, 2.25);
        assert_eq!(partials, vec![3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let (v, partials) = grad_of(&SquaredExponential, &[1.5, 1e-200], &p, &p);
        assert_eq!(v, 2.25);
        assert_eq!(SquaredExponential.cov(&[1.5, 1e-200], &p, &p), 2.25);
        assert_eq!(partials, vec![3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let seasonal = SeasonalMatern { period: 2.0 };
        let (v, partials) = grad_of(&seasonal, &[1.0, 2.0, 0.5, 1e-200], &[0.4, 0.0], &[0.4, 0.0]);
        assert_eq!(v, 5.0);
        assert!(partials.iter().all(|g| g.is_finite()), "{partials:?}");
    }
}
