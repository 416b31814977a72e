//! gp::noise — observation-noise capabilities.
//!
//! A noise capability adds a variance to the diagonal of the covariance
//! matrix. It sees only its own hyperparameters (natural scale), never the
//! inputs.
use std::str::FromStr;

use crate::gp::{
    errors::{GpError, GpResult},
    kernel::{HyperParam, HyperRole},
};

/// Noise-kernel capability.
pub trait NoiseModel: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Hyperparameters in the order `theta` carries them (may be empty).
    fn params(&self) -> &'static [HyperParam];

    fn n_theta(&self) -> usize {
        self.params().len()
    }

    /// Noise variance under natural-scale `theta`.
    fn variance(&self, theta: &[f64]) -> f64;

    /// Noise variance and its partials with respect to `theta`.
    fn variance_grad(&self, theta: &[f64], d_theta: &mut [f64]) -> f64;
}

/// Noise variance `scale · s` with one free hyperparameter `s`.
///
/// With the default scale of 0.01 and `log s = 0` the noise standard
/// deviation is 0.1 on standardised outputs.
#[derive(Debug, Clone, Copy)]
pub struct UniformNoise {
    pub scale: f64,
}

impl Default for UniformNoise {
    fn default() -> Self {
        Self { scale: 0.01 }
    }
}

const UNIFORM_PARAMS: [HyperParam; 1] = [HyperParam::new("s", HyperRole::Noise)];

impl NoiseModel for UniformNoise {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn params(&self) -> &'static [HyperParam] {
        &UNIFORM_PARAMS
    }

    fn variance(&self, theta: &[f64]) -> f64 {
        self.scale * theta[0]
    }

    fn variance_grad(&self, theta: &[f64], d_theta: &mut [f64]) -> f64 {
        d_theta[0] = self.scale;
        self.scale * theta[0]
    }
}

/// Fixed noise variance, no hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct ConstantNoise {
    pub variance: f64,
}

impl NoiseModel for ConstantNoise {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn params(&self) -> &'static [HyperParam] {
        &[]
    }

    fn variance(&self, _theta: &[f64]) -> f64 {
        self.variance
    }

    fn variance_grad(&self, _theta: &[f64], _d_theta: &mut [f64]) -> f64 {
        self.variance
    }
}

/// Configuration-time choice of noise capability.
///
/// Parses from `"uniform"` and `"constant"` / `"constant:<variance>"`
/// (variance defaults to 0.01).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseKind {
    Uniform,
    Constant { variance: f64 },
}

impl NoiseKind {
    /// Build the boxed capability.
    ///
    /// # Errors
    /// - `GpError::InvalidCapabilityParam` for a non-positive or non-finite
    ///   constant variance.
    pub fn build(&self) -> GpResult<Box<dyn NoiseModel>> {
        match *self {
            NoiseKind::Uniform => Ok(Box::new(UniformNoise::default())),
            NoiseKind::Constant { variance } => {
                if !variance.is_finite() || variance <= 0.0 {
                    return Err(GpError::InvalidCapabilityParam {
                        name: "noise variance",
                        value: variance,
                        reason: "Noise variance must be finite and positive.",
                    });
                }
                Ok(Box::new(ConstantNoise { variance }))
            }
        }
    }
}

impl FromStr for NoiseKind {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let unknown = || GpError::UnknownCapability {
            name: s.to_string(),
            reason: "Valid noise kernels are 'uniform' or 'constant[:variance]'.",
        };
        match lower.split_once(':') {
            None if lower == "uniform" => Ok(NoiseKind::Uniform),
            None if lower == "constant" => Ok(NoiseKind::Constant { variance: 0.01 }),
            Some(("constant", v)) => {
                let variance = v.trim().parse::<f64>().map_err(|_| unknown())?;
                Ok(NoiseKind::Constant { variance })
            }
            _ => Err(unknown()),
        }
    }
}
