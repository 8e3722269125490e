//! Weight and bias initialization distributions.
//!
//! Distributions are looked up by name when a layer is configured; an
//! unknown name resolves to uniform initialization with fan-based bounds.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::algebra::{self, Tensor};

/// Effective input/output connectivity counts for a parameter shape.
///
/// `[out, in]` matrices and `[filters, channels, kh, kw]` kernels have
/// well-defined fans; every other shape counts as `(1, 1)`.
pub fn calculate_fans(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        2 => (shape[1].max(1), shape[0].max(1)),
        4 => {
            let receptive_field = shape[2] * shape[3];
            (
                (receptive_field * shape[1]).max(1),
                (receptive_field * shape[0]).max(1),
            )
        }
        _ => (1, 1),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanMode {
    In,
    Out,
    Average,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarianceDistribution {
    Uniform,
    Normal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Initializer {
    Constant(f64),
    Zeros,
    Ones,
    /// Uniform over `[-1/√fan_in, 1/√fan_in]`.
    Uniform,
    Normal {
        mean: f64,
        stddev: f64,
    },
    XavierUniform,
    XavierNormal,
    HeUniform,
    HeNormal,
    VarianceScaling {
        scale: f64,
        mode: FanMode,
        distribution: VarianceDistribution,
    },
}

impl Initializer {
    /// Resolves an initializer name; unknown names fall back to [`Initializer::Uniform`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "constant" => Self::Constant(0.0),
            "zeros" => Self::Zeros,
            "ones" => Self::Ones,
            "randomUniform" => Self::Uniform,
            "randomNormal" => Self::Normal {
                mean: 0.0,
                stddev: 1.0,
            },
            "xavierUniform" => Self::XavierUniform,
            "xavierNormal" => Self::XavierNormal,
            "heUniform" => Self::HeUniform,
            "heNormal" => Self::HeNormal,
            "varianceScaling" => Self::VarianceScaling {
                scale: 1.0,
                mode: FanMode::Out,
                distribution: VarianceDistribution::Uniform,
            },
            _ => Self::Uniform,
        }
    }

    /// Samples a fresh tensor of the given shape.
    pub fn sample(&self, shape: &[usize], rng: &mut impl Rng) -> Tensor {
        let (fan_in, fan_out) = calculate_fans(shape);

        match *self {
            Self::Constant(value) => algebra::filled(shape, value),
            Self::Zeros => algebra::zeros(shape),
            Self::Ones => algebra::filled(shape, 1.0),
            Self::Uniform => {
                let limit = 1.0 / (fan_in as f64).sqrt();
                uniform_tensor(shape, -limit, limit, rng)
            }
            Self::Normal { mean, stddev } => normal_tensor(shape, mean, stddev, rng),
            Self::XavierUniform => {
                let limit = 6.0f64.sqrt() / ((fan_in + fan_out) as f64).sqrt();
                uniform_tensor(shape, -limit, limit, rng)
            }
            Self::XavierNormal => {
                let stddev = (2.0 / (fan_in + fan_out) as f64).sqrt();
                normal_tensor(shape, 0.0, stddev, rng)
            }
            Self::HeUniform => {
                let limit = (6.0 / fan_in as f64).sqrt();
                uniform_tensor(shape, -limit, limit, rng)
            }
            Self::HeNormal => {
                let stddev = (2.0 / fan_in as f64).sqrt();
                normal_tensor(shape, 0.0, stddev, rng)
            }
            Self::VarianceScaling {
                scale,
                mode,
                distribution,
            } => {
                let n = match mode {
                    FanMode::In => fan_in as f64,
                    FanMode::Out => fan_out as f64,
                    FanMode::Average => (fan_in + fan_out) as f64 / 2.0,
                };
                match distribution {
                    VarianceDistribution::Uniform => {
                        let limit = (3.0 * scale / n).sqrt();
                        uniform_tensor(shape, -limit, limit, rng)
                    }
                    VarianceDistribution::Normal => {
                        normal_tensor(shape, 0.0, (scale / n).sqrt(), rng)
                    }
                }
            }
        }
    }
}

/// A uniform draw from `[min, max)`; tolerates `min == max`.
pub fn random_range(range: [f64; 2], rng: &mut impl Rng) -> f64 {
    range[0] + rng.gen::<f64>() * (range[1] - range[0])
}

fn uniform_tensor(shape: &[usize], min: f64, max: f64, rng: &mut impl Rng) -> Tensor {
    Tensor::from_shape_fn(ndarray::IxDyn(shape), |_| random_range([min, max], rng))
}

fn normal_tensor(shape: &[usize], mean: f64, stddev: f64, rng: &mut impl Rng) -> Tensor {
    let distribution =
        Normal::new(mean, stddev).expect("Couldn't create normal distribution");
    Tensor::from_shape_fn(ndarray::IxDyn(shape), |_| distribution.sample(rng))
}
