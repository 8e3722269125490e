//! Per-sample normalization with a learned elementwise scale and shift.
//!
//! Statistics are computed over the entire feature tensor of each sample,
//! not across the batch and not per channel. The forward cache keeps the
//! centered input and variance of the *last* sample only, so the backward
//! pass is numerically correct for batch size 1; larger batches reuse the
//! last sample's statistics. Kept as-is for compatibility with models
//! trained this way.

use serde_json::{json, Value};

use super::*;

#[derive(Clone, Debug)]
struct NormCache {
    centered: Tensor,
    variance: f64,
}

#[derive(Clone, Debug)]
pub struct Normalization {
    epsilon: f64,
    input_shape: Vec<usize>,
    params: ParameterSet,
    cache: Option<NormCache>,
}

impl Normalization {
    pub fn new() -> Self {
        Self::with_epsilon(1e-7)
    }

    pub fn with_epsilon(epsilon: f64) -> Self {
        let mut layer = Self {
            epsilon,
            input_shape: vec![1],
            params: ParameterSet::new("ones", "zeros"),
            cache: None,
        };
        layer.params.reshape(&[1], &[1]);
        layer
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.resize(shape);
        self
    }

    pub fn weights_constrain(mut self, bounds: [f64; 2]) -> Self {
        self.params.weights_constrain = bounds;
        self
    }

    pub fn bias_constrain(mut self, bounds: [f64; 2]) -> Self {
        self.params.bias_constrain = bounds;
        self
    }

    pub fn from_record(record: &Value) -> Self {
        let mut layer = Self::with_epsilon(f64_field(record, "epsilon", 1e-7))
            .input_shape(&shape_field(record, "inputShape", &[1]));
        layer.params.weights_constrain =
            bounds_field(record, "weightsConstrain", DEFAULT_CONSTRAIN);
        layer.params.bias_constrain = bounds_field(record, "biasConstrain", DEFAULT_CONSTRAIN);
        layer.params.restore(record);
        layer
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Normalization {
    fn kind(&self) -> &'static str {
        "norm"
    }

    fn output_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.input_shape = input_shape.to_vec();
        self.params.reshape(input_shape, input_shape);
        self.cache = None;
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        input
            .iter()
            .map(|sample| {
                let mean = algebra::mean(sample);
                let variance = algebra::variance(sample);
                let std = (variance + self.epsilon).sqrt();

                let centered = sample - mean;
                let normalized = algebra::safe_div_scalar(&centered, std);
                self.cache = Some(NormCache { centered, variance });

                normalized * &self.params.weights + &self.params.bias
            })
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        let params = &mut self.params;
        let cache = self
            .cache
            .as_ref()
            .expect("backward requires a preceding forward call");

        let n = cache.centered.len() as f64;
        let std = (cache.variance + self.epsilon).sqrt();
        let normalized = algebra::safe_div_scalar(&cache.centered, std);

        output_gradient
            .iter()
            .map(|gradient| {
                params.weights_gradient += &(gradient * &normalized);
                params.bias_gradient += gradient;

                let dnormalized = gradient * &params.weights;
                let dvariance = (&dnormalized * &cache.centered).sum()
                    * algebra::safe_div_value(-0.5, std.powi(3));
                let dmean = dnormalized.sum() * algebra::safe_div_value(-1.0, std)
                    + dvariance * algebra::safe_div_value(-2.0 * cache.centered.sum(), n);

                algebra::safe_div_scalar(&dnormalized, std)
                    + &cache.centered * algebra::safe_div_value(2.0 * dvariance, n)
                    + algebra::safe_div_value(dmean, n)
            })
            .collect()
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "epsilon": self.epsilon,
            "inputShape": self.input_shape,
            "weights": self.params.weights,
            "bias": self.params.bias,
            "weightsConstrain": self.params.weights_constrain,
            "biasConstrain": self.params.bias_constrain,
        })
    }

    fn parameter_count(&self) -> usize {
        self.params.parameter_count()
    }

    fn as_trainable_mut(&mut self) -> Option<&mut dyn TrainableLayer> {
        Some(self)
    }
}

impl TrainableLayer for Normalization {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}
