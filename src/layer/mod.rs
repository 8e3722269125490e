//! Layer variants and the capability contracts they implement.
//!
//! [`Layer`] is the polymorphic unit a [`crate::network::Sequential`] model
//! is assembled from; the trainable subset additionally implements
//! [`TrainableLayer`], which exposes the shared parameter machinery in
//! [`ParameterSet`].

use dyn_clone::DynClone;
use rand::Rng;
use serde_json::Value;

use crate::algebra::{self, Tensor};
use crate::err::ShapeMismatch;
use crate::initializer::{random_range, Initializer};
use crate::optimizer::{Optimizer, OptimizerState};

mod activation;
pub use activation::ActivationLayer;

mod convolution;
pub use convolution::Convolution;

mod dense;
pub use dense::Dense;

mod dropout;
pub use dropout::Dropout;

mod flatten;
pub use flatten::Flatten;

mod max_pooling;
pub use max_pooling::MaxPooling;

mod normalization;
pub use normalization::Normalization;

/// The common contract of every layer variant.
///
/// `forward` must populate whatever cache `backward` needs; calling it again
/// overwrites the previous cache. `backward` assumes `forward` was just
/// called for the same batch.
pub trait Layer: DynClone + std::fmt::Debug {
    /// The persisted type tag of this variant.
    fn kind(&self) -> &'static str;

    fn output_shape(&self) -> Vec<usize>;

    /// Recomputes shape-dependent state for a new input shape. Trainable
    /// variants re-initialize their parameters from their configured
    /// distributions, so resizing re-randomizes them.
    fn resize(&mut self, input_shape: &[usize]);

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor>;

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor>;

    /// Hyperparameters plus, for trainable variants, current parameter
    /// values; sufficient to reconstruct an equivalent layer.
    fn save(&self) -> Value;

    fn parameter_count(&self) -> usize {
        0
    }

    fn as_trainable_mut(&mut self) -> Option<&mut dyn TrainableLayer> {
        None
    }
}

dyn_clone::clone_trait_object!(Layer);

/// The additional contract of the trainable subset (dense, convolution,
/// normalization).
pub trait TrainableLayer: Layer {
    fn params(&self) -> &ParameterSet;

    fn params_mut(&mut self) -> &mut ParameterSet;

    /// Consults the optimizer and mutates the parameters: averages the
    /// accumulated gradients over the batch, subtracts the optimizer's
    /// deltas, clamps into the constrain bounds and zeroes the
    /// accumulators.
    fn update(&mut self, optimizer: &Optimizer, batch_size: usize, index: usize) {
        self.params_mut().update(optimizer, batch_size, index);
    }

    fn get_weights(&self) -> Tensor {
        self.params().weights.clone()
    }

    fn get_bias(&self) -> Tensor {
        self.params().bias.clone()
    }

    fn set_weights(&mut self, weights: Tensor) -> Result<(), ShapeMismatch> {
        self.params_mut().set_weights(weights)
    }

    fn set_bias(&mut self, bias: Tensor) -> Result<(), ShapeMismatch> {
        self.params_mut().set_bias(bias)
    }

    fn mutate_weights(&mut self, rate: f64, range: [f64; 2]) {
        self.params_mut().mutate_weights(rate, range);
    }

    fn mutate_bias(&mut self, rate: f64, range: [f64; 2]) {
        self.params_mut().mutate_bias(rate, range);
    }

    /// Perturbs weights and bias alike.
    fn mutate(&mut self, rate: f64, range: [f64; 2]) {
        self.mutate_weights(rate, range);
        self.mutate_bias(rate, range);
    }
}

pub const DEFAULT_CONSTRAIN: [f64; 2] = [-1e7, 1e7];

/// Parameter tensors and the bookkeeping every trainable layer shares:
/// gradient accumulators, clamp bounds, initializer names and one
/// optimizer-state instance per parameter tensor.
///
/// Invariant: the gradient accumulators and optimizer-state slots always
/// have the same shape as their parameter tensor.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    pub weights: Tensor,
    pub bias: Tensor,
    pub weights_gradient: Tensor,
    pub bias_gradient: Tensor,
    pub weights_constrain: [f64; 2],
    pub bias_constrain: [f64; 2],
    pub weights_initializer: String,
    pub bias_initializer: String,
    pub weights_state: OptimizerState,
    pub bias_state: OptimizerState,
}

impl ParameterSet {
    pub fn new(weights_initializer: &str, bias_initializer: &str) -> Self {
        Self {
            weights: algebra::zeros(&[0]),
            bias: algebra::zeros(&[0]),
            weights_gradient: algebra::zeros(&[0]),
            bias_gradient: algebra::zeros(&[0]),
            weights_constrain: DEFAULT_CONSTRAIN,
            bias_constrain: DEFAULT_CONSTRAIN,
            weights_initializer: weights_initializer.to_string(),
            bias_initializer: bias_initializer.to_string(),
            weights_state: OptimizerState::zeros(&[0]),
            bias_state: OptimizerState::zeros(&[0]),
        }
    }

    /// Re-samples both parameters from their initializers and zeroes every
    /// accumulator and optimizer slot.
    pub fn reshape(&mut self, weights_shape: &[usize], bias_shape: &[usize]) {
        let mut rng = rand::thread_rng();
        self.weights =
            Initializer::from_name(&self.weights_initializer).sample(weights_shape, &mut rng);
        self.bias = Initializer::from_name(&self.bias_initializer).sample(bias_shape, &mut rng);
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.weights_gradient = algebra::zeros(self.weights.shape());
        self.bias_gradient = algebra::zeros(self.bias.shape());
        self.weights_state = OptimizerState::zeros(self.weights.shape());
        self.bias_state = OptimizerState::zeros(self.bias.shape());
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    pub fn update(&mut self, optimizer: &Optimizer, batch_size: usize, index: usize) {
        self.weights_gradient = algebra::safe_div_scalar(&self.weights_gradient, batch_size as f64);
        self.bias_gradient = algebra::safe_div_scalar(&self.bias_gradient, batch_size as f64);

        let weights_delta =
            optimizer.apply(&self.weights_gradient, &mut self.weights_state, index);
        let bias_delta = optimizer.apply(&self.bias_gradient, &mut self.bias_state, index);

        self.weights -= &weights_delta;
        self.bias -= &bias_delta;

        algebra::constrain(&mut self.weights, self.weights_constrain);
        algebra::constrain(&mut self.bias, self.bias_constrain);

        self.weights_gradient.fill(0.0);
        self.bias_gradient.fill(0.0);
    }

    pub fn set_weights(&mut self, weights: Tensor) -> Result<(), ShapeMismatch> {
        if weights.shape() != self.weights.shape() {
            return Err(ShapeMismatch {
                existing: self.weights.shape().to_vec(),
                new: weights.shape().to_vec(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    pub fn set_bias(&mut self, bias: Tensor) -> Result<(), ShapeMismatch> {
        if bias.shape() != self.bias.shape() {
            return Err(ShapeMismatch {
                existing: self.bias.shape().to_vec(),
                new: bias.shape().to_vec(),
            });
        }
        self.bias = bias;
        Ok(())
    }

    pub fn mutate_weights(&mut self, rate: f64, range: [f64; 2]) {
        let mut rng = rand::thread_rng();
        self.weights.mapv_inplace(|x| {
            if rng.gen::<f64>() < rate {
                random_range(range, &mut rng)
            } else {
                x
            }
        });
    }

    pub fn mutate_bias(&mut self, rate: f64, range: [f64; 2]) {
        let mut rng = rand::thread_rng();
        self.bias.mapv_inplace(|x| {
            if rng.gen::<f64>() < rate {
                random_range(range, &mut rng)
            } else {
                x
            }
        });
    }

    /// Restores persisted parameter values from a layer record, if present.
    /// A persisted tensor whose shape disagrees with the layer's declared
    /// shapes is a hard error.
    pub fn restore(&mut self, record: &Value) {
        if let Some(weights) = tensor_field(record, "weights") {
            self.set_weights(weights)
                .expect("persisted weights don't match the layer's shape");
        }
        if let Some(bias) = tensor_field(record, "bias") {
            self.set_bias(bias)
                .expect("persisted bias doesn't match the layer's shape");
        }
    }
}

/// Builds a layer from its persisted record, dispatching on the `type` tag.
/// An unknown tag resolves to a dense layer.
pub fn from_record(record: &Value) -> Box<dyn Layer> {
    match record.get("type").and_then(Value::as_str) {
        Some("conv") => Box::new(Convolution::from_record(record)),
        Some("maxpooling") => Box::new(MaxPooling::from_record(record)),
        Some("flatten") => Box::new(Flatten::from_record(record)),
        Some("dropout") => Box::new(Dropout::from_record(record)),
        Some("norm") => Box::new(Normalization::from_record(record)),
        Some("activation") => Box::new(ActivationLayer::from_record(record)),
        _ => Box::new(Dense::from_record(record)),
    }
}

// Lenient field accessors for persisted records; absent or malformed fields
// fall back to the layer's construction defaults.

pub(crate) fn usize_field(record: &Value, key: &str, default: usize) -> usize {
    record
        .get(key)
        .and_then(Value::as_f64)
        .map(|x| x as usize)
        .unwrap_or(default)
}

pub(crate) fn f64_field(record: &Value, key: &str, default: f64) -> f64 {
    record.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub(crate) fn bool_field(record: &Value, key: &str, default: bool) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn string_field(record: &Value, key: &str, default: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// A shape stored either as a single number or as an array of numbers.
pub(crate) fn shape_field(record: &Value, key: &str, default: &[usize]) -> Vec<usize> {
    match record.get(key) {
        Some(Value::Number(n)) => vec![n.as_f64().unwrap_or(1.0) as usize],
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| v.as_f64().unwrap_or(1.0) as usize)
            .collect(),
        _ => default.to_vec(),
    }
}

/// A `[rows, cols]` pair stored either as a single number or a 2-array.
pub(crate) fn pair_field(record: &Value, key: &str, default: [usize; 2]) -> [usize; 2] {
    let shape = shape_field(record, key, &default);
    match shape.len() {
        1 => [shape[0], shape[0]],
        2 => [shape[0], shape[1]],
        _ => default,
    }
}

pub(crate) fn bounds_field(record: &Value, key: &str, default: [f64; 2]) -> [f64; 2] {
    match record.get(key) {
        Some(Value::Array(values)) if values.len() == 2 => [
            values[0].as_f64().unwrap_or(default[0]),
            values[1].as_f64().unwrap_or(default[1]),
        ],
        _ => default,
    }
}

pub(crate) fn tensor_field(record: &Value, key: &str) -> Option<Tensor> {
    record
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_set_weights_refuses_mismatched_shape() {
        let mut params = ParameterSet::new("zeros", "zeros");
        params.reshape(&[2, 3], &[2]);

        let err = params
            .set_weights(arr1(&[1.0, 2.0]).into_dyn())
            .unwrap_err();
        assert_eq!(err.existing, vec![2, 3]);
        assert_eq!(err.new, vec![2]);

        assert!(params.set_bias(arr1(&[1.0, 2.0]).into_dyn()).is_ok());
    }

    #[test]
    fn test_update_resets_accumulators() {
        let mut params = ParameterSet::new("zeros", "zeros");
        params.reshape(&[2], &[2]);
        params.weights_gradient = arr1(&[2.0, 4.0]).into_dyn();

        params.update(&Optimizer::sgd(0.5), 2, 1);

        // gradient / batch = [1, 2], delta = [0.5, 1]
        assert_eq!(params.weights, arr1(&[-0.5, -1.0]).into_dyn());
        assert!(params.weights_gradient.iter().all(|&x| x == 0.0));
        assert!(params.bias_gradient.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_update_with_zero_batch_size() {
        let mut params = ParameterSet::new("ones", "zeros");
        params.reshape(&[2], &[2]);
        params.weights_gradient = arr1(&[1.0, 1.0]).into_dyn();

        // Safe division: a zero batch size produces a zero delta.
        params.update(&Optimizer::sgd(0.5), 0, 1);
        assert_eq!(params.weights, arr1(&[1.0, 1.0]).into_dyn());
    }

    #[test]
    fn test_update_clamps_to_constrain_bounds() {
        let mut params = ParameterSet::new("zeros", "zeros");
        params.reshape(&[1], &[1]);
        params.weights_constrain = [-0.1, 0.1];
        params.weights_gradient = arr1(&[10.0]).into_dyn();

        params.update(&Optimizer::sgd(1.0), 1, 1);
        assert_eq!(params.weights, arr1(&[-0.1]).into_dyn());
    }

    #[test]
    fn test_unknown_record_type_defaults_to_dense() {
        let record = serde_json::json!({
            "type": "mystery",
            "units": 3,
            "inputShape": 2,
        });
        let layer = from_record(&record);
        assert_eq!(layer.kind(), "dense");
        assert_eq!(layer.output_shape(), vec![3]);
    }

    #[test]
    fn test_mutate_with_unit_rate_replaces_everything() {
        let mut params = ParameterSet::new("ones", "ones");
        params.reshape(&[4], &[4]);

        params.mutate_weights(1.0, [0.0, 0.0]);
        assert!(params.weights.iter().all(|&x| x == 0.0));
        // Bias untouched by mutate_weights.
        assert!(params.bias.iter().all(|&x| x == 1.0));
    }
}
