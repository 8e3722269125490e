//! Dropout: zeroes each forward element independently with probability
//! `rate`.
//!
//! Surviving elements are not rescaled, and the backward pass returns the
//! output gradient unchanged rather than reapplying the forward mask. Both
//! are deliberate traits of this layer, not oversights.

use rand::Rng;
use serde_json::{json, Value};

use super::*;

#[derive(Clone, Debug)]
pub struct Dropout {
    rate: f64,
    input_shape: Vec<usize>,
}

impl Dropout {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            input_shape: vec![1],
        }
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = shape.to_vec();
        self
    }

    pub fn from_record(record: &Value) -> Self {
        Self::new(f64_field(record, "rate", 0.0))
            .input_shape(&shape_field(record, "inputShape", &[1]))
    }
}

impl Layer for Dropout {
    fn kind(&self) -> &'static str {
        "dropout"
    }

    fn output_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.input_shape = input_shape.to_vec();
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        let mut rng = rand::thread_rng();
        input
            .iter()
            .map(|sample| {
                sample.mapv(|x| if rng.gen::<f64>() < self.rate { 0.0 } else { x })
            })
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        output_gradient.to_vec()
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "rate": self.rate,
            "inputShape": self.input_shape,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rate_zero_keeps_everything() {
        let mut layer = Dropout::new(0.0).input_shape(&[8]);
        let input = algebra::filled(&[8], 3.0);

        let output = layer.forward(&[input.clone()]);
        assert_eq!(output[0], input);
    }

    #[test]
    fn test_rate_one_zeroes_everything() {
        let mut layer = Dropout::new(1.0).input_shape(&[8]);
        let output = layer.forward(&[algebra::filled(&[8], 3.0)]);
        assert!(output[0].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_backward_is_identity() {
        let mut layer = Dropout::new(1.0).input_shape(&[4]);
        layer.forward(&[algebra::filled(&[4], 1.0)]);

        let gradient = algebra::filled(&[4], 0.5);
        let input_gradient = layer.backward(&[gradient.clone()]);
        assert_eq!(input_gradient[0], gradient);
    }
}
