//! Reshapes each sample to a rank-1 tensor; values are untouched.

use ndarray::IxDyn;
use serde_json::{json, Value};

use super::*;

#[derive(Clone, Debug)]
pub struct Flatten {
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn new() -> Self {
        Self {
            input_shape: vec![1],
        }
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = shape.to_vec();
        self
    }

    pub fn from_record(record: &Value) -> Self {
        Self::new().input_shape(&shape_field(record, "inputShape", &[1]))
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Flatten {
    fn kind(&self) -> &'static str {
        "flatten"
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.input_shape.iter().product()]
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.input_shape = input_shape.to_vec();
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        input
            .iter()
            .map(|sample| {
                sample
                    .to_owned()
                    .into_shape(IxDyn(&[sample.len()]))
                    .expect("a tensor always flattens to its element count")
            })
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        output_gradient
            .iter()
            .map(|gradient| {
                gradient
                    .to_owned()
                    .into_shape(IxDyn(&self.input_shape))
                    .expect("gradient length matches the cached input shape")
            })
            .collect()
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "inputShape": self.input_shape,
        })
    }
}
