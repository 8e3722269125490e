//! Stateless wrapper applying a named pointwise activation per sample.

use serde_json::{json, Value};

use crate::derivable::activation::ActivationFunction;

use super::*;

#[derive(Clone, Debug)]
pub struct ActivationLayer {
    function: ActivationFunction,
    input_shape: Vec<usize>,
    input: Vec<Tensor>,
}

impl ActivationLayer {
    /// Unknown activation names resolve to the sigmoid.
    pub fn new(name: &str) -> Self {
        Self {
            function: ActivationFunction::from_name(name),
            input_shape: vec![1],
            input: Vec::new(),
        }
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = shape.to_vec();
        self
    }

    pub fn from_record(record: &Value) -> Self {
        Self::new(&string_field(record, "activation", "sigmoid"))
            .input_shape(&shape_field(record, "inputShape", &[1]))
    }
}

impl Layer for ActivationLayer {
    fn kind(&self) -> &'static str {
        "activation"
    }

    fn output_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.input_shape = input_shape.to_vec();
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        self.input = input.to_vec();
        input.iter().map(|sample| self.function.eval(sample)).collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        output_gradient
            .iter()
            .zip(&self.input)
            .map(|(gradient, input)| {
                let derivative = self.function.derivate(input);
                self.function.update_error(gradient, &derivative)
            })
            .collect()
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "activation": self.function.name(),
            "inputShape": self.input_shape,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_approx;
    use ndarray::arr1;

    #[test]
    fn test_forward_applies_function() {
        let mut layer = ActivationLayer::new("relu").input_shape(&[3]);
        let output = layer.forward(&[arr1(&[-1.0, 0.5, 2.0]).into_dyn()]);
        assert_eq!(output[0], arr1(&[0.0, 0.5, 2.0]).into_dyn());
        assert_eq!(layer.output_shape(), vec![3]);
    }

    #[test]
    fn test_backward_scales_by_derivative() {
        let mut layer = ActivationLayer::new("sigmoid").input_shape(&[1]);
        layer.forward(&[arr1(&[0.0]).into_dyn()]);

        let input_gradient = layer.backward(&[arr1(&[2.0]).into_dyn()]);
        // σ'(0) = 0.25
        assert_approx!(input_gradient[0][[0]], 0.5, 1e-12);
    }

    #[test]
    fn test_unknown_name_defaults_to_sigmoid() {
        let mut layer = ActivationLayer::new("bogus").input_shape(&[1]);
        let output = layer.forward(&[arr1(&[0.0]).into_dyn()]);
        assert_approx!(output[0][[0]], 0.5, 1e-12);
    }

    #[test]
    fn test_softmax_batch_members_are_independent() {
        let mut layer = ActivationLayer::new("softmax").input_shape(&[2]);
        let batch = vec![
            arr1(&[0.0, 0.0]).into_dyn(),
            arr1(&[5.0, 5.0]).into_dyn(),
        ];

        let output = layer.forward(&batch);
        assert_approx!(output[0][[0]], 0.5, 1e-12);
        assert_approx!(output[1][[1]], 0.5, 1e-12);
    }
}
