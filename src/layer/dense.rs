//! Fully-connected layer: `output = weights · input + bias`, per sample.

use serde_json::{json, Value};

use super::*;

#[derive(Clone, Debug)]
pub struct Dense {
    units: usize,
    input_size: usize,
    params: ParameterSet,
    input: Vec<Tensor>,
}

impl Dense {
    pub fn new(units: usize) -> Self {
        Self::with_input(units, 1)
    }

    pub fn with_input(units: usize, input_size: usize) -> Self {
        let mut layer = Self {
            units,
            input_size,
            params: ParameterSet::new("xavierNormal", "zeros"),
            input: Vec::new(),
        };
        layer.params.reshape(&[units, input_size], &[units]);
        layer
    }

    pub fn weights_initializer(mut self, name: &str) -> Self {
        self.params.weights_initializer = name.to_string();
        self.params
            .reshape(&[self.units, self.input_size], &[self.units]);
        self
    }

    pub fn bias_initializer(mut self, name: &str) -> Self {
        self.params.bias_initializer = name.to_string();
        self.params
            .reshape(&[self.units, self.input_size], &[self.units]);
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
        let units = usize_field(record, "units", 1);
        let input_size = shape_field(record, "inputShape", &[1])[0];

        let mut params = ParameterSet::new(
            &string_field(record, "weightsInitializer", "xavierNormal"),
            &string_field(record, "biasInitializer", "zeros"),
        );
        params.weights_constrain = bounds_field(record, "weightsConstrain", DEFAULT_CONSTRAIN);
        params.bias_constrain = bounds_field(record, "biasConstrain", DEFAULT_CONSTRAIN);
        params.reshape(&[units, input_size], &[units]);
        params.restore(record);

        Self {
            units,
            input_size,
            params,
            input: Vec::new(),
        }
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.units]
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.input_size = input_shape.first().copied().unwrap_or(1);
        self.params
            .reshape(&[self.units, self.input_size], &[self.units]);
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        self.input = input.to_vec();
        input
            .iter()
            .map(|sample| algebra::matvec(&self.params.weights, sample) + &self.params.bias)
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        let mut input_gradient = Vec::with_capacity(output_gradient.len());

        for (gradient, input) in output_gradient.iter().zip(&self.input) {
            self.params.weights_gradient += &algebra::outer(gradient, input);
            self.params.bias_gradient += gradient;

            input_gradient.push(algebra::matvec_transposed(&self.params.weights, gradient));
        }

        input_gradient
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "weights": self.params.weights,
            "bias": self.params.bias,
            "weightsInitializer": self.params.weights_initializer,
            "biasInitializer": self.params.bias_initializer,
            "inputShape": self.input_size,
            "units": self.units,
            "outputShape": self.units,
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

impl TrainableLayer for Dense {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::derivable::loss::Loss;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_forward_shapes() {
        let mut layer = Dense::with_input(3, 2);
        let batch = vec![algebra::zeros(&[2]), algebra::zeros(&[2])];

        let output = layer.forward(&batch);
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].shape(), &[3]);
        assert_eq!(layer.output_shape(), vec![3]);
    }

    #[test]
    fn test_resize_rerandomizes() {
        let mut layer = Dense::with_input(2, 2);
        layer.resize(&[5]);

        assert_eq!(layer.params.weights.shape(), &[2, 5]);
        assert_eq!(layer.parameter_count(), 12);
    }

    #[test]
    fn test_forward_values() {
        let mut layer = Dense::with_input(2, 2);
        layer
            .set_weights(arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn())
            .unwrap();
        layer.set_bias(arr1(&[0.5, -0.5]).into_dyn()).unwrap();

        let output = layer.forward(&[arr1(&[1.0, 1.0]).into_dyn()]);
        assert_eq!(output[0], arr1(&[3.5, 6.5]).into_dyn());
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let input = arr1(&[0.3, -0.7]).into_dyn();
        let target = arr1(&[1.0]).into_dyn();
        let loss = Loss::MeanSquaredError;
        let epsilon = 1e-6;

        let weights = arr2(&[[0.2, -0.4]]).into_dyn();
        let make_layer = |weights: &Tensor| {
            let mut layer = Dense::with_input(1, 2);
            layer.set_weights(weights.clone()).unwrap();
            layer.set_bias(arr1(&[0.1]).into_dyn()).unwrap();
            layer
        };

        // Analytic gradient via backward.
        let mut layer = make_layer(&weights);
        let output = layer.forward(&[input.clone()]);
        let nabla = loss.nabla(&output[0], &target);
        layer.backward(&[nabla]);
        let analytic = layer.params.weights_gradient.clone();

        // Finite differences over each weight entry.
        for i in 0..2 {
            let mut bumped_up = weights.clone();
            bumped_up[[0, i]] += epsilon;
            let mut bumped_down = weights.clone();
            bumped_down[[0, i]] -= epsilon;

            let up = make_layer(&bumped_up).forward(&[input.clone()]);
            let down = make_layer(&bumped_down).forward(&[input.clone()]);
            let numeric =
                (loss.eval(&up[0], &target) - loss.eval(&down[0], &target)) / (2.0 * epsilon);

            approx::assert_relative_eq!(analytic[[0, i]], numeric, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_gradients_accumulate_across_samples() {
        let mut layer = Dense::with_input(1, 1);
        layer.set_weights(arr2(&[[1.0]]).into_dyn()).unwrap();
        layer.set_bias(arr1(&[0.0]).into_dyn()).unwrap();

        let batch = vec![arr1(&[2.0]).into_dyn(), arr1(&[3.0]).into_dyn()];
        layer.forward(&batch);
        layer.backward(&[arr1(&[1.0]).into_dyn(), arr1(&[1.0]).into_dyn()]);

        assert_eq!(layer.params.weights_gradient[[0, 0]], 5.0);
        assert_eq!(layer.params.bias_gradient[[0]], 2.0);
    }
}
