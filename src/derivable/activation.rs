//! Named pointwise activations with their derivatives and gradient
//! combination rules.
//!
//! Every variant except `Softmax` has a diagonal Jacobian, so its output
//! gradient combines with the derivative elementwise. `Softmax` couples all
//! entries of a sample; its derivative is a full Jacobian matrix and the
//! combination is a matrix-vector product.

use ndarray::{Array1, Array2, IxDyn};

use crate::algebra::{self, Tensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationFunction {
    Linear,
    Sigmoid,
    Relu,
    LeakyRelu,
    Elu,
    Softplus,
    BinaryStep,
    Tanh,
    Softmax,
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ActivationFunction {
    /// Resolves an activation name; unknown names fall back to the
    /// logistic sigmoid.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linear" => Self::Linear,
            "sigmoid" => Self::Sigmoid,
            "relu" => Self::Relu,
            "leakyrelu" => Self::LeakyRelu,
            "elu" => Self::Elu,
            "softplus" => Self::Softplus,
            "binarystep" => Self::BinaryStep,
            "tanh" => Self::Tanh,
            "softmax" => Self::Softmax,
            _ => Self::Sigmoid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::LeakyRelu => "leakyrelu",
            Self::Elu => "elu",
            Self::Softplus => "softplus",
            Self::BinaryStep => "binarystep",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
        }
    }

    pub fn eval(&self, input: &Tensor) -> Tensor {
        match self {
            Self::Linear => input.clone(),
            Self::Sigmoid => input.mapv(sigmoid),
            Self::Relu => input.mapv(|x| x.max(0.0)),
            Self::LeakyRelu => input.mapv(|x| if x > 0.0 { x } else { 0.01 * x }),
            Self::Elu => input.mapv(|x| if x > 0.0 { x } else { x.exp() - 1.0 }),
            Self::Softplus => input.mapv(|x| (1.0 + x.exp()).ln()),
            Self::BinaryStep => input.mapv(|x| if x < 0.0 { 0.0 } else { 1.0 }),
            Self::Tanh => input.mapv(f64::tanh),
            Self::Softmax => softmax(input),
        }
    }

    /// The derivative of `eval`, evaluated at `input`.
    ///
    /// For `Softmax` this is the `[n, n]` Jacobian of the flattened sample;
    /// for every other variant it is an elementwise tensor shaped like the
    /// input.
    pub fn derivate(&self, input: &Tensor) -> Tensor {
        match self {
            Self::Linear => algebra::filled(input.shape(), 1.0),
            Self::Sigmoid => input.mapv(|x| {
                let y = sigmoid(x);
                y * (1.0 - y)
            }),
            Self::Relu => input.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            Self::LeakyRelu => input.mapv(|x| if x > 0.0 { 1.0 } else { 0.01 }),
            Self::Elu => input.mapv(|x| if x > 0.0 { 1.0 } else { x.exp() }),
            Self::Softplus => input.mapv(sigmoid),
            Self::BinaryStep => algebra::zeros(input.shape()),
            Self::Tanh => input.mapv(|x| {
                let y = x.tanh();
                1.0 - y * y
            }),
            Self::Softmax => softmax_jacobian(input).into_dyn(),
        }
    }

    /// Combines the incoming output gradient with the derivative computed
    /// by [`ActivationFunction::derivate`].
    pub fn update_error(&self, output_gradient: &Tensor, derivative: &Tensor) -> Tensor {
        match self {
            Self::Linear => output_gradient.clone(),
            Self::Softmax => {
                let flat_len = output_gradient.len();
                let flat = output_gradient
                    .clone()
                    .into_shape(IxDyn(&[flat_len]))
                    .expect("update_error: gradient reshape cannot fail");
                algebra::matvec(derivative, &flat)
                    .into_shape(output_gradient.raw_dim())
                    .expect("update_error: gradient reshape cannot fail")
            }
            _ => output_gradient * derivative,
        }
    }
}

/// Numerically stabilized softmax over the flattened sample.
fn softmax(input: &Tensor) -> Tensor {
    let max = algebra::max_value(input);
    let shifted = input.mapv(|x| (x - max).exp());
    let total: f64 = shifted.sum();
    algebra::safe_div_scalar(&shifted, total)
}

fn softmax_jacobian(input: &Tensor) -> Array2<f64> {
    let activated = softmax(input);
    let s = Array1::from_iter(activated.iter().copied());
    let n = s.len();

    // J = diag(s) − s·sᵀ
    let mut jacobian = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            jacobian[[i, j]] = if i == j {
                s[i] * (1.0 - s[j])
            } else {
                -s[i] * s[j]
            };
        }
    }
    jacobian
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_approx;
    use ndarray::arr1;

    #[test]
    fn test_unknown_name_defaults_to_sigmoid() {
        assert_eq!(
            ActivationFunction::from_name("not-a-function"),
            ActivationFunction::Sigmoid
        );
        assert_eq!(ActivationFunction::from_name("relu"), ActivationFunction::Relu);
    }

    #[test]
    fn test_sigmoid() {
        let input = arr1(&[0.0]).into_dyn();
        let f = ActivationFunction::Sigmoid;
        assert_approx!(f.eval(&input)[[0]], 0.5, 1e-12);
        assert_approx!(f.derivate(&input)[[0]], 0.25, 1e-12);
    }

    #[test]
    fn test_relu() {
        let input = arr1(&[-1.0, 2.0]).into_dyn();
        let f = ActivationFunction::Relu;
        assert_eq!(f.eval(&input), arr1(&[0.0, 2.0]).into_dyn());
        assert_eq!(f.derivate(&input), arr1(&[0.0, 1.0]).into_dyn());
    }

    #[test]
    fn test_softmax_normalizes() {
        let input = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let output = ActivationFunction::Softmax.eval(&input);
        assert_approx!(output.sum(), 1.0, 1e-12);
        assert!(output[[2]] > output[[1]] && output[[1]] > output[[0]]);
    }

    #[test]
    fn test_softmax_jacobian_combination() {
        let input = arr1(&[0.3, -0.2, 1.1]).into_dyn();
        let gradient = arr1(&[0.5, -1.0, 0.25]).into_dyn();

        let f = ActivationFunction::Softmax;
        let s = f.eval(&input);
        let combined = f.update_error(&gradient, &f.derivate(&input));

        // Row i of the Jacobian dotted with the gradient.
        for i in 0..3 {
            let mut expected = 0.0;
            for j in 0..3 {
                let jac = if i == j {
                    s[[i]] * (1.0 - s[[j]])
                } else {
                    -s[[i]] * s[[j]]
                };
                expected += jac * gradient[[j]];
            }
            assert_approx!(combined[[i]], expected, 1e-12);
        }
    }

    #[test]
    fn test_elementwise_combination() {
        let gradient = arr1(&[2.0, 3.0]).into_dyn();
        let derivative = arr1(&[0.5, -1.0]).into_dyn();
        let combined = ActivationFunction::Tanh.update_error(&gradient, &derivative);
        assert_eq!(combined, arr1(&[1.0, -3.0]).into_dyn());
    }
}
