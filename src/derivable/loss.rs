//! Named loss pairs: a scalar forward per sample and a gradient tensor
//! shaped like the prediction.

use crate::algebra::{self, Tensor};
use crate::derivable::activation::ActivationFunction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loss {
    MeanSquaredError,
    CrossEntropy,
    SoftmaxCrossEntropy,
    BinaryCrossEntropy,
}

impl Loss {
    /// Resolves a loss name; unknown names fall back to mean squared error.
    pub fn from_name(name: &str) -> Self {
        match name {
            "crossEntropy" => Self::CrossEntropy,
            "softmaxCrossEntropy" => Self::SoftmaxCrossEntropy,
            "binaryCrossEntropy" => Self::BinaryCrossEntropy,
            _ => Self::MeanSquaredError,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanSquaredError => "mse",
            Self::CrossEntropy => "crossEntropy",
            Self::SoftmaxCrossEntropy => "softmaxCrossEntropy",
            Self::BinaryCrossEntropy => "binaryCrossEntropy",
        }
    }

    /// Per-sample loss value.
    pub fn eval(&self, prediction: &Tensor, target: &Tensor) -> f64 {
        match self {
            Self::MeanSquaredError => {
                let diff = target - prediction;
                algebra::mean(&diff.mapv(|x| x * x))
            }
            Self::CrossEntropy => {
                -(target * &prediction.mapv(f64::ln)).sum()
            }
            Self::SoftmaxCrossEntropy => {
                let activated = ActivationFunction::Softmax.eval(prediction);
                -(target * &activated.mapv(f64::ln)).sum()
            }
            Self::BinaryCrossEntropy => {
                let hits = target * &prediction.mapv(f64::ln);
                let misses = target.mapv(|t| 1.0 - t) * prediction.mapv(|p| (1.0 - p).ln());
                -algebra::mean(&(hits + misses))
            }
        }
    }

    /// Gradient of the loss with respect to the prediction.
    pub fn nabla(&self, prediction: &Tensor, target: &Tensor) -> Tensor {
        match self {
            Self::MeanSquaredError => {
                let diff = (prediction - target) * 2.0;
                algebra::safe_div_scalar(&diff, prediction.len() as f64)
            }
            Self::CrossEntropy => {
                target * &prediction.mapv(|p| algebra::safe_div_value(-1.0, p))
            }
            // Closed form: softmax(prediction) − target.
            Self::SoftmaxCrossEntropy => {
                ActivationFunction::Softmax.eval(prediction) - target
            }
            Self::BinaryCrossEntropy => {
                let first = algebra::safe_div(
                    &target.mapv(|t| 1.0 - t),
                    &prediction.mapv(|p| 1.0 - p),
                );
                let second = algebra::safe_div(target, prediction);
                algebra::safe_div_scalar(&(first - second), prediction.len() as f64)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_approx;
    use ndarray::arr1;

    #[test]
    fn test_unknown_name_defaults_to_mse() {
        assert_eq!(Loss::from_name("mse"), Loss::MeanSquaredError);
        assert_eq!(Loss::from_name("hinge"), Loss::MeanSquaredError);
    }

    #[test]
    fn test_mean_squared_error() {
        let prediction = arr1(&[1.0, 2.0]).into_dyn();
        let target = arr1(&[1.0, 0.0]).into_dyn();

        let loss = Loss::MeanSquaredError;
        assert_approx!(loss.eval(&prediction, &target), 2.0, 1e-12);
        assert_eq!(
            loss.nabla(&prediction, &target),
            arr1(&[0.0, 2.0]).into_dyn()
        );
    }

    #[test]
    fn test_softmax_cross_entropy_nabla_closed_form() {
        let prediction = arr1(&[2.0, -1.0, 0.5, 0.5]).into_dyn();
        let target = arr1(&[0.1, 0.2, 0.3, 0.4]).into_dyn();

        let nabla = Loss::SoftmaxCrossEntropy.nabla(&prediction, &target);
        let expected = ActivationFunction::Softmax.eval(&prediction) - &target;
        for i in 0..4 {
            assert_approx!(nabla[[i]], expected[[i]], 1e-12);
        }
        // A target summing to 1 makes the gradient sum to 0.
        assert_approx!(nabla.sum(), 0.0, 1e-12);
    }

    #[test]
    fn test_cross_entropy_gradient_is_safe_at_zero() {
        let prediction = arr1(&[0.0, 0.5]).into_dyn();
        let target = arr1(&[1.0, 0.0]).into_dyn();

        let nabla = Loss::CrossEntropy.nabla(&prediction, &target);
        assert!(nabla.iter().all(|x| x.is_finite()));
        assert_eq!(nabla[[0]], 0.0);
    }

    #[test]
    fn test_binary_cross_entropy() {
        let prediction = arr1(&[0.8]).into_dyn();
        let target = arr1(&[1.0]).into_dyn();

        let loss = Loss::BinaryCrossEntropy;
        assert_approx!(loss.eval(&prediction, &target), -(0.8f64.ln()), 1e-12);
        assert_approx!(loss.nabla(&prediction, &target)[[0]], -1.25, 1e-12);
    }
}
