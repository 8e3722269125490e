//! A small neural network library: sequential models assembled from dense,
//! convolutional, pooling, dropout, normalization and activation layers,
//! trained by mini-batch gradient descent with pluggable optimizers and
//! losses, or perturbed through evolutionary mutation.
//!
//! Models serialize to a JSON record and reconstruct bit-exactly:
//!
//! ```
//! use neurite::prelude::*;
//!
//! let mut model = Sequential::new();
//! model.add(Dense::with_input(3, 2));
//! model.add(ActivationLayer::new("sigmoid"));
//! model.add(Dense::new(1));
//! model.compile("mse", Optimizer::sgd(0.1));
//!
//! let inputs = vec![ndarray::arr1(&[0.0, 1.0]).into_dyn()];
//! let targets = vec![ndarray::arr1(&[1.0]).into_dyn()];
//! model.train(&inputs, &targets, TrainOptions { epochs: 100, ..Default::default() });
//!
//! let restored = Sequential::from_json(&model.to_json()).unwrap();
//! ```

pub mod algebra;
pub mod derivable;
pub mod err;
pub mod initializer;
pub mod layer;
pub mod network;
pub mod optimizer;
pub mod utils;

pub mod prelude {
    pub use crate::algebra::Tensor;
    pub use crate::derivable::activation::ActivationFunction;
    pub use crate::derivable::loss::Loss;
    pub use crate::initializer::Initializer;
    pub use crate::layer::{
        ActivationLayer, Convolution, Dense, Dropout, Flatten, Layer, MaxPooling, Normalization,
        TrainableLayer,
    };
    pub use crate::network::{Sequential, TrainOptions};
    pub use crate::optimizer::Optimizer;
    pub use crate::utils::{argmax, one_hot};
}
