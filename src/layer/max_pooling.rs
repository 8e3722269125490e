//! 2D max pooling over `[channels, rows, cols]` samples.
//!
//! The forward pass records, for every pooled value, the input coordinate
//! it was taken from; the backward pass routes each output gradient entry
//! back to exactly that coordinate. Positions that never won a window
//! receive a zero gradient.

use ndarray::Ix3;
use serde_json::{json, Value};

use crate::algebra::{max_pool3d, pool_output_shape, pool_pad_amount};

use super::*;

#[derive(Clone, Debug)]
pub struct MaxPooling {
    pool_size: [usize; 2],
    stride: [usize; 2],
    padding: bool,
    input_shape: Vec<usize>,
    pad_amount: [usize; 2],
    output_shape: Vec<usize>,
    // One coordinate list per sample of the last forward batch.
    coords: Vec<Vec<[usize; 5]>>,
}

impl MaxPooling {
    pub fn new(pool_size: [usize; 2]) -> Self {
        let mut layer = Self {
            pool_size,
            stride: pool_size,
            padding: false,
            input_shape: vec![1, 1, 1],
            pad_amount: [0, 0],
            output_shape: Vec::new(),
            coords: Vec::new(),
        };
        layer.recompute();
        layer
    }

    pub fn stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self.recompute();
        self
    }

    /// When enabled, pads the trailing edge so strided windows cover the
    /// whole input.
    pub fn padding(mut self, padding: bool) -> Self {
        self.padding = padding;
        self.recompute();
        self
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.set_input_shape(shape);
        self
    }

    pub fn from_record(record: &Value) -> Self {
        let pool_size = pair_field(record, "poolSize", [2, 2]);
        Self::new(pool_size)
            .stride(pair_field(record, "stride", pool_size))
            .padding(bool_field(record, "padding", false))
            .input_shape(&shape_field(record, "inputShape", &[1, 1, 1]))
    }

    fn set_input_shape(&mut self, shape: &[usize]) {
        self.input_shape = if shape.len() == 3 {
            shape.to_vec()
        } else {
            vec![1, 1, 1]
        };
        self.recompute();
    }

    fn recompute(&mut self) {
        let spatial = [self.input_shape[1], self.input_shape[2]];
        self.pad_amount = pool_pad_amount(spatial, self.padding, self.pool_size, self.stride);
        let output = pool_output_shape(spatial, self.pad_amount, self.pool_size, self.stride);
        self.output_shape = vec![self.input_shape[0], output[0], output[1]];
    }
}

impl Layer for MaxPooling {
    fn kind(&self) -> &'static str {
        "maxpooling"
    }

    fn output_shape(&self) -> Vec<usize> {
        self.output_shape.clone()
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.set_input_shape(input_shape);
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        self.coords.clear();
        input
            .iter()
            .map(|sample| {
                let sample = sample
                    .view()
                    .into_dimensionality::<Ix3>()
                    .expect("pooling input must be [channels, rows, cols]");
                let (output, coords) =
                    max_pool3d(sample, self.pool_size, self.stride, self.pad_amount);
                self.coords.push(coords);
                output.into_dyn()
            })
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        output_gradient
            .iter()
            .zip(&self.coords)
            .map(|(gradient, coords)| {
                let mut sample_gradient = algebra::zeros(&self.input_shape);
                // Overlapping windows may select the same input position;
                // their gradients accumulate.
                for &[channel, row, col, out_row, out_col] in coords {
                    sample_gradient[[channel, row, col]] +=
                        gradient[[channel, out_row, out_col]];
                }
                sample_gradient
            })
            .collect()
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "poolSize": self.pool_size,
            "stride": self.stride,
            "padding": self.padding,
            "inputShape": self.input_shape,
        })
    }
}
