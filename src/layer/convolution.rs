//! 2D convolution layer over `[channels, rows, cols]` samples.
//!
//! Forward correlates the input against every filter (summing across input
//! channels) and adds a per-output-position bias. The backward pass uses
//! the correlation/convolution duality: the kernel gradient is a
//! correlation of the input with the output gradient, and the input
//! gradient a full (or same-padded) convolution of the output gradient
//! with the kernel.
//!
//! Gradient padding is only derived for stride = 1 and dilation = 1;
//! training behavior for other stride/dilation combinations is
//! unspecified.

use ndarray::{Array2, Array3, Axis, Ix3, Ix4};
use serde_json::{json, Value};

use crate::algebra::{conv_output_shape, convolve2d, correlate2d, Padding};

use super::*;

#[derive(Clone, Debug)]
pub struct Convolution {
    filters: usize,
    padding: Padding,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
    input_shape: Vec<usize>,
    kernel_shape: [usize; 4],
    pad_amount: [usize; 2],
    kernel_gradient_pad: Padding,
    input_gradient_pad: Padding,
    output_shape: Vec<usize>,
    params: ParameterSet,
    input: Vec<Tensor>,
}

impl Convolution {
    pub fn new(filters: usize, kernel_size: [usize; 2]) -> Self {
        let mut layer = Self {
            filters,
            padding: Padding::Valid,
            kernel_size,
            stride: [1, 1],
            dilation: [1, 1],
            input_shape: vec![1, 1, 1],
            kernel_shape: [0; 4],
            pad_amount: [0, 0],
            kernel_gradient_pad: Padding::Valid,
            input_gradient_pad: Padding::Full,
            output_shape: Vec::new(),
            params: ParameterSet::new("xavierNormal", "zeros"),
            input: Vec::new(),
        };
        layer.recompute();
        layer
    }

    /// Forward padding mode, `"valid"` or `"same"`; unknown names resolve
    /// to `"valid"`.
    pub fn padding(mut self, name: &str) -> Self {
        self.padding = Padding::from_name(name);
        (self.kernel_gradient_pad, self.input_gradient_pad) = match self.padding {
            Padding::Same => (
                Padding::Amount([self.kernel_size[0] - 1, self.kernel_size[1] - 1]),
                Padding::Same,
            ),
            _ => (Padding::Valid, Padding::Full),
        };
        self.recompute();
        self
    }

    pub fn stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self.recompute();
        self
    }

    pub fn dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self.recompute();
        self
    }

    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.set_input_shape(shape);
        self
    }

    pub fn weights_initializer(mut self, name: &str) -> Self {
        self.params.weights_initializer = name.to_string();
        self.recompute();
        self
    }

    pub fn bias_initializer(mut self, name: &str) -> Self {
        self.params.bias_initializer = name.to_string();
        self.recompute();
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
        let filters = usize_field(record, "filters", 1);
        let kernel_size = pair_field(record, "kernelSize", [1, 1]);

        let mut layer = Self::new(filters, kernel_size)
            .padding(&string_field(record, "padding", "valid"))
            .stride(pair_field(record, "stride", [1, 1]))
            .dilation(pair_field(record, "dilation", [1, 1]));
        layer.params.weights_initializer =
            string_field(record, "weightsInitializer", "xavierNormal");
        layer.params.bias_initializer = string_field(record, "biasInitializer", "zeros");
        layer.params.weights_constrain =
            bounds_field(record, "weightsConstrain", DEFAULT_CONSTRAIN);
        layer.params.bias_constrain = bounds_field(record, "biasConstrain", DEFAULT_CONSTRAIN);
        layer.set_input_shape(&shape_field(record, "inputShape", &[1, 1, 1]));
        layer.params.restore(record);
        layer
    }

    fn set_input_shape(&mut self, shape: &[usize]) {
        self.input_shape = if shape.len() == 3 {
            shape.to_vec()
        } else {
            vec![1, 1, 1]
        };
        self.recompute();
    }

    /// Recomputes every shape-derived field and re-initializes the
    /// parameters.
    fn recompute(&mut self) {
        let channels = self.input_shape[0];
        self.kernel_shape = [
            self.filters,
            channels,
            self.kernel_size[0],
            self.kernel_size[1],
        ];
        self.pad_amount = self.padding.amount(self.kernel_size, self.dilation);

        let spatial = conv_output_shape(
            [self.input_shape[1], self.input_shape[2]],
            self.kernel_size,
            self.pad_amount,
            self.stride,
            self.dilation,
        );
        self.output_shape = vec![self.filters, spatial[0], spatial[1]];
        let (kernel_shape, output_shape) = (self.kernel_shape, self.output_shape.clone());
        self.params.reshape(&kernel_shape, &output_shape);
    }
}

impl Layer for Convolution {
    fn kind(&self) -> &'static str {
        "conv"
    }

    fn output_shape(&self) -> Vec<usize> {
        self.output_shape.clone()
    }

    fn resize(&mut self, input_shape: &[usize]) {
        self.set_input_shape(input_shape);
    }

    fn forward(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        self.input = input.to_vec();
        let channels = self.input_shape[0];
        let kernels = self
            .params
            .weights
            .view()
            .into_dimensionality::<Ix4>()
            .expect("convolution kernels must be 4-dimensional");

        input
            .iter()
            .map(|sample| {
                let sample = sample
                    .view()
                    .into_dimensionality::<Ix3>()
                    .expect("convolution input must be [channels, rows, cols]");
                let mut output =
                    Array3::zeros((self.filters, self.output_shape[1], self.output_shape[2]));

                for filter in 0..self.filters {
                    let mut plane = Array2::zeros((self.output_shape[1], self.output_shape[2]));
                    for channel in 0..channels {
                        plane += &correlate2d(
                            sample.index_axis(Axis(0), channel),
                            kernels
                                .index_axis(Axis(0), filter)
                                .index_axis(Axis(0), channel),
                            self.pad_amount,
                            self.stride,
                            self.dilation,
                        );
                    }
                    output.index_axis_mut(Axis(0), filter).assign(&plane);
                }

                output.into_dyn() + &self.params.bias
            })
            .collect()
    }

    fn backward(&mut self, output_gradient: &[Tensor]) -> Vec<Tensor> {
        let channels = self.input_shape[0];
        let kernel_pad = self.kernel_gradient_pad.amount(self.kernel_size, [1, 1]);
        let input_pad = self.input_gradient_pad.amount(self.kernel_size, [1, 1]);
        let mut input_gradient = Vec::with_capacity(output_gradient.len());

        for (gradient, input) in output_gradient.iter().zip(&self.input) {
            let gradient3 = gradient
                .view()
                .into_dimensionality::<Ix3>()
                .expect("convolution output gradient must be [filters, rows, cols]");
            let input3 = input
                .view()
                .into_dimensionality::<Ix3>()
                .expect("convolution input must be [channels, rows, cols]");
            let mut sample_gradient = Array3::zeros((
                self.input_shape[0],
                self.input_shape[1],
                self.input_shape[2],
            ));

            for filter in 0..self.filters {
                let gradient_plane = gradient3.index_axis(Axis(0), filter);
                for channel in 0..channels {
                    let kernel_gradient = correlate2d(
                        input3.index_axis(Axis(0), channel),
                        gradient_plane,
                        kernel_pad,
                        [1, 1],
                        [1, 1],
                    );
                    let mut accumulator = self
                        .params
                        .weights_gradient
                        .index_axis_mut(Axis(0), filter);
                    let mut accumulator = accumulator.index_axis_mut(Axis(0), channel);
                    accumulator += &kernel_gradient;

                    let kernel = self
                        .params
                        .weights
                        .view()
                        .into_dimensionality::<Ix4>()
                        .expect("convolution kernels must be 4-dimensional")
                        .index_axis_move(Axis(0), filter)
                        .index_axis_move(Axis(0), channel);
                    let spread = convolve2d(gradient_plane, kernel, input_pad, [1, 1], [1, 1]);
                    let mut channel_gradient = sample_gradient.index_axis_mut(Axis(0), channel);
                    channel_gradient += &spread;
                }
            }

            self.params.bias_gradient += gradient;
            input_gradient.push(sample_gradient.into_dyn());
        }

        input_gradient
    }

    fn save(&self) -> Value {
        json!({
            "type": self.kind(),
            "filters": self.filters,
            "padding": self.padding.name(),
            "weightsInitializer": self.params.weights_initializer,
            "biasInitializer": self.params.bias_initializer,
            "kernelSize": self.kernel_size,
            "inputShape": self.input_shape,
            "stride": self.stride,
            "dilation": self.dilation,
            "weightsConstrain": self.params.weights_constrain,
            "biasConstrain": self.params.bias_constrain,
            "weights": self.params.weights,
            "bias": self.params.bias,
        })
    }

    fn parameter_count(&self) -> usize {
        self.params.parameter_count()
    }

    fn as_trainable_mut(&mut self) -> Option<&mut dyn TrainableLayer> {
        Some(self)
    }
}

impl TrainableLayer for Convolution {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}
