//! 2D correlation/convolution primitives and pooling window bookkeeping.
//!
//! Correlation slides the kernel as-is; convolution flips it along both
//! spatial axes first. Out-of-bound positions read as zero padding.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

/// Named padding modes for correlation and convolution.
///
/// Pad amounts are totals per axis, split evenly around the input with the
/// odd remainder at the end. `Amount` carries an explicit `[rows, cols]`
/// total, used by the convolution layer's gradient passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    Valid,
    Same,
    Full,
    Amount([usize; 2]),
}

impl Padding {
    /// Resolves a padding name; unknown names fall back to `Valid`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "same" => Padding::Same,
            "full" => Padding::Full,
            _ => Padding::Valid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Padding::Valid | Padding::Amount(_) => "valid",
            Padding::Same => "same",
            Padding::Full => "full",
        }
    }

    /// The total pad amount per axis for a given kernel size and dilation.
    pub fn amount(&self, kernel: [usize; 2], dilation: [usize; 2]) -> [usize; 2] {
        match *self {
            Padding::Valid => [0, 0],
            Padding::Same => [
                dilation[0] * (kernel[0] - 1),
                dilation[1] * (kernel[1] - 1),
            ],
            Padding::Full => [
                2 * dilation[0] * (kernel[0] - 1),
                2 * dilation[1] * (kernel[1] - 1),
            ],
            Padding::Amount(amount) => amount,
        }
    }
}

/// Spatial output extent of a correlation:
/// `floor((input + pad − dilated_kernel) / stride) + 1` per axis, where
/// `pad` is the total padding on that axis.
pub fn conv_output_shape(
    input: [usize; 2],
    kernel: [usize; 2],
    pad: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
) -> [usize; 2] {
    let mut output = [0; 2];
    for axis in 0..2 {
        let span = dilation[axis] * (kernel[axis] - 1) + 1;
        let padded = input[axis] + pad[axis];
        output[axis] = if padded < span {
            0
        } else {
            (padded - span) / stride[axis] + 1
        };
    }
    output
}

/// 2D cross-correlation with zero padding, per-axis stride and dilation.
pub fn correlate2d(
    input: ArrayView2<f64>,
    kernel: ArrayView2<f64>,
    pad: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
) -> Array2<f64> {
    let (input_rows, input_cols) = input.dim();
    let (kernel_rows, kernel_cols) = kernel.dim();
    let [output_rows, output_cols] = conv_output_shape(
        [input_rows, input_cols],
        [kernel_rows, kernel_cols],
        pad,
        stride,
        dilation,
    );

    let before = [pad[0] / 2, pad[1] / 2];
    let mut output = Array2::zeros((output_rows, output_cols));
    for out_row in 0..output_rows {
        for out_col in 0..output_cols {
            let mut acc = 0.0;
            for i in 0..kernel_rows {
                let row = (out_row * stride[0] + i * dilation[0]) as isize - before[0] as isize;
                if row < 0 || row >= input_rows as isize {
                    continue;
                }
                for j in 0..kernel_cols {
                    let col = (out_col * stride[1] + j * dilation[1]) as isize - before[1] as isize;
                    if col < 0 || col >= input_cols as isize {
                        continue;
                    }
                    acc += input[[row as usize, col as usize]] * kernel[[i, j]];
                }
            }
            output[[out_row, out_col]] = acc;
        }
    }
    output
}

/// 2D convolution: correlation against the kernel flipped along both axes.
pub fn convolve2d(
    input: ArrayView2<f64>,
    kernel: ArrayView2<f64>,
    pad: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
) -> Array2<f64> {
    let mut flipped = kernel.to_owned();
    flipped.invert_axis(Axis(0));
    flipped.invert_axis(Axis(1));
    correlate2d(input, flipped.view(), pad, stride, dilation)
}

/// Trailing pad needed so that strided pooling windows cover the whole
/// input. Zero when `padding` is disabled.
pub fn pool_pad_amount(
    input: [usize; 2],
    padding: bool,
    pool: [usize; 2],
    stride: [usize; 2],
) -> [usize; 2] {
    if !padding {
        return [0, 0];
    }
    let mut pad = [0; 2];
    for axis in 0..2 {
        if input[axis] > pool[axis] {
            let remainder = (input[axis] - pool[axis]) % stride[axis];
            if remainder != 0 {
                pad[axis] = stride[axis] - remainder;
            }
        }
    }
    pad
}

pub fn pool_output_shape(
    input: [usize; 2],
    pad: [usize; 2],
    pool: [usize; 2],
    stride: [usize; 2],
) -> [usize; 2] {
    let mut output = [0; 2];
    for axis in 0..2 {
        let padded = input[axis] + pad[axis];
        output[axis] = if padded < pool[axis] {
            0
        } else {
            (padded - pool[axis]) / stride[axis] + 1
        };
    }
    output
}

/// Max-pools a `[channels, rows, cols]` tensor.
///
/// Returns the pooled tensor together with one coordinate record per
/// selected maximum: `[channel, input_row, input_col, output_row, output_col]`.
/// Windows are clipped to the input bounds, so padded positions never win.
pub fn max_pool3d(
    input: ArrayView3<f64>,
    pool: [usize; 2],
    stride: [usize; 2],
    pad: [usize; 2],
) -> (Array3<f64>, Vec<[usize; 5]>) {
    let (channels, input_rows, input_cols) = input.dim();
    let [output_rows, output_cols] =
        pool_output_shape([input_rows, input_cols], pad, pool, stride);

    let mut output = Array3::zeros((channels, output_rows, output_cols));
    let mut coords = Vec::with_capacity(channels * output_rows * output_cols);

    for channel in 0..channels {
        for out_row in 0..output_rows {
            for out_col in 0..output_cols {
                let mut best = f64::NEG_INFINITY;
                let mut best_at = None;
                for i in 0..pool[0] {
                    let row = out_row * stride[0] + i;
                    if row >= input_rows {
                        break;
                    }
                    for j in 0..pool[1] {
                        let col = out_col * stride[1] + j;
                        if col >= input_cols {
                            break;
                        }
                        let value = input[[channel, row, col]];
                        if value > best {
                            best = value;
                            best_at = Some([row, col]);
                        }
                    }
                }
                if let Some([row, col]) = best_at {
                    output[[channel, out_row, out_col]] = best;
                    coords.push([channel, row, col, out_row, out_col]);
                }
            }
        }
    }

    (output, coords)
}
