//! Tensor operations shared by the layers, losses and optimizers.
//!
//! Everything operates on [`Tensor`], a dynamically-shaped `f64` array.
//! Division helpers follow the "safe division" rule used throughout the
//! crate: a zero or non-finite quotient collapses to zero instead of
//! propagating NaN or infinity.

use ndarray::{ArrayD, Ix1, Ix2, IxDyn};

mod conv;
pub use conv::*;

pub type Tensor = ArrayD<f64>;

pub fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(IxDyn(shape))
}

pub fn filled(shape: &[usize], value: f64) -> Tensor {
    Tensor::from_elem(IxDyn(shape), value)
}

/// Safe scalar division: `0.0` whenever the quotient is not finite.
#[inline]
pub fn safe_div_value(numerator: f64, denominator: f64) -> f64 {
    let quotient = numerator / denominator;
    if quotient.is_finite() {
        quotient
    } else {
        0.0
    }
}

/// Elementwise safe division of two tensors of the same shape.
pub fn safe_div(numerator: &Tensor, denominator: &Tensor) -> Tensor {
    debug_assert_eq!(numerator.shape(), denominator.shape());
    let mut result = numerator.clone();
    result.zip_mut_with(denominator, |n, d| *n = safe_div_value(*n, *d));
    result
}

pub fn safe_div_scalar(tensor: &Tensor, denominator: f64) -> Tensor {
    tensor.mapv(|x| safe_div_value(x, denominator))
}

/// Clamps every element into the `[bounds[0], bounds[1]]` range, in place.
pub fn constrain(tensor: &mut Tensor, bounds: [f64; 2]) {
    tensor.mapv_inplace(|x| x.clamp(bounds[0], bounds[1]));
}

pub fn mean(tensor: &Tensor) -> f64 {
    tensor.mean().unwrap_or(0.0)
}

/// Population variance over the whole tensor.
pub fn variance(tensor: &Tensor) -> f64 {
    let mu = mean(tensor);
    tensor.mapv(|x| (x - mu) * (x - mu)).mean().unwrap_or(0.0)
}

pub fn max_value(tensor: &Tensor) -> f64 {
    tensor.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Matrix-vector product `m · v`, where `m` is `[rows, cols]` and `v` is `[cols]`.
pub fn matvec(matrix: &Tensor, vector: &Tensor) -> Tensor {
    let m = matrix
        .view()
        .into_dimensionality::<Ix2>()
        .expect("matvec: left operand must be 2-dimensional");
    let v = vector
        .view()
        .into_dimensionality::<Ix1>()
        .expect("matvec: right operand must be 1-dimensional");
    m.dot(&v).into_dyn()
}

/// Transposed matrix-vector product `mᵀ · v`, where `m` is `[rows, cols]` and `v` is `[rows]`.
pub fn matvec_transposed(matrix: &Tensor, vector: &Tensor) -> Tensor {
    let m = matrix
        .view()
        .into_dimensionality::<Ix2>()
        .expect("matvec_transposed: left operand must be 2-dimensional");
    let v = vector
        .view()
        .into_dimensionality::<Ix1>()
        .expect("matvec_transposed: right operand must be 1-dimensional");
    m.t().dot(&v).into_dyn()
}

/// Outer product of two vectors: `[rows] × [cols] -> [rows, cols]`.
pub fn outer(rows: &Tensor, cols: &Tensor) -> Tensor {
    let a = rows
        .view()
        .into_dimensionality::<Ix1>()
        .expect("outer: left operand must be 1-dimensional");
    let b = cols
        .view()
        .into_dimensionality::<Ix1>()
        .expect("outer: right operand must be 1-dimensional");
    let a = a.insert_axis(ndarray::Axis(1));
    let b = b.insert_axis(ndarray::Axis(0));
    a.dot(&b).into_dyn()
}
