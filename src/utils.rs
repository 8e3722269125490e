use rand::Rng;

use crate::algebra::Tensor;

/// Shuffles `inputs` and `targets` with the same permutation, keeping the
/// pairing between them intact.
pub fn shuffle_pairs(inputs: &mut [Tensor], targets: &mut [Tensor], rng: &mut impl Rng) {
    debug_assert_eq!(inputs.len(), targets.len());

    // Fisher-Yates over both slices in lockstep
    for i in (1..inputs.len()).rev() {
        let j = rng.gen_range(0..=i);
        inputs.swap(i, j);
        targets.swap(i, j);
    }
}

pub fn argmax(array: &[f64]) -> usize {
    let mut res = 0;

    for n in 1..array.len() {
        if array[n] > array[res] {
            res = n;
        }
    }

    res
}

pub fn one_hot(value: usize, length: usize) -> Tensor {
    let mut res = crate::algebra::zeros(&[length]);
    if value < length {
        res[[value]] = 1.0;
    }
    res
}

#[macro_export]
macro_rules! assert_approx {
    ( $left:expr, $right:expr, $epsilon:expr ) => {
        let left = $left;
        let right = $right;
        if ((left - right) as f64).abs() >= $epsilon as f64 {
            panic!("Expected {} to be approximately equal to {}", left, right);
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[3.0]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_one_hot() {
        let hot = one_hot(2, 4);
        assert_eq!(hot.shape(), &[4]);
        assert_eq!(hot[[2]], 1.0);
        assert_eq!(hot.sum(), 1.0);

        // Out-of-range values produce an all-zero vector.
        assert_eq!(one_hot(9, 4).sum(), 0.0);
    }

    #[test]
    fn test_shuffle_pairs_keeps_pairing() {
        let mut rng = rand::thread_rng();
        let mut inputs: Vec<Tensor> =
            (0..16).map(|i| crate::algebra::filled(&[1], i as f64)).collect();
        let mut targets: Vec<Tensor> =
            (0..16).map(|i| crate::algebra::filled(&[1], i as f64 * 10.0)).collect();

        shuffle_pairs(&mut inputs, &mut targets, &mut rng);

        for (input, target) in inputs.iter().zip(&targets) {
            assert_eq!(input[[0]] * 10.0, target[[0]]);
        }
    }
}
