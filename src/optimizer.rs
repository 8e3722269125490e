//! Gradient-descent update rules.
//!
//! An [`Optimizer`] is a pure function of the accumulated gradient, the
//! per-parameter [`OptimizerState`] and the batch counter. Each trainable
//! layer owns one state instance per parameter tensor, so running
//! statistics are never shared across parameters or layers.

use serde::{Deserialize, Serialize};

use crate::algebra::{self, Tensor};

/// Running optimizer statistics for one parameter tensor.
///
/// Slot 0 holds momentum-style state, slot 1 second-moment state; both are
/// zeroed whenever the parameter is reshaped. The live gradient accumulator
/// is passed alongside at apply time.
#[derive(Clone, Debug)]
pub struct OptimizerState {
    pub slots: [Tensor; 2],
}

impl OptimizerState {
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            slots: [algebra::zeros(shape), algebra::zeros(shape)],
        }
    }
}

/// Named persisted form: `{ "name": ..., "args": [...] }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerRecord {
    pub name: String,
    #[serde(default)]
    pub args: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Optimizer {
    Sgd {
        learning_rate: f64,
    },
    Momentum {
        learning_rate: f64,
        momentum: f64,
    },
    RmsProp {
        learning_rate: f64,
        momentum: f64,
        epsilon: f64,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
}

impl Optimizer {
    pub fn sgd(learning_rate: f64) -> Self {
        Self::Sgd { learning_rate }
    }

    pub fn momentum(learning_rate: f64, momentum: f64) -> Self {
        Self::Momentum {
            learning_rate,
            momentum,
        }
    }

    pub fn rmsprop(learning_rate: f64, momentum: f64, epsilon: f64) -> Self {
        Self::RmsProp {
            learning_rate,
            momentum,
            epsilon,
        }
    }

    pub fn adam(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        }
    }

    /// Rebuilds an optimizer from its persisted record. Missing arguments
    /// take the documented defaults; an unknown name falls back to
    /// `sgd(0.1)`.
    pub fn from_record(record: &OptimizerRecord) -> Self {
        let arg = |i: usize, default: f64| record.args.get(i).copied().unwrap_or(default);
        match record.name.as_str() {
            "sgd" => Self::sgd(arg(0, 0.1)),
            "momentum" => Self::momentum(arg(0, 0.1), arg(1, 0.9)),
            "rmsprop" => Self::rmsprop(arg(0, 0.01), arg(1, 0.9), arg(2, 1e-7)),
            "adam" => Self::adam(arg(0, 0.1), arg(1, 0.9), arg(2, 0.999), arg(3, 1e-7)),
            _ => Self::sgd(0.1),
        }
    }

    pub fn record(&self) -> OptimizerRecord {
        let (name, args) = match *self {
            Self::Sgd { learning_rate } => ("sgd", vec![learning_rate]),
            Self::Momentum {
                learning_rate,
                momentum,
            } => ("momentum", vec![learning_rate, momentum]),
            Self::RmsProp {
                learning_rate,
                momentum,
                epsilon,
            } => ("rmsprop", vec![learning_rate, momentum, epsilon]),
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => ("adam", vec![learning_rate, beta1, beta2, epsilon]),
        };
        OptimizerRecord {
            name: name.to_string(),
            args,
        }
    }

    /// Computes the parameter delta to subtract, updating the running
    /// statistics in place. `index` is the orchestrator's batch counter,
    /// used for bias correction.
    pub fn apply(&self, gradient: &Tensor, state: &mut OptimizerState, index: usize) -> Tensor {
        match *self {
            Self::Sgd { learning_rate } => gradient * learning_rate,
            Self::Momentum {
                learning_rate,
                momentum,
            } => {
                state.slots[0] = &state.slots[0] * momentum + gradient * (1.0 - momentum);
                &state.slots[0] * learning_rate
            }
            Self::RmsProp {
                learning_rate,
                momentum,
                epsilon,
            } => {
                state.slots[1] = &state.slots[1] * momentum
                    + gradient.mapv(|g| g * g) * (1.0 - momentum);
                let scale = state.slots[1].mapv(|s| (s + epsilon).sqrt());
                algebra::safe_div(gradient, &scale) * learning_rate
            }
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                state.slots[0] = &state.slots[0] * beta1 + gradient * (1.0 - beta1);
                state.slots[1] =
                    &state.slots[1] * beta2 + gradient.mapv(|g| g * g) * (1.0 - beta2);

                let first_correction = 1.0 - beta1.powi(index as i32);
                let second_correction = 1.0 - beta2.powi(index as i32);
                let corrected_momentum =
                    algebra::safe_div_scalar(&state.slots[0], first_correction);
                let corrected_rms = algebra::safe_div_scalar(&state.slots[1], second_correction);

                let scale = corrected_rms.mapv(|s| (s + epsilon).sqrt());
                algebra::safe_div(&corrected_momentum, &scale) * learning_rate
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
    fn test_sgd_law() {
        let gradient = arr1(&[2.0, -1.0]).into_dyn();
        let mut state = OptimizerState::zeros(&[2]);

        let delta = Optimizer::sgd(0.1).apply(&gradient, &mut state, 1);
        assert_eq!(delta, arr1(&[0.2, -0.1]).into_dyn());
        // Plain gradient descent carries no state.
        assert!(state.slots[0].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_momentum_first_call_law() {
        let gradient = arr1(&[1.0]).into_dyn();
        let mut state = OptimizerState::zeros(&[1]);
        let optimizer = Optimizer::momentum(0.1, 0.9);

        let delta = optimizer.apply(&gradient, &mut state, 1);
        assert_approx!(delta[[0]], 1.0 * (1.0 - 0.9) * 0.1, 1e-12);

        // Second identical call compounds the running average.
        let delta = optimizer.apply(&gradient, &mut state, 2);
        assert_approx!(delta[[0]], (0.1 * 0.9 + 0.1) * 0.1, 1e-12);
    }

    #[test]
    fn test_rmsprop_first_call() {
        let gradient = arr1(&[2.0]).into_dyn();
        let mut state = OptimizerState::zeros(&[1]);

        let delta = Optimizer::rmsprop(0.01, 0.9, 1e-7).apply(&gradient, &mut state, 1);
        let expected = 0.01 * 2.0 / (4.0 * 0.1 + 1e-7f64).sqrt();
        assert_approx!(delta[[0]], expected, 1e-12);
    }

    #[test]
    fn test_adam_first_call_bias_correction() {
        let gradient = arr1(&[1.0]).into_dyn();
        let mut state = OptimizerState::zeros(&[1]);

        let delta = Optimizer::adam(0.1, 0.9, 0.999, 1e-7).apply(&gradient, &mut state, 1);
        // Bias correction makes the first step approximately the learning rate.
        assert_approx!(delta[[0]], 0.1, 1e-3);
    }

    #[test]
    fn test_state_instances_are_independent() {
        let gradient = arr1(&[1.0]).into_dyn();
        let mut weights_state = OptimizerState::zeros(&[1]);
        let mut bias_state = OptimizerState::zeros(&[1]);
        let optimizer = Optimizer::momentum(0.1, 0.9);

        optimizer.apply(&gradient, &mut weights_state, 1);
        assert_approx!(weights_state.slots[0][[0]], 0.1, 1e-12);
        assert!(bias_state.slots[0][[0]] == 0.0);
    }

    #[test]
    fn test_unknown_record_defaults_to_sgd() {
        let record = OptimizerRecord {
            name: "adagrad".to_string(),
            args: vec![],
        };
        assert_eq!(Optimizer::from_record(&record), Optimizer::sgd(0.1));
    }

    #[test]
    fn test_record_round_trip() {
        let optimizer = Optimizer::adam(0.01, 0.9, 0.999, 1e-8);
        let restored = Optimizer::from_record(&optimizer.record());
        assert_eq!(optimizer, restored);
    }
}
