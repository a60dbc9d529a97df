//! Innermost optimizer: plain stochastic gradient descent.
//!
//! This is the base of every stack. It owns the shared weight vector and
//! is the only layer that touches weight values directly; everything above
//! it only steers addressing through the example's offset. The update rule
//! is deliberately minimal. The contract the layers above rely on:
//!
//! - every call overwrites `prediction` and `partial_prediction`;
//! - the weight update is skipped entirely when the importance weight is
//!   zero or the label is unknown, so probe calls are repeatable without
//!   moving the model.

use std::sync::Arc;

use crate::loss::Loss;
use crate::types::Example;
use crate::weights::WeightVector;

use super::Reduction;

/// Gradient-descent base learner over the shared weight vector.
pub struct Sgd {
    weights: WeightVector,
    learning_rate: f32,
    loss: Arc<dyn Loss>,
    finished: bool,
}

impl Sgd {
    pub fn new(weights: WeightVector, learning_rate: f32, loss: Arc<dyn Loss>) -> Self {
        Self {
            weights,
            learning_rate,
            loss,
            finished: false,
        }
    }

    /// Read access to the weight vector, mainly for inspection and tests.
    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }
}

impl Reduction for Sgd {
    fn learn(&mut self, ex: &mut Example) {
        let offset = ex.offset;
        let mut pred = 0.0f32;
        for f in ex.iter_features() {
            pred += self.weights.get(f.index.wrapping_add(offset)) * f.value;
        }
        ex.partial_prediction = pred;
        ex.prediction = pred;

        if let Some(label) = ex.label {
            ex.loss = self.loss.loss(pred, label) * ex.weight;
            if ex.weight > 0.0 {
                let step = self.learning_rate * ex.weight * (label - pred);
                for f in ex.iter_features() {
                    self.weights
                        .update(f.index.wrapping_add(offset), step * f.value);
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::SquaredLoss;

    fn sgd(bits: u8, rate: f32) -> Sgd {
        Sgd::new(WeightVector::new(bits), rate, Arc::new(SquaredLoss))
    }

    fn labeled(label: f32, weight: f32) -> Example {
        let mut ex = Example::new(Some(label), weight);
        ex.push_namespace(0);
        ex.add_feature(0, 1.0, 3);
        ex
    }

    #[test]
    fn test_zero_weight_call_is_prediction_only() {
        let mut learner = sgd(8, 0.5);
        let mut ex = labeled(1.0, 0.0);
        learner.learn(&mut ex);
        assert_eq!(ex.prediction, 0.0);
        assert_eq!(learner.weights().get(3), 0.0, "probe must not move weights");
    }

    #[test]
    fn test_unknown_label_skips_update() {
        let mut learner = sgd(8, 0.5);
        let mut ex = labeled(1.0, 1.0);
        ex.label = None;
        learner.learn(&mut ex);
        assert_eq!(learner.weights().get(3), 0.0);
    }

    #[test]
    fn test_update_moves_prediction_toward_label() {
        let mut learner = sgd(8, 0.5);

        let mut ex = labeled(1.0, 1.0);
        learner.learn(&mut ex);
        // err = 1, step = 0.5: the single unit feature gets weight 0.5.
        assert!((learner.weights().get(3) - 0.5).abs() < 1e-6);
        assert!((ex.loss - 1.0).abs() < 1e-6);

        let mut again = labeled(1.0, 1.0);
        learner.learn(&mut again);
        assert!((again.prediction - 0.5).abs() < 1e-6);
        assert!(again.loss < ex.loss);
    }

    #[test]
    fn test_offset_addresses_shifted_slots() {
        let mut learner = sgd(8, 1.0);
        let mut ex = labeled(2.0, 1.0);
        ex.offset = 100;
        learner.learn(&mut ex);
        assert_eq!(learner.weights().get(3), 0.0);
        assert!((learner.weights().get(103) - 2.0).abs() < 1e-6);
    }
}
