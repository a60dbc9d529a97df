//! Feature augmentation from a base prediction.
//!
//! Wraps a base learner and feeds it its own output: the base model's raw
//! prediction for an example becomes a small polynomial feature block
//! (pred, pred^2, ..., pred^degree) appended to a reserved namespace, and
//! the base is invoked a second time against the augmented example. The
//! first invocation is a probe: label withheld and weight zeroed, so it
//! reads the model without moving it.
//!
//! Both the probe state and the synthetic namespace are applied through
//! guards whose `Drop` restores the example, so the example leaves this
//! layer exactly as it entered on every exit path, unwinds included.

use crate::types::{Example, AUGMENT_NAMESPACE};
use crate::weights::StackContext;

use super::{ProbeGuard, Reduction};

/// Fixed base offset of synthetic feature indices. Large enough to keep
/// the arithmetic progression `AUGMENT_CONSTANT + i * stride` clear of
/// ordinary feature indices.
pub const AUGMENT_CONSTANT: u32 = 524_267_083;

/// Scoped activation of the augmentation namespace. Dropping the guard
/// removes the namespace and its sum-of-squares contribution, also when
/// the base call unwinds.
struct AugmentGuard<'a> {
    ex: &'a mut Example,
}

impl<'a> AugmentGuard<'a> {
    fn push(ex: &'a mut Example) -> Self {
        ex.push_namespace(AUGMENT_NAMESPACE);
        Self { ex }
    }

    fn add_feature(&mut self, value: f32, index: u32) {
        self.ex.add_feature(AUGMENT_NAMESPACE, value, index);
    }

    fn example(&mut self) -> &mut Example {
        self.ex
    }
}

impl Drop for AugmentGuard<'_> {
    fn drop(&mut self) {
        self.ex.remove_namespace(AUGMENT_NAMESPACE);
    }
}

/// Reduction appending powers of the base prediction as features.
pub struct Autolink<B> {
    base: B,
    degree: u32,
    stride: u32,
    finished: bool,
}

impl<B: Reduction> Autolink<B> {
    /// Wrap `base`, synthesizing `degree` polynomial terms per example.
    pub fn new(base: B, degree: u32, ctx: &StackContext) -> Self {
        Self {
            base,
            degree,
            stride: ctx.stride(),
            finished: false,
        }
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn base(&self) -> &B {
        &self.base
    }
}

impl<B: Reduction> Reduction for Autolink<B> {
    fn learn(&mut self, ex: &mut Example) {
        // Zero terms to synthesize: the probe would be pure overhead.
        if self.degree == 0 {
            self.base.learn(ex);
            return;
        }

        {
            let mut probe = ProbeGuard::begin(ex);
            self.base.learn(probe.example());
        }
        let base_pred = ex.prediction;

        let mut augment = AugmentGuard::push(ex);
        if base_pred != 0.0 {
            let mut value = base_pred;
            for i in 0..self.degree {
                augment.add_feature(value, AUGMENT_CONSTANT.wrapping_add(i * self.stride));
                value *= base_pred;
            }
        }
        self.base.learn(augment.example());
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.base.finish();
        }
    }

    fn report(&self) -> Option<String> {
        self.base.report()
    }
}
