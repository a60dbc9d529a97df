//! The reduction stack: composable layers around a base learner.
//!
//! A reduction wraps a simpler base learner, transforming the example or
//! the weight-space addressing before and after delegating. Stacks are
//! wired bottom-up at setup:
//!
//! ```text
//! Autorate (rate sweep) ─┐
//!   Autolink (augment) ──┤  strict ownership chain, no sharing
//!     Sgd (optimizer) ───┘  owns the weight vector
//! ```
//!
//! Control flows down through nested `base.learn()` calls; the innermost
//! optimizer fills in a prediction; each layer, unwinding outward, may
//! post-process it, temporarily mutate the example, and re-invoke its
//! base. Every layer restores whatever example state it touched before
//! returning, guard-enforced, so layers compose without coordination.

pub mod autolink;
pub mod autorate;
pub mod sgd;

pub use autolink::{Autolink, AUGMENT_CONSTANT};
pub use autorate::{weight_gen, Autorate};
pub use sgd::Sgd;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{EngineConfig, ModelState};
use crate::loss::{Loss, SquaredLoss};
use crate::output::OutputSink;
use crate::types::Example;
use crate::weights::{StackContext, WeightVector};

/// One layer of the learning stack.
pub trait Reduction {
    /// Process one example end to end, updating the model and writing the
    /// reported prediction and loss back into the example.
    fn learn(&mut self, ex: &mut Example);

    /// Prediction-only pass: the example's label is withheld and its
    /// weight zeroed for the duration, so no layer updates its model.
    fn predict(&mut self, ex: &mut Example) {
        let mut probe = ProbeGuard::begin(ex);
        self.learn(probe.example());
    }

    /// Release owned state, cascading to the base. Calling twice is safe;
    /// the second call is a no-op.
    fn finish(&mut self);

    /// End-of-run diagnostic report, if this layer keeps one. Wrapping
    /// layers forward their base's report when they have none.
    fn report(&self) -> Option<String> {
        None
    }
}

/// Scoped "prediction only" view of an example: the label is taken and
/// the importance weight zeroed while the guard lives. Dropping it puts
/// both back, also when the guarded call unwinds.
pub struct ProbeGuard<'a> {
    ex: &'a mut Example,
    label: Option<f32>,
    weight: f32,
}

impl<'a> ProbeGuard<'a> {
    pub fn begin(ex: &'a mut Example) -> Self {
        let label = ex.label.take();
        let weight = std::mem::replace(&mut ex.weight, 0.0);
        Self { ex, label, weight }
    }

    pub fn example(&mut self) -> &mut Example {
        self.ex
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.ex.label = self.label;
        self.ex.weight = self.weight;
    }
}

/// Wire a stack from configuration: Sgd at the bottom, then the optional
/// augmentation layer, then the optional rate-exploration layer.
///
/// Reduction parameters stored with the model take precedence over the
/// freshly configured ones (see [`ModelState::resolve_count`]); freshly
/// supplied parameters are recorded for later runs. Weight-space
/// reservations happen here, bottom-up, and fail hard if the configured
/// capacity cannot hold the stack.
pub fn build_stack(
    config: &EngineConfig,
    model: &mut ModelState,
    raw_sink: Option<Box<dyn OutputSink>>,
) -> Result<Box<dyn Reduction>> {
    let degree = model.resolve_count("autolink", config.autolink);
    let half_width = model.resolve_count("autorate", config.autorate);

    let mut ctx = StackContext::new(config.bits, 1);
    let loss: Arc<dyn Loss> = Arc::new(SquaredLoss);
    let sgd = Sgd::new(
        WeightVector::new(config.bits),
        config.learning_rate,
        Arc::clone(&loss),
    );

    match (degree, half_width) {
        (None, None) => Ok(Box::new(sgd)),
        (Some(d), None) => Ok(Box::new(Autolink::new(sgd, d, &ctx))),
        (None, Some(b)) => {
            let partition = ctx.reserve(2 * b + 1)?;
            Ok(Box::new(Autorate::new(sgd, b, partition, loss, raw_sink)))
        }
        (Some(d), Some(b)) => {
            let link = Autolink::new(sgd, d, &ctx);
            let partition = ctx.reserve(2 * b + 1)?;
            Ok(Box::new(Autorate::new(link, b, partition, loss, raw_sink)))
        }
    }
}
