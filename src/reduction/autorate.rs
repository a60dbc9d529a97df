//! Ensemble exploration of learning-rate scalings.
//!
//! Replays every example `2B + 1` times against disjoint slices of the
//! shared weight vector, scaling the importance weight per replica so each
//! slice effectively trains at a different learning rate. Replica 1 is the
//! unscaled baseline; the rest sweep doublings and halvings:
//!
//! | replica | multiplier |
//! |---------|------------|
//! | 1       | 1          |
//! | 2       | 2          |
//! | 3       | 1/2        |
//! | 4       | 4          |
//! | 5       | 1/4        |
//!
//! Per-replica losses accumulate across the run and the lowest-loss
//! replica is tracked for reporting. The tracked winner is informational
//! only: the prediction and loss surfaced to the caller are always
//! replica 1's.

use std::sync::Arc;

use crate::loss::Loss;
use crate::output::OutputSink;
use crate::types::Example;
use crate::weights::WeightPartition;

use super::Reduction;

/// Importance multiplier for 1-indexed replica `i`.
///
/// Replica 1 is the unscaled baseline. For `i > 1` with `e = i / 2`:
/// even replicas scale by `2^e`, odd replicas by `2^-e`, giving the
/// log-scale sweep {1, 2, 1/2, 4, 1/4, 8, 1/8, ...}.
pub fn weight_gen(i: u32) -> f32 {
    if i == 1 {
        return 1.0;
    }
    let e = (i / 2) as i32;
    if i % 2 == 0 {
        2.0f32.powi(e)
    } else {
        2.0f32.powi(-e)
    }
}

/// Scoped save of the example fields the sweep mutates. Dropping the guard
/// puts the importance weight and the weight-vector offset back, also when
/// a base call unwinds mid-sweep.
struct SweepGuard<'a> {
    ex: &'a mut Example,
    weight: f32,
    offset: u32,
}

impl<'a> SweepGuard<'a> {
    fn begin(ex: &'a mut Example) -> Self {
        let weight = ex.weight;
        let offset = ex.offset;
        Self { ex, weight, offset }
    }

    fn example(&mut self) -> &mut Example {
        self.ex
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.ex.weight = self.weight;
        self.ex.offset = self.offset;
    }
}

/// Reduction exploring `2B + 1` learning-rate scalings in parallel.
pub struct Autorate<B> {
    base: B,
    half_width: u32,
    partition: WeightPartition,
    loss: Arc<dyn Loss>,
    /// Per-call predictions, replica order. Reused across calls.
    pred_vec: Vec<f32>,
    /// Cumulative weighted loss per replica, 0-indexed.
    loss_sums: Vec<f64>,
    weighted_examples: f64,
    /// 1-indexed lowest-loss replica, recomputed per call. Informational.
    best_replica: u32,
    raw_sink: Option<Box<dyn OutputSink>>,
    emit_errors: u64,
    finished: bool,
}

impl<B: Reduction> Autorate<B> {
    /// Wrap `base` with a sweep of `2 * half_width + 1` replicas. The
    /// partition must have been reserved for exactly that replica count.
    pub fn new(
        base: B,
        half_width: u32,
        partition: WeightPartition,
        loss: Arc<dyn Loss>,
        raw_sink: Option<Box<dyn OutputSink>>,
    ) -> Self {
        let replicas = 2 * half_width + 1;
        assert_eq!(
            partition.replicas, replicas,
            "partition reserved {} replicas, sweep needs {}",
            partition.replicas, replicas
        );
        Self {
            base,
            half_width,
            partition,
            loss,
            pred_vec: Vec::with_capacity(replicas as usize),
            loss_sums: vec![0.0; replicas as usize],
            weighted_examples: 0.0,
            best_replica: 1,
            raw_sink,
            emit_errors: 0,
            finished: false,
        }
    }

    pub fn half_width(&self) -> u32 {
        self.half_width
    }

    pub fn replicas(&self) -> u32 {
        2 * self.half_width + 1
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    /// Cumulative weighted loss per replica, 0-indexed.
    pub fn loss_sums(&self) -> &[f64] {
        &self.loss_sums
    }

    /// 1-indexed replica with the lowest cumulative loss so far.
    pub fn best_replica(&self) -> u32 {
        self.best_replica
    }

    fn find_best(&mut self) {
        let mut best = 1u32;
        let mut best_loss = self.loss_sums[0];
        for (idx, &sum) in self.loss_sums.iter().enumerate().skip(1) {
            if sum < best_loss {
                best_loss = sum;
                best = idx as u32 + 1;
            }
        }
        self.best_replica = best;
    }

    /// Run the replica sweep for one example.
    ///
    /// When `should_output` is set, per-replica raw scores are collected
    /// as `"i:partial_prediction"` and emitted to the raw sink; a failed
    /// emit is reported and counted, never fatal.
    pub fn learn_with_output(&mut self, ex: &mut Example, should_output: bool) {
        let weight0 = ex.weight;
        let replicas = self.replicas();
        self.pred_vec.clear();
        let mut raw = String::new();

        {
            let mut sweep = SweepGuard::begin(ex);
            for i in 1..=replicas {
                let ex = sweep.example();
                if i != 1 {
                    // Each replica trains against its own disjoint slice.
                    ex.offset = ex.offset.wrapping_add(self.partition.increment);
                }
                let multiplier = weight_gen(i);
                ex.weight = weight0 * multiplier;

                self.base.learn(ex);

                self.pred_vec.push(ex.prediction);
                if let Some(label) = ex.label {
                    self.loss_sums[(i - 1) as usize] +=
                        f64::from(self.loss.loss(ex.prediction, label) * multiplier);
                }
                if should_output {
                    if i > 1 {
                        raw.push(' ');
                    }
                    raw.push_str(&format!("{}:{}", i, ex.partial_prediction));
                }
            }
        }

        self.weighted_examples += f64::from(weight0);
        self.find_best();

        ex.prediction = self.pred_vec[0];
        ex.loss = match ex.label {
            Some(label) => self.loss.loss(ex.prediction, label) * weight0,
            None => 0.0,
        };

        if should_output {
            if let Some(sink) = self.raw_sink.as_mut() {
                if let Err(err) = sink.emit(&raw, &ex.tag) {
                    eprintln!("warning: raw prediction write failed: {}", err);
                    self.emit_errors += 1;
                }
            }
        }
    }

    /// Per-replica summary of the sweep so far.
    pub fn rate_report(&self) -> String {
        let mut lines = vec![format!(
            "rate sweep: {} replicas over {:.1} weighted examples",
            self.replicas(),
            self.weighted_examples
        )];
        for i in 1..=self.replicas() {
            let sum = self.loss_sums[(i - 1) as usize];
            let mean = if self.weighted_examples > 0.0 {
                sum / self.weighted_examples
            } else {
                0.0
            };
            lines.push(format!(
                "  replica {:>2}  multiplier {:>8.4}  loss sum {:>12.6}  mean {:>10.6}",
                i,
                weight_gen(i),
                sum,
                mean
            ));
        }
        lines.push(format!(
            "  best replica: {} (reported predictions remain replica 1's)",
            self.best_replica
        ));
        lines.join("\n")
    }
}

impl<B: Reduction> Reduction for Autorate<B> {
    fn learn(&mut self, ex: &mut Example) {
        let should_output = self.raw_sink.is_some();
        self.learn_with_output(ex, should_output);
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.base.finish();
        }
    }

    fn report(&self) -> Option<String> {
        Some(self.rate_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::SquaredLoss;
    use crate::weights::StackContext;

    /// Base stub recording (weight, offset) per call and predicting a
    /// fixed value per offset slot.
    #[derive(Debug, Default)]
    struct SweepRecorder {
        calls: Vec<(f32, u32)>,
        finishes: usize,
    }

    impl Reduction for SweepRecorder {
        fn learn(&mut self, ex: &mut Example) {
            self.calls.push((ex.weight, ex.offset));
            // Distinct predictions per slice make replica attribution
            // visible to the assertions.
            ex.prediction = ex.offset as f32 + 1.0;
            ex.partial_prediction = ex.prediction;
        }

        fn finish(&mut self) {
            self.finishes += 1;
        }
    }

    fn partition_for(half_width: u32, stride: u32) -> WeightPartition {
        let mut ctx = StackContext::new(18, stride);
        ctx.reserve(2 * half_width + 1).unwrap()
    }

    fn autorate(half_width: u32, stride: u32) -> Autorate<SweepRecorder> {
        Autorate::new(
            SweepRecorder::default(),
            half_width,
            partition_for(half_width, stride),
            Arc::new(SquaredLoss),
            None,
        )
    }

    fn labeled(label: f32, weight: f32) -> Example {
        let mut ex = Example::new(Some(label), weight);
        ex.push_namespace(0);
        ex.add_feature(0, 1.0, 0);
        ex
    }

    #[test]
    fn test_weight_gen_log_sweep() {
        assert_eq!(weight_gen(1), 1.0);
        assert_eq!(weight_gen(2), 2.0);
        assert_eq!(weight_gen(3), 0.5);
        assert_eq!(weight_gen(4), 4.0);
        assert_eq!(weight_gen(5), 0.25);
        assert_eq!(weight_gen(6), 8.0);
        assert_eq!(weight_gen(7), 0.125);
    }

    #[test]
    fn test_sweep_makes_one_call_per_replica() {
        for half_width in [1u32, 2, 3] {
            let mut rate = autorate(half_width, 1);
            let mut ex = labeled(1.0, 1.0);
            rate.learn(&mut ex);
            assert_eq!(
                rate.base().calls.len(),
                (2 * half_width + 1) as usize,
                "2B+1 base calls for B={}",
                half_width
            );
        }
    }

    #[test]
    fn test_replica_weights_and_offsets() {
        // B=1, weight0=2.0: replicas see weights 2.0*{1, 2, 0.5} at
        // offsets stepped by the partition increment.
        let mut rate = autorate(1, 4);
        let mut ex = labeled(1.0, 2.0);
        rate.learn(&mut ex);

        assert_eq!(
            rate.base().calls,
            vec![(2.0, 0), (4.0, 4), (1.0, 8)],
            "replica weights 2.0*{{1,2,0.5}} against stepped offsets"
        );
    }

    #[test]
    fn test_example_weight_and_offset_restored() {
        let mut rate = autorate(2, 3);
        let mut ex = labeled(1.0, 2.5);
        ex.offset = 7;
        rate.learn(&mut ex);
        assert_eq!(ex.weight, 2.5);
        assert_eq!(ex.offset, 7);
    }

    #[test]
    fn test_reported_prediction_is_replica_one() {
        for half_width in [1u32, 3] {
            let mut rate = autorate(half_width, 2);
            let mut ex = labeled(1.0, 1.0);
            rate.learn(&mut ex);
            // SweepRecorder predicts offset+1; replica 1 runs unshifted.
            assert_eq!(ex.prediction, 1.0);
            assert_eq!(ex.loss, 0.0);
        }
    }

    #[test]
    fn test_loss_sums_accumulate_weighted_losses() {
        let mut rate = autorate(1, 4);
        let mut ex = labeled(1.0, 2.0);
        rate.learn(&mut ex);

        // Predictions per replica: offset+1 = {1, 5, 9}; label 1.
        // Squared losses {0, 16, 64}, scaled by multipliers {1, 2, 0.5}.
        let sums = rate.loss_sums();
        assert!((sums[0] - 0.0).abs() < 1e-9);
        assert!((sums[1] - 32.0).abs() < 1e-6);
        assert!((sums[2] - 32.0).abs() < 1e-6);
        assert_eq!(rate.best_replica(), 1);
    }

    #[test]
    fn test_best_replica_ties_break_low() {
        let mut rate = autorate(1, 4);
        // All replicas predict offset+1; label 7 gives squared losses
        // {36, 4, 4}, scaled by the multipliers to {36, 8, 2}.
        let mut ex = labeled(7.0, 1.0);
        rate.learn(&mut ex);
        assert_eq!(rate.best_replica(), 3);

        // Force an exact tie: stride 0 keeps all replicas on the same
        // slot, and a label equal to the prediction zeroes every loss.
        let mut tied = autorate(1, 0);
        let mut ex = labeled(1.0, 1.0);
        tied.learn(&mut ex);
        assert_eq!(tied.best_replica(), 1, "ties resolve to the lowest index");
    }

    /// Sink sharing its captured lines with the test body.
    #[derive(Clone, Default)]
    struct SharedSink(std::rc::Rc<std::cell::RefCell<Vec<String>>>);

    impl OutputSink for SharedSink {
        fn emit(&mut self, text: &str, tag: &str) -> std::io::Result<()> {
            self.0.borrow_mut().push(format!("{} {}", text, tag));
            Ok(())
        }
    }

    #[test]
    fn test_raw_output_formats_replica_scores() {
        let sink = SharedSink::default();
        let mut rate = Autorate::new(
            SweepRecorder::default(),
            1,
            partition_for(1, 4),
            Arc::new(SquaredLoss),
            Some(Box::new(sink.clone())),
        );
        let mut ex = labeled(1.0, 1.0);
        ex.tag = "t1".into();
        rate.learn(&mut ex);

        // Partial predictions are offset+1 per replica: 1, 5, 9.
        let lines = sink.0.borrow();
        assert_eq!(lines.as_slice(), &["1:1 2:5 3:9 t1".to_string()]);
        assert_eq!(rate.emit_errors, 0);
    }

    #[test]
    fn test_weighted_examples_accumulate_original_weight() {
        let mut rate = autorate(1, 1);
        for _ in 0..3 {
            let mut ex = labeled(1.0, 2.0);
            rate.learn(&mut ex);
        }
        assert!((rate.weighted_examples - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_finish_cascades_once() {
        let mut rate = autorate(1, 1);
        rate.finish();
        rate.finish();
        assert_eq!(rate.base().finishes, 1);
    }

    #[test]
    fn test_rate_report_mentions_every_replica() {
        let mut rate = autorate(2, 1);
        let mut ex = labeled(1.0, 1.0);
        rate.learn(&mut ex);
        let report = rate.rate_report();
        for i in 1..=5 {
            assert!(report.contains(&format!("replica {:>2}", i)));
        }
        assert!(report.contains("best replica"));
    }
}
