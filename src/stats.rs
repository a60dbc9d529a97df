//! Run statistics accumulator.
//!
//! One accumulator is created per run, passed by `&mut` into the driver,
//! and flushed at run end. Training and holdout examples are tracked in
//! separate buckets; an example flagged `test_only` contributes its loss
//! to the holdout bucket and never to the training averages.
//!
//! Progress is dumped at doubling example-weight thresholds, so output
//! volume stays logarithmic in stream length.

use crate::types::Example;

/// Accumulated per-run statistics, reset at run start.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    /// Training examples seen.
    pub example_number: u64,
    /// Sum of training importance weights.
    pub weighted_examples: f64,
    /// Sum of weighted training loss.
    pub sum_loss: f64,
    /// Loss accumulated since the last progress dump.
    pub sum_loss_since_last_dump: f64,
    /// Weight accumulated since the last progress dump.
    pub weighted_since_last_dump: f64,
    /// Total features across training examples.
    pub total_features: u64,
    /// Holdout bucket: weight and loss of `test_only` examples.
    pub holdout_examples: f64,
    pub holdout_sum_loss: f64,
    /// Prediction lines that failed to write. Recoverable by contract.
    pub output_errors: u64,

    next_dump: f64,
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self {
            example_number: 0,
            weighted_examples: 0.0,
            sum_loss: 0.0,
            sum_loss_since_last_dump: 0.0,
            weighted_since_last_dump: 0.0,
            total_features: 0,
            holdout_examples: 0.0,
            holdout_sum_loss: 0.0,
            output_errors: 0,
            next_dump: 1.0,
        }
    }
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one processed example into the run totals.
    pub fn record(&mut self, ex: &Example) {
        if ex.test_only {
            self.holdout_examples += f64::from(ex.weight);
            self.holdout_sum_loss += f64::from(ex.loss);
        } else {
            self.example_number += 1;
            self.weighted_examples += f64::from(ex.weight);
            self.sum_loss += f64::from(ex.loss);
            self.sum_loss_since_last_dump += f64::from(ex.loss);
            self.weighted_since_last_dump += f64::from(ex.weight);
            self.total_features += ex.num_features() as u64;
        }
    }

    /// True once per doubling of accumulated example weight.
    pub fn should_dump(&mut self) -> bool {
        if self.weighted_examples >= self.next_dump {
            self.next_dump *= 2.0;
            true
        } else {
            false
        }
    }

    /// One-line progress report for the dump cadence.
    pub fn progress_line(&mut self, ex: &Example) -> String {
        let avg = if self.weighted_examples > 0.0 {
            self.sum_loss / self.weighted_examples
        } else {
            0.0
        };
        let since = if self.weighted_since_last_dump > 0.0 {
            self.sum_loss_since_last_dump / self.weighted_since_last_dump
        } else {
            0.0
        };
        let line = format!(
            "{:>10.6} {:>10.6} {:>10} {:>10.1} {:>10.4} {:>8}",
            avg,
            since,
            self.example_number,
            self.weighted_examples,
            ex.prediction,
            ex.num_features()
        );
        self.sum_loss_since_last_dump = 0.0;
        self.weighted_since_last_dump = 0.0;
        line
    }

    /// Header matching [`progress_line`] columns.
    ///
    /// [`progress_line`]: StatsAccumulator::progress_line
    pub fn progress_header() -> String {
        format!(
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "avg loss", "since last", "examples", "weight", "prediction", "features"
        )
    }

    /// Average training loss per unit weight.
    pub fn average_loss(&self) -> f64 {
        if self.weighted_examples > 0.0 {
            self.sum_loss / self.weighted_examples
        } else {
            0.0
        }
    }

    /// Average holdout loss per unit weight.
    pub fn holdout_average_loss(&self) -> f64 {
        if self.holdout_examples > 0.0 {
            self.holdout_sum_loss / self.holdout_examples
        } else {
            0.0
        }
    }

    /// End-of-run summary, flushed once by the harness.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("examples:         {}", self.example_number),
            format!("weighted total:   {:.1}", self.weighted_examples),
            format!("average loss:     {:.6}", self.average_loss()),
            format!("total features:   {}", self.total_features),
        ];
        if self.holdout_examples > 0.0 {
            lines.push(format!(
                "holdout loss:     {:.6} ({:.1} weighted)",
                self.holdout_average_loss(),
                self.holdout_examples
            ));
        }
        if self.output_errors > 0 {
            lines.push(format!("output errors:    {}", self.output_errors));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(weight: f32, loss: f32, test_only: bool) -> Example {
        let mut ex = Example::new(Some(1.0), weight);
        ex.loss = loss;
        ex.test_only = test_only;
        ex.push_namespace(0);
        ex.add_feature(0, 1.0, 1);
        ex
    }

    #[test]
    fn test_training_and_holdout_buckets_are_separate() {
        let mut stats = StatsAccumulator::new();
        stats.record(&example(2.0, 1.0, false));
        stats.record(&example(1.0, 9.0, true));

        assert_eq!(stats.example_number, 1);
        assert!((stats.weighted_examples - 2.0).abs() < 1e-9);
        assert!((stats.sum_loss - 1.0).abs() < 1e-9);
        assert!((stats.holdout_examples - 1.0).abs() < 1e-9);
        assert!((stats.holdout_sum_loss - 9.0).abs() < 1e-9);
        assert!((stats.average_loss() - 0.5).abs() < 1e-9);
        assert!((stats.holdout_average_loss() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_dump_cadence_doubles() {
        let mut stats = StatsAccumulator::new();
        let mut dumps = 0;
        for _ in 0..16 {
            stats.record(&example(1.0, 0.5, false));
            if stats.should_dump() {
                dumps += 1;
            }
        }
        // Thresholds hit: 1, 2, 4, 8, 16.
        assert_eq!(dumps, 5);
    }

    #[test]
    fn test_progress_line_resets_window() {
        let mut stats = StatsAccumulator::new();
        let ex = example(1.0, 4.0, false);
        stats.record(&ex);
        let _ = stats.progress_line(&ex);
        assert_eq!(stats.sum_loss_since_last_dump, 0.0);
        assert_eq!(stats.weighted_since_last_dump, 0.0);
        // Run totals are untouched by the window reset.
        assert!((stats.sum_loss - 4.0).abs() < 1e-9);
    }
}
