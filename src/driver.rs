//! The driving loop: one example at a time through the whole stack.
//!
//! Strictly single-example, sequential. The source may be transiently
//! empty (nothing parsed yet), in which case the driver idles and retries;
//! the run ends only when the source reports exhaustion. Holdout examples
//! go through a prediction-only pass and contribute to holdout statistics
//! instead of training averages.
//!
//! Prediction output failures are recoverable: each is reported to stderr
//! and counted, and the run continues.

use crate::loss::Loss;
use crate::output::OutputSink;
use crate::reduction::Reduction;
use crate::source::InputSource;
use crate::stats::StatsAccumulator;
use crate::types::Example;

/// Pull, learn, emit, release, until the source is exhausted.
pub fn drive(
    source: &mut dyn InputSource,
    stack: &mut dyn Reduction,
    loss: &dyn Loss,
    stats: &mut StatsAccumulator,
    sinks: &mut [Box<dyn OutputSink>],
    show_progress: bool,
) {
    loop {
        match source.next_example() {
            Some(mut ex) => {
                if ex.test_only {
                    stack.predict(&mut ex);
                    // The probe zeroed the weighted loss; rebuild it for
                    // the holdout bucket.
                    if let Some(label) = ex.label {
                        ex.loss = loss.loss(ex.prediction, label) * ex.weight;
                    }
                } else {
                    stack.learn(&mut ex);
                }
                output_example(&ex, stats, sinks);
                if show_progress && stats.should_dump() {
                    eprintln!("{}", stats.progress_line(&ex));
                }
            }
            None if source.is_exhausted() => return,
            // Transiently empty: more input may still arrive.
            None => continue,
        }
    }
}

/// Emit the reported prediction and fold the example into the run stats.
fn output_example(ex: &Example, stats: &mut StatsAccumulator, sinks: &mut [Box<dyn OutputSink>]) {
    stats.record(ex);
    for sink in sinks.iter_mut() {
        if let Err(err) = sink.emit(&format!("{:.6}", ex.prediction), &ex.tag) {
            eprintln!("warning: prediction write failed: {}", err);
            stats.output_errors += 1;
        }
    }
}
