//! reduct CLI - train a reduction stack on a synthetic example stream.
//!
//! This is the command-line harness around the library. It assembles the
//! stack from flags plus `reduct.toml`, replays any parameters stored with
//! a model side-channel file, then drives the single-threaded pull loop:
//!
//! 1. Configuration: file defaults, CLI overrides, stored model values
//! 2. Stack wiring: Sgd, optional Autolink, optional Autorate
//! 3. Driving: pull an example, learn, emit predictions and stats
//! 4. Teardown: summary, diagnostic reports, model side-channel save
//!
//! Design philosophy mirrors the library: fail hard at setup (a bad stack
//! would corrupt weight slices), stay recoverable at runtime (a dead
//! prediction sink never kills a training run).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use reduct::{
    build_stack, drive, EngineConfig, FileSink, ModelState, OutputSink, SquaredLoss,
    StatsAccumulator, StdoutSink, SyntheticSource,
};

/// Online-learning engine built from composable reductions
///
/// Trains a gradient-descent base learner, optionally wrapped in
/// polynomial feature augmentation (--autolink) and a parallel sweep of
/// learning-rate scalings (--autorate), over a deterministic synthetic
/// regression stream.
///
/// Examples:
///   reduct --examples 100000                    # plain SGD baseline
///   reduct --autolink 2                         # quadratic augmentation
///   reduct --autorate 3 -v                      # 7-replica rate sweep
///   reduct --model run.json --autorate 2        # persist stack shape
#[derive(Parser, Debug)]
#[command(name = "reduct")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    /// Number of synthetic examples to stream
    #[arg(short = 'n', long, default_value = "10000")]
    pub examples: u64,

    /// Seed for the synthetic stream
    ///
    /// The stream is fully deterministic per seed: the hidden linear
    /// model, feature draws, and noise all replay identically.
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Feature dimensions of the synthetic stream
    #[arg(long, default_value = "8")]
    pub dim: usize,

    /// Label noise amplitude
    #[arg(long, default_value = "0.1")]
    pub noise: f32,

    /// Flag every N-th example as holdout (0 disables)
    ///
    /// Holdout examples are scored with a prediction-only pass and
    /// tracked in a separate loss bucket.
    #[arg(long, default_value = "0")]
    pub holdout_every: u64,

    /// log2 of the weight-vector capacity
    ///
    /// Overrides the [engine] table in reduct.toml. Every reduction
    /// reserves its replica slices out of this capacity at setup.
    #[arg(short = 'b', long)]
    pub bits: Option<u8>,

    /// Base learning rate of the innermost optimizer
    #[arg(short = 'l', long)]
    pub learning_rate: Option<f32>,

    /// Polynomial terms synthesized from the base prediction
    ///
    /// Enables the augmentation reduction: d powers of the base model's
    /// prediction are appended as features and the base is re-invoked.
    #[arg(long, value_name = "D")]
    pub autolink: Option<u32>,

    /// Half-width of the learning-rate sweep
    ///
    /// Enables the rate-exploration reduction: every example is replayed
    /// against 2B+1 disjoint weight slices with importance multipliers
    /// {1, 2, 1/2, 4, 1/4, ...}. Replica 1 is what gets reported.
    #[arg(long, value_name = "B")]
    pub autorate: Option<u32>,

    /// Model side-channel file (JSON key/value)
    ///
    /// Reduction parameters stored here win over conflicting flags, so a
    /// resumed run replays the exact stack shape it was trained with.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Write per-example predictions to this file ("-" for stdout)
    #[arg(short = 'p', long)]
    pub predictions: Option<PathBuf>,

    /// Write per-replica raw scores to this file (needs --autorate)
    #[arg(long)]
    pub raw_predictions: Option<PathBuf>,

    /// Show progress lines and diagnostic reports
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(summary) => println!("{}", summary),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<String> {
    use std::time::Instant;

    let start = Instant::now();

    // ══════════════════════════════════════════════════════════════════
    // Stage 1: Configuration
    // ══════════════════════════════════════════════════════════════════
    let cwd = std::env::current_dir().context("resolving working directory")?;
    let mut config = EngineConfig::load(&cwd);
    if let Some(bits) = cli.bits {
        config.bits = bits;
    }
    if let Some(rate) = cli.learning_rate {
        config.learning_rate = rate;
    }
    if cli.autolink.is_some() {
        config.autolink = cli.autolink;
    }
    if cli.autorate.is_some() {
        config.autorate = cli.autorate;
    }

    let mut model = match &cli.model {
        Some(path) => ModelState::load(path)?,
        None => ModelState::default(),
    };

    if cli.verbose {
        eprintln!("reduct v{}", env!("CARGO_PKG_VERSION"));
        eprintln!(
            "weights: 2^{} slots, learning rate {}",
            config.bits, config.learning_rate
        );
    }

    // ══════════════════════════════════════════════════════════════════
    // Stage 2: Stack wiring
    // ══════════════════════════════════════════════════════════════════
    let raw_sink: Option<Box<dyn OutputSink>> = match &cli.raw_predictions {
        Some(path) => Some(Box::new(
            FileSink::create(path)
                .with_context(|| format!("creating raw sink {}", path.display()))?,
        )),
        None => None,
    };

    let mut stack = build_stack(&config, &mut model, raw_sink)?;

    if cli.verbose {
        let shape = match (config.autolink, config.autorate) {
            (None, None) => "sgd".to_string(),
            (Some(d), None) => format!("autolink({}) > sgd", d),
            (None, Some(b)) => format!("autorate({}) > sgd", b),
            (Some(d), Some(b)) => format!("autorate({}) > autolink({}) > sgd", b, d),
        };
        eprintln!("stack: {}", shape);
    }

    // ══════════════════════════════════════════════════════════════════
    // Stage 3: Driving
    // ══════════════════════════════════════════════════════════════════
    let mut source = SyntheticSource::new(
        cli.seed,
        cli.examples,
        cli.dim,
        cli.noise,
        cli.holdout_every,
    );

    let mut sinks: Vec<Box<dyn OutputSink>> = Vec::new();
    if let Some(path) = &cli.predictions {
        if path.as_os_str() == "-" {
            sinks.push(Box::new(StdoutSink));
        } else {
            sinks.push(Box::new(FileSink::create(path).with_context(|| {
                format!("creating prediction sink {}", path.display())
            })?));
        }
    }

    let mut stats = StatsAccumulator::new();
    if cli.verbose {
        eprintln!("{}", StatsAccumulator::progress_header());
    }

    drive(
        &mut source,
        &mut *stack,
        &SquaredLoss,
        &mut stats,
        &mut sinks,
        cli.verbose,
    );

    // ══════════════════════════════════════════════════════════════════
    // Stage 4: Teardown
    // ══════════════════════════════════════════════════════════════════
    if cli.verbose {
        if let Some(report) = stack.report() {
            eprintln!("{}", report);
        }
    }
    stack.finish();

    if let Some(path) = &cli.model {
        model.save(path)?;
        if cli.verbose {
            eprintln!("model state saved to {}", path.display());
        }
    }

    let mut summary = stats.summary();
    summary.push_str(&format!("\nelapsed:          {:.2?}", start.elapsed()));
    Ok(summary)
}
