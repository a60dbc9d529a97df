//! reduct - an online-learning engine built from composable reductions.
//!
//! A reduction is a small layer that wraps a simpler base learner,
//! reinterprets or augments a shared per-example record, and claims a
//! disjoint slice of one global weight vector, so independently written
//! layers coexist without colliding.
//!
//! # Architecture
//!
//! ```text
//! InputSource → Driver → Reduction stack → prediction sinks + stats
//!                           ↓        ↑
//!                    Autorate (rate sweep over 2B+1 replicas)
//!                           ↓        ↑
//!                    Autolink (polynomial feature augmentation)
//!                           ↓        ↑
//!                    Sgd (owns the WeightVector)
//! ```
//!
//! The hard invariants live at the layer boundaries:
//!
//! - weight-space partitioning: each layer's replicas address ranges
//!   disjoint from every other layer's, computed once at setup;
//! - scoped mutation: any layer that temporarily rewrites the example
//!   (probe labels, synthetic namespaces, offset shifts) restores it on
//!   every exit path, guards enforce this through `Drop`;
//! - call forwarding: exactly one example is in flight, and a layer only
//!   ever talks to the base it owns.

pub mod config;
pub mod driver;
pub mod loss;
pub mod output;
pub mod reduction;
pub mod source;
pub mod stats;
pub mod types;
pub mod weights;

pub use config::{EngineConfig, ModelState};
pub use driver::drive;
pub use loss::{Loss, SquaredLoss};
pub use output::{FileSink, OutputSink, StdoutSink, VecSink};
pub use reduction::{build_stack, weight_gen, Autolink, Autorate, Reduction, Sgd};
pub use source::{InputSource, SyntheticSource, VecSource};
pub use stats::StatsAccumulator;
pub use types::{Example, Feature, NamespaceId, AUGMENT_NAMESPACE, CONSTANT_NAMESPACE};
pub use weights::{StackContext, WeightPartition, WeightVector};
