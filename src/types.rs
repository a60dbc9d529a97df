//! Core types for reduct - the shared example record and its invariants.
//!
//! An [`Example`] is one learning instance. It is created by an input
//! source, threaded by `&mut` through the whole reduction stack for the
//! duration of a single `learn` call, and dropped by the driver afterwards.
//! No reduction retains it across calls.
//!
//! Key design decisions:
//! - Features live in numbered namespaces; an ordered `active` list decides
//!   which namespaces contribute to the prediction.
//! - `total_sum_feat_sq` is kept consistent with namespace content by
//!   construction: every feature add/remove goes through `Example` methods
//!   that update the running sums atomically.
//! - `label` is an `Option`; `None` is the "unknown" sentinel used by
//!   prediction-only probe calls.

use std::collections::BTreeMap;

/// Small integer id addressing one feature namespace within an example.
pub type NamespaceId = u8;

/// Namespace reserved for the constant (bias) feature.
pub const CONSTANT_NAMESPACE: NamespaceId = 128;

/// Namespace reserved for features synthesized from a base prediction.
/// Must not collide with any namespace used by ordinary features.
pub const AUGMENT_NAMESPACE: NamespaceId = 130;

/// Weight index of the constant feature.
pub const CONSTANT_INDEX: u32 = 11_650_396;

/// One (value, weight index) feature pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub value: f32,
    pub index: u32,
}

/// An ordered bucket of features plus its own sum of squared values.
#[derive(Debug, Clone, Default)]
struct Namespace {
    features: Vec<Feature>,
    sum_feat_sq: f32,
}

/// One learning instance, shared by reference across the active stack.
///
/// The scalar fields are freely readable and writable by reductions; the
/// namespace storage is private so the running sum-of-squares invariant
/// cannot be broken from outside.
#[derive(Debug, Clone, Default)]
pub struct Example {
    /// Target value. `None` marks a prediction-only probe.
    pub label: Option<f32>,
    /// Importance weight. Mutated temporarily during rate exploration.
    pub weight: f32,
    /// Identifier echoed on prediction output lines.
    pub tag: String,
    /// Scalar prediction, written by the innermost optimizer and
    /// overwritable by every enclosing reduction.
    pub prediction: f32,
    /// Raw linear score before any post-processing.
    pub partial_prediction: f32,
    /// Weighted loss of the reported prediction.
    pub loss: f32,
    /// Per-call base offset into the shared weight vector. Reductions that
    /// shift it must restore it before returning.
    pub offset: u32,
    /// Holdout flag: the example counts toward holdout statistics and the
    /// driver feeds it through with zero update weight.
    pub test_only: bool,

    namespaces: BTreeMap<NamespaceId, Namespace>,
    active: Vec<NamespaceId>,
    total_sum_feat_sq: f32,
}

impl Example {
    /// Create an empty example with the given label and importance weight.
    pub fn new(label: Option<f32>, weight: f32) -> Self {
        Self {
            label,
            weight,
            ..Self::default()
        }
    }

    /// Activate a namespace. Panics if it is already active: a collision
    /// here means two stack layers claimed the same namespace id, which
    /// would silently corrupt feature bookkeeping.
    pub fn push_namespace(&mut self, id: NamespaceId) {
        assert!(
            !self.active.contains(&id),
            "namespace {} is already active",
            id
        );
        self.namespaces.insert(id, Namespace::default());
        self.active.push(id);
    }

    /// Append a feature to an active namespace, updating the per-namespace
    /// and total sums of squares in the same step.
    pub fn add_feature(&mut self, id: NamespaceId, value: f32, index: u32) {
        assert!(self.active.contains(&id), "namespace {} is not active", id);
        let ns = self
            .namespaces
            .get_mut(&id)
            .unwrap_or_else(|| panic!("namespace {} has no storage", id));
        ns.features.push(Feature { value, index });
        let sq = value * value;
        ns.sum_feat_sq += sq;
        self.total_sum_feat_sq += sq;
    }

    /// Deactivate a namespace, removing its features and subtracting its
    /// sum of squares back out of the running total.
    pub fn remove_namespace(&mut self, id: NamespaceId) {
        let pos = self
            .active
            .iter()
            .position(|&n| n == id)
            .unwrap_or_else(|| panic!("namespace {} is not active", id));
        self.active.remove(pos);
        if let Some(ns) = self.namespaces.remove(&id) {
            self.total_sum_feat_sq -= ns.sum_feat_sq;
        }
    }

    /// Ordered list of namespaces currently contributing to the prediction.
    pub fn active_namespaces(&self) -> &[NamespaceId] {
        &self.active
    }

    /// Features of one namespace, or `None` if it is not present.
    pub fn features(&self, id: NamespaceId) -> Option<&[Feature]> {
        self.namespaces.get(&id).map(|ns| ns.features.as_slice())
    }

    /// Sum of squared feature values of one namespace.
    pub fn sum_feat_sq(&self, id: NamespaceId) -> f32 {
        self.namespaces.get(&id).map_or(0.0, |ns| ns.sum_feat_sq)
    }

    /// Running sum of squared feature values over all active namespaces.
    pub fn total_sum_feat_sq(&self) -> f32 {
        self.total_sum_feat_sq
    }

    /// Iterate features of all active namespaces in activation order.
    pub fn iter_features(&self) -> impl Iterator<Item = &Feature> {
        self.active
            .iter()
            .filter_map(|id| self.namespaces.get(id))
            .flat_map(|ns| ns.features.iter())
    }

    /// Total feature count across active namespaces.
    pub fn num_features(&self) -> usize {
        self.active
            .iter()
            .filter_map(|id| self.namespaces.get(id))
            .map(|ns| ns.features.len())
            .sum()
    }
}
