//! Shared weight vector and weight-space partitioning.
//!
//! The whole stack shares one flat weight vector. Layers that train several
//! hypotheses in parallel get a per-layer offset step (the "increment")
//! computed at setup time, so each replica addresses a slice disjoint from
//! every other replica's and from the base model's own indices. That
//! disjointness is the central correctness property of the architecture:
//! a collision would silently poison all subsequent learning.
//!
//! Addressing is `(index + offset) & mask` with a power-of-two capacity,
//! so any index is in bounds by construction; disjointness of the ranges
//! layers reserve is checked once at setup and is a hard error if the
//! capacity cannot hold them.

use anyhow::{bail, Result};

/// Flat weight storage with power-of-two capacity and mask addressing.
#[derive(Debug, Clone)]
pub struct WeightVector {
    weights: Vec<f32>,
    mask: u32,
}

impl WeightVector {
    /// Allocate `1 << bits` weights, all zero.
    pub fn new(bits: u8) -> Self {
        let len = 1usize << bits;
        Self {
            weights: vec![0.0; len],
            mask: (len - 1) as u32,
        }
    }

    pub fn capacity(&self) -> usize {
        self.weights.len()
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Read the weight slot addressed by `index` (masked into range).
    pub fn get(&self, index: u32) -> f32 {
        self.weights[(index & self.mask) as usize]
    }

    /// Add `delta` to the slot addressed by `index`.
    pub fn update(&mut self, index: u32, delta: f32) {
        self.weights[(index & self.mask) as usize] += delta;
    }
}

/// Per-reduction weight-space reservation, created once at setup and
/// immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightPartition {
    /// Weights consumed per base hypothesis, inherited from the layer below.
    pub stride: u32,
    /// Parallel hypotheses this layer trains.
    pub replicas: u32,
    /// Offset step between consecutive replicas.
    pub increment: u32,
    /// Cumulative shift after visiting every replica: `increment * (replicas - 1)`.
    pub total_increment: u32,
}

impl WeightPartition {
    /// Half-open offset range addressed by 1-indexed `replica`.
    ///
    /// Replica 1 trains at the unshifted base offset; replica i is shifted
    /// by `(i - 1) * increment`. Ranges of distinct replicas never overlap.
    pub fn replica_range(&self, replica: u32) -> std::ops::Range<u32> {
        assert!(
            replica >= 1 && replica <= self.replicas,
            "replica {} out of range 1..={}",
            replica,
            self.replicas
        );
        let start = (replica - 1) * self.increment;
        start..start + self.increment
    }
}

/// Setup-time accounting of how much of the weight vector the stack has
/// claimed. Each layer that needs parallel hypotheses calls [`reserve`]
/// exactly once, bottom-up, and keeps the returned partition.
///
/// [`reserve`]: StackContext::reserve
#[derive(Debug, Clone)]
pub struct StackContext {
    stride: u32,
    weights_per_problem: u32,
    capacity: u32,
}

impl StackContext {
    /// Start accounting for a weight vector of `1 << bits` slots and the
    /// given base-model stride.
    pub fn new(bits: u8, stride: u32) -> Self {
        Self {
            stride,
            weights_per_problem: 1,
            capacity: 1u32 << bits,
        }
    }

    /// Weights consumed per hypothesis at the current stack depth.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Product of replica counts reserved so far.
    pub fn weights_per_problem(&self) -> u32 {
        self.weights_per_problem
    }

    /// Reserve `replicas` parallel hypotheses for the layer being wired.
    ///
    /// Fails if the weight vector cannot hold the cumulative reservation;
    /// proceeding would alias another layer's slice.
    pub fn reserve(&mut self, replicas: u32) -> Result<WeightPartition> {
        let increment = self.stride * self.weights_per_problem;
        let claimed = self
            .weights_per_problem
            .checked_mul(replicas)
            .and_then(|w| w.checked_mul(self.stride));
        match claimed {
            Some(c) if c <= self.capacity => {}
            _ => bail!(
                "weight-space capacity overrun: {} replicas at increment {} \
                 exceed {} slots",
                replicas,
                increment,
                self.capacity
            ),
        }
        self.weights_per_problem *= replicas;
        Ok(WeightPartition {
            stride: self.stride,
            replicas,
            increment,
            total_increment: increment * (replicas - 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_addressing_wraps() {
        let mut w = WeightVector::new(4);
        assert_eq!(w.capacity(), 16);
        w.update(3, 1.5);
        assert!((w.get(3) - 1.5).abs() < 1e-6);
        // 19 & 0xf == 3: same physical slot
        assert!((w.get(19) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_reserve_computes_increments() {
        let mut ctx = StackContext::new(10, 4);
        let p = ctx.reserve(3).unwrap();
        assert_eq!(p.increment, 4);
        assert_eq!(p.total_increment, 8);
        assert_eq!(ctx.weights_per_problem(), 3);

        // A second layer steps over everything the first one claimed.
        let q = ctx.reserve(5).unwrap();
        assert_eq!(q.increment, 12);
        assert_eq!(q.total_increment, 48);
    }

    #[test]
    fn test_replica_ranges_are_disjoint() {
        let mut ctx = StackContext::new(10, 2);
        let p = ctx.reserve(7).unwrap();
        for i in 1..=p.replicas {
            for j in (i + 1)..=p.replicas {
                let a = p.replica_range(i);
                let b = p.replica_range(j);
                assert!(
                    a.end <= b.start || b.end <= a.start,
                    "replicas {} and {} overlap: {:?} vs {:?}",
                    i,
                    j,
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_capacity_overrun_is_rejected() {
        let mut ctx = StackContext::new(4, 1);
        assert!(ctx.reserve(8).is_ok());
        let err = ctx.reserve(1000).unwrap_err();
        assert!(err.to_string().contains("capacity overrun"));
    }
}
