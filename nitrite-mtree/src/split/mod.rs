//! Node split strategies.
//!
//! Splitting an overflowing node happens in two independently pluggable
//! steps:
//! - **Promotion** picks the two entries whose objects become the routing
//!   objects of the two new nodes ([`PromotionStrategy`]).
//! - **Distribution** partitions every entry of the node, the two promoted
//!   ones included, between those routing objects ([`DistributionStrategy`]).
//!
//! Both steps work on entry positions through a [`SplitContext`], which
//! memoizes pairwise distances so exhaustive promotions pay for each pair
//! only once. The result is an [`Assignment`] which the tree engine turns
//! into two nodes.

mod distribution;
mod promotion;

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{DistributionKind, PromotionKind, SplitConfig};
use crate::disk_mtree::{MTreeError, MTreeResult};

pub use distribution::{
    BalancedDistribution, DifferenceBalancedDistribution, GeneralizedHyperplaneDistribution,
};
pub use promotion::{
    FarthestPointsPromotion, MMRadPromotion, MRadPromotion, MaxDistancePromotion,
    RandomPromotion, SampledMRadPromotion,
};

// ============================================================================
// Split context
// ============================================================================

/// Distance oracle over the entries of one overflowing node.
pub struct SplitContext<'a> {
    radii: Vec<f64>,
    memo: Vec<f64>,
    distance: Box<dyn Fn(usize, usize) -> f64 + 'a>,
}

impl<'a> SplitContext<'a> {
    /// `radii[i]` is the covering radius of entry `i` (0 for leaf entries),
    /// `distance(i, j)` the distance between the objects of entries `i` and `j`.
    pub fn new(radii: Vec<f64>, distance: impl Fn(usize, usize) -> f64 + 'a) -> Self {
        let n = radii.len();
        Self {
            radii,
            memo: vec![f64::NAN; n * n],
            distance: Box::new(distance),
        }
    }

    pub fn len(&self) -> usize {
        self.radii.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    pub fn radius(&self, i: usize) -> f64 {
        self.radii[i]
    }

    /// Distance between entries `i` and `j`, computed at most once per pair.
    pub fn distance(&mut self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let n = self.len();
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let slot = lo * n + hi;
        let cached = self.memo[slot];
        if !cached.is_nan() {
            return cached;
        }
        let d = (self.distance)(lo, hi);
        self.memo[slot] = d;
        d
    }

    /// Positions other than `a` and `b`, in entry order
    pub(crate) fn others(&self, a: usize, b: usize) -> impl Iterator<Item = usize> {
        (0..self.len()).filter(move |&j| j != a && j != b)
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// One side of a split: a routing entry and the entries that join it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitGroup {
    /// Position of the promoted entry
    pub routing: usize,
    /// Distance from the routing object that covers every member subtree
    pub covering_radius: f64,
    /// `(position, distance to the routing object)`, the routing entry first
    pub members: Vec<(usize, f64)>,
}

impl SplitGroup {
    pub(crate) fn new(ctx: &SplitContext<'_>, routing: usize) -> Self {
        Self {
            routing,
            covering_radius: ctx.radius(routing),
            members: vec![(routing, 0.0)],
        }
    }

    pub(crate) fn add(&mut self, ctx: &SplitContext<'_>, position: usize, distance: f64) {
        self.covering_radius = self.covering_radius.max(distance + ctx.radius(position));
        self.members.push((position, distance));
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The outcome of a split: two disjoint groups that together hold every
/// entry of the split node exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub first: SplitGroup,
    pub second: SplitGroup,
}

impl Assignment {
    /// Sum of both covering radii (the m-RAD criterion)
    pub fn radius_sum(&self) -> f64 {
        self.first.covering_radius + self.second.covering_radius
    }

    /// Larger of both covering radii (the mM-RAD criterion)
    pub fn max_radius(&self) -> f64 {
        self.first.covering_radius.max(self.second.covering_radius)
    }

    /// True if the groups partition the positions `0..n`
    pub fn is_partition_of(&self, n: usize) -> bool {
        let mut seen = vec![false; n];
        for &(position, _) in self.first.members.iter().chain(self.second.members.iter()) {
            if position >= n || seen[position] {
                return false;
            }
            seen[position] = true;
        }
        seen.into_iter().all(|s| s) && !self.first.is_empty() && !self.second.is_empty()
    }
}

// ============================================================================
// Strategy traits
// ============================================================================

/// Partitions all entries between two promoted routing entries.
pub trait DistributionStrategy: Debug + Send + Sync {
    fn distribute(&self, ctx: &mut SplitContext<'_>, first: usize, second: usize) -> Assignment;
}

/// Chooses the two routing entries and produces the final assignment using
/// the given distribution.
pub trait PromotionStrategy: Debug + Send + Sync {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment;
}

/// A promotion and a distribution strategy combined into one split.
#[derive(Debug)]
pub struct MTreeSplit {
    promotion: Box<dyn PromotionStrategy>,
    distribution: Box<dyn DistributionStrategy>,
}

impl MTreeSplit {
    pub fn new(
        promotion: Box<dyn PromotionStrategy>,
        distribution: Box<dyn DistributionStrategy>,
    ) -> Self {
        Self {
            promotion,
            distribution,
        }
    }

    /// Build the strategies named by a split configuration. Randomized
    /// promotions are seeded from `config.seed`, or from OS entropy if unset.
    pub fn from_config(config: &SplitConfig) -> MTreeResult<Self> {
        let rng = || match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let promotion: Box<dyn PromotionStrategy> = match config.promotion {
            PromotionKind::Random => Box::new(RandomPromotion::new(rng())),
            PromotionKind::MRad => Box::new(MRadPromotion),
            PromotionKind::MMRad => Box::new(MMRadPromotion),
            PromotionKind::MaxDistance => Box::new(MaxDistancePromotion),
            PromotionKind::FarthestPoints => Box::new(FarthestPointsPromotion),
            PromotionKind::SampledMRad { samples } => {
                if samples == 0 {
                    return Err(MTreeError::Configuration(
                        "sampled m-RAD promotion needs at least one sample".into(),
                    ));
                }
                Box::new(SampledMRadPromotion::new(samples, rng()))
            }
        };

        let distribution: Box<dyn DistributionStrategy> = match config.distribution {
            DistributionKind::GeneralizedHyperplane => Box::new(GeneralizedHyperplaneDistribution),
            DistributionKind::Balanced => Box::new(BalancedDistribution),
            DistributionKind::DifferenceBalanced => Box::new(DifferenceBalancedDistribution),
        };

        Ok(Self::new(promotion, distribution))
    }

    /// Split the entries described by `ctx` into two groups.
    pub fn split(&mut self, ctx: &mut SplitContext<'_>) -> MTreeResult<Assignment> {
        if ctx.len() < 2 {
            return Err(MTreeError::invariant(format!(
                "cannot split a node with fewer than two entries ({})",
                ctx.len()
            )));
        }

        let assignment = self.promotion.promote(ctx, self.distribution.as_ref());
        if !assignment.is_partition_of(ctx.len()) {
            return Err(MTreeError::invariant(format!(
                "split of {} entries did not produce a partition: {:?}",
                ctx.len(),
                assignment
            )));
        }
        Ok(assignment)
    }
}
