//! Promotion strategies: choose the two routing entries of a split.
//!
//! All strategies expect at least two entries; [`super::MTreeSplit`] checks
//! this before promoting. Where several candidates score equally the one
//! found first in entry order wins, so exhaustive strategies are fully
//! deterministic and randomized ones are deterministic for a given seed.

use rand::rngs::StdRng;
use rand::Rng;

use super::{Assignment, DistributionStrategy, PromotionStrategy, SplitContext};

/// Two distinct positions drawn uniformly at random.
fn random_pair(rng: &mut StdRng, n: usize) -> (usize, usize) {
    let first = rng.gen_range(0..n);
    let mut second = rng.gen_range(0..n - 1);
    if second >= first {
        second += 1;
    }
    (first, second)
}

/// Distribute for every candidate pair and keep the assignment with the
/// lowest score.
fn best_assignment(
    ctx: &mut SplitContext<'_>,
    distribution: &dyn DistributionStrategy,
    pairs: impl IntoIterator<Item = (usize, usize)>,
    score: fn(&Assignment) -> f64,
) -> Assignment {
    let mut best: Option<(f64, Assignment)> = None;
    for (a, b) in pairs {
        let candidate = distribution.distribute(ctx, a, b);
        let candidate_score = score(&candidate);
        match &best {
            Some((best_score, _)) if candidate_score >= *best_score => {}
            _ => best = Some((candidate_score, candidate)),
        }
    }
    match best {
        Some((_, assignment)) => assignment,
        None => distribution.distribute(ctx, 0, 1),
    }
}

fn all_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |a| (a + 1..n).map(move |b| (a, b)))
}

/// Uniformly random choice of two distinct entries.
#[derive(Debug)]
pub struct RandomPromotion {
    rng: StdRng,
}

impl RandomPromotion {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl PromotionStrategy for RandomPromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let (first, second) = random_pair(&mut self.rng, ctx.len());
        distribution.distribute(ctx, first, second)
    }
}

/// m-RAD: try every pair, minimize the sum of both covering radii.
#[derive(Debug, Clone, Copy, Default)]
pub struct MRadPromotion;

impl PromotionStrategy for MRadPromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let n = ctx.len();
        best_assignment(ctx, distribution, all_pairs(n), Assignment::radius_sum)
    }
}

/// mM-RAD: try every pair, minimize the larger of both covering radii.
#[derive(Debug, Clone, Copy, Default)]
pub struct MMRadPromotion;

impl PromotionStrategy for MMRadPromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let n = ctx.len();
        best_assignment(ctx, distribution, all_pairs(n), Assignment::max_radius)
    }
}

/// The two entries with the largest mutual distance (M_LB_DIST).
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxDistancePromotion;

impl PromotionStrategy for MaxDistancePromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let mut best = (0, 1);
        let mut best_distance = f64::NEG_INFINITY;
        for (a, b) in all_pairs(ctx.len()) {
            let d = ctx.distance(a, b);
            if d > best_distance {
                best_distance = d;
                best = (a, b);
            }
        }
        distribution.distribute(ctx, best.0, best.1)
    }
}

/// Linear-time approximation of the farthest pair: the entry farthest from
/// the first entry, then the entry farthest from that one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FarthestPointsPromotion;

impl FarthestPointsPromotion {
    fn farthest_from(ctx: &mut SplitContext<'_>, from: usize) -> usize {
        let mut best = if from == 0 { 1 } else { 0 };
        let mut best_distance = f64::NEG_INFINITY;
        for j in 0..ctx.len() {
            if j == from {
                continue;
            }
            let d = ctx.distance(from, j);
            if d > best_distance {
                best_distance = d;
                best = j;
            }
        }
        best
    }
}

impl PromotionStrategy for FarthestPointsPromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let first = Self::farthest_from(ctx, 0);
        let second = Self::farthest_from(ctx, first);
        distribution.distribute(ctx, first, second)
    }
}

/// m-RAD over a random sample of candidate pairs. Nodes with no more pairs
/// than the sample size are evaluated exhaustively.
#[derive(Debug)]
pub struct SampledMRadPromotion {
    samples: usize,
    rng: StdRng,
}

impl SampledMRadPromotion {
    pub fn new(samples: usize, rng: StdRng) -> Self {
        Self { samples, rng }
    }
}

impl PromotionStrategy for SampledMRadPromotion {
    fn promote(
        &mut self,
        ctx: &mut SplitContext<'_>,
        distribution: &dyn DistributionStrategy,
    ) -> Assignment {
        let n = ctx.len();
        let pair_count = n * (n - 1) / 2;
        if pair_count <= self.samples {
            return best_assignment(ctx, distribution, all_pairs(n), Assignment::radius_sum);
        }

        let pairs: Vec<(usize, usize)> = (0..self.samples)
            .map(|_| random_pair(&mut self.rng, n))
            .collect();
        best_assignment(ctx, distribution, pairs, Assignment::radius_sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::tests::line_context;
    use crate::split::{BalancedDistribution, GeneralizedHyperplaneDistribution};
    use rand::SeedableRng;

    fn routing_pair(assignment: &Assignment) -> (usize, usize) {
        let (a, b) = (assignment.first.routing, assignment.second.routing);
        (a.min(b), a.max(b))
    }

    #[test]
    fn test_random_pair_is_distinct_and_reproducible() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        for n in 2..50 {
            let pair = random_pair(&mut rng1, n);
            assert_ne!(pair.0, pair.1);
            assert!(pair.0 < n && pair.1 < n);
            assert_eq!(pair, random_pair(&mut rng2, n));
        }
    }

    #[test]
    fn test_max_distance_picks_extremes() {
        let points = [4.0, -3.0, 1.0, 9.0, 2.0];
        let mut ctx = line_context(&points);
        let assignment = MaxDistancePromotion.promote(&mut ctx, &GeneralizedHyperplaneDistribution);
        assert_eq!(routing_pair(&assignment), (1, 3));
    }

    #[test]
    fn test_farthest_points_picks_extremes_on_a_line() {
        let points = [4.0, -3.0, 1.0, 9.0, 2.0];
        let mut ctx = line_context(&points);
        let assignment =
            FarthestPointsPromotion.promote(&mut ctx, &GeneralizedHyperplaneDistribution);
        // Farthest from 4.0 is -3.0, farthest from -3.0 is 9.0
        assert_eq!(assignment.first.routing, 1);
        assert_eq!(assignment.second.routing, 3);
    }

    #[test]
    fn test_mrad_minimizes_radius_sum() {
        // Two tight clusters: the best pair has one routing object in each
        let points = [0.0, 0.5, 1.0, 20.0, 20.5, 21.0];
        let mut ctx = line_context(&points);
        let assignment = MRadPromotion.promote(&mut ctx, &GeneralizedHyperplaneDistribution);
        assert_eq!(routing_pair(&assignment), (1, 4));
        assert_eq!(assignment.radius_sum(), 1.0);
    }

    #[test]
    fn test_mmrad_minimizes_max_radius() {
        let points = [0.0, 0.5, 1.0, 20.0, 20.5, 21.0];
        let mut ctx = line_context(&points);
        let assignment = MMRadPromotion.promote(&mut ctx, &GeneralizedHyperplaneDistribution);
        assert_eq!(assignment.max_radius(), 0.5);
    }

    #[test]
    fn test_random_promotion_is_seed_deterministic() {
        let points: Vec<f64> = (0..12).map(|i| ((i * 37) % 17) as f64).collect();
        let run = |seed| {
            let mut random = RandomPromotion::new(StdRng::seed_from_u64(seed));
            (0..5)
                .map(|_| {
                    let mut ctx = line_context(&points);
                    random.promote(&mut ctx, &BalancedDistribution)
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_sampled_mrad_small_node_is_exhaustive() {
        let points = [0.0, 0.5, 1.0, 20.0, 20.5, 21.0];
        let mut sampled = SampledMRadPromotion::new(15, StdRng::seed_from_u64(1));
        let mut ctx = line_context(&points);
        let assignment = sampled.promote(&mut ctx, &GeneralizedHyperplaneDistribution);
        assert_eq!(assignment.radius_sum(), 1.0);
    }

    #[test]
    fn test_sampled_mrad_is_seed_deterministic() {
        let points: Vec<f64> = (0..30).map(|i| ((i * 13) % 29) as f64).collect();
        let run = |seed| {
            let mut sampled = SampledMRadPromotion::new(5, StdRng::seed_from_u64(seed));
            let mut ctx = line_context(&points);
            sampled.promote(&mut ctx, &BalancedDistribution)
        };
        assert_eq!(run(9), run(9));
    }
}
