//! Distribution strategies: partition a node's entries between two routing
//! entries chosen by a promotion.

use std::cmp::Ordering;

use super::{Assignment, DistributionStrategy, SplitContext, SplitGroup};

/// Distances of every non-promoted entry to both routing objects:
/// `(position, d(first, position), d(second, position))` in entry order.
fn distances_to_both(
    ctx: &mut SplitContext<'_>,
    first: usize,
    second: usize,
) -> Vec<(usize, f64, f64)> {
    let rest: Vec<usize> = ctx.others(first, second).collect();
    rest.into_iter()
        .map(|j| (j, ctx.distance(first, j), ctx.distance(second, j)))
        .collect()
}

fn by_distance_then_position(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Each entry joins the group of its nearer routing object. Equidistant
/// entries go to the smaller group, and to the first one if both are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedHyperplaneDistribution;

impl DistributionStrategy for GeneralizedHyperplaneDistribution {
    fn distribute(&self, ctx: &mut SplitContext<'_>, first: usize, second: usize) -> Assignment {
        let mut group1 = SplitGroup::new(ctx, first);
        let mut group2 = SplitGroup::new(ctx, second);

        for (j, d1, d2) in distances_to_both(ctx, first, second) {
            let to_first = match d1.total_cmp(&d2) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => group1.len() <= group2.len(),
            };
            if to_first {
                group1.add(ctx, j, d1);
            } else {
                group2.add(ctx, j, d2);
            }
        }

        Assignment {
            first: group1,
            second: group2,
        }
    }
}

/// The two routing objects take turns picking their nearest unassigned
/// entry, so both groups end up the same size (give or take one).
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedDistribution;

impl DistributionStrategy for BalancedDistribution {
    fn distribute(&self, ctx: &mut SplitContext<'_>, first: usize, second: usize) -> Assignment {
        let mut group1 = SplitGroup::new(ctx, first);
        let mut group2 = SplitGroup::new(ctx, second);

        let both = distances_to_both(ctx, first, second);
        let mut by_first: Vec<(usize, f64)> = both.iter().map(|&(j, d1, _)| (j, d1)).collect();
        let mut by_second: Vec<(usize, f64)> = both.iter().map(|&(j, _, d2)| (j, d2)).collect();
        by_first.sort_by(by_distance_then_position);
        by_second.sort_by(by_distance_then_position);

        let mut assigned = vec![false; ctx.len()];
        let (mut cursor1, mut cursor2) = (0, 0);
        let mut remaining = both.len();
        let mut first_turn = true;

        while remaining > 0 {
            let (list, cursor, group) = if first_turn {
                (&by_first, &mut cursor1, &mut group1)
            } else {
                (&by_second, &mut cursor2, &mut group2)
            };
            while assigned[list[*cursor].0] {
                *cursor += 1;
            }
            let (j, d) = list[*cursor];
            assigned[j] = true;
            group.add(ctx, j, d);
            remaining -= 1;
            first_turn = !first_turn;
        }

        Assignment {
            first: group1,
            second: group2,
        }
    }
}

/// Entries are ordered by how much nearer they are to the first routing
/// object than to the second (`d1 - d2`), then taken alternately from the
/// two ends of that order: the front feeds the first group, the back the
/// second.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceBalancedDistribution;

impl DistributionStrategy for DifferenceBalancedDistribution {
    fn distribute(&self, ctx: &mut SplitContext<'_>, first: usize, second: usize) -> Assignment {
        let mut group1 = SplitGroup::new(ctx, first);
        let mut group2 = SplitGroup::new(ctx, second);

        let mut both = distances_to_both(ctx, first, second);
        both.sort_by(|a, b| (a.1 - a.2).total_cmp(&(b.1 - b.2)).then(a.0.cmp(&b.0)));

        let mut front = 0;
        let mut back = both.len();
        while front < back {
            let (j, d1, _) = both[front];
            group1.add(ctx, j, d1);
            front += 1;
            if front < back {
                back -= 1;
                let (j, _, d2) = both[back];
                group2.add(ctx, j, d2);
            }
        }

        Assignment {
            first: group1,
            second: group2,
        }
    }
}
