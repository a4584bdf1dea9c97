//! Range and nearest-neighbor search.
//!
//! Both searches prune with the triangle inequality. A subtree whose routing
//! object lies at distance `d` from the query, with covering radius `r`, can
//! only hold objects at distance `>= d - r`. Before even computing `d`, the
//! distance `dp` from the query to the parent routing object and the stored
//! `parent_distance` give the cheaper bound `|dp - parent_distance| - r`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::mtree_impl::TreeCore;
use super::mtree_types::{MTreeResult, MetricPayload, Node, ObjectId, PageId};

/// Relative slack for pruning decisions, so that rounding in sums of
/// distances never prunes a subtree holding a qualifying object.
const PRUNING_SLACK: f64 = 1e-9;

/// True if `distance` is certainly greater than `bound`.
pub(crate) fn beyond(distance: f64, bound: f64) -> bool {
    distance > bound + PRUNING_SLACK * bound.abs().max(1.0)
}

/// Sort `(id, distance)` results by distance, then id.
fn sort_results(results: &mut [(ObjectId, f64)]) {
    results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
}

/// A subtree waiting to be visited, ordered so that `BinaryHeap` pops the
/// smallest lower bound first.
struct PendingNode {
    lower_bound: f64,
    page_id: PageId,
    distance_to_parent: f64,
}

impl PartialEq for PendingNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingNode {}

impl PartialOrd for PendingNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .lower_bound
            .total_cmp(&self.lower_bound)
            .then(other.page_id.cmp(&self.page_id))
    }
}

/// A result candidate; the heap keeps the worst one on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    id: ObjectId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// The k best candidates seen so far.
struct KnnResults {
    k: usize,
    max_distance: f64,
    heap: BinaryHeap<Candidate>,
}

impl KnnResults {
    fn new(k: usize, max_distance: f64) -> Self {
        Self {
            k,
            max_distance,
            heap: BinaryHeap::with_capacity(k.min(1024) + 1),
        }
    }

    /// Current search radius: the k-th best distance once k results are
    /// known, the distance limit before that.
    fn radius(&self) -> f64 {
        match self.heap.peek() {
            Some(worst) if self.heap.len() >= self.k => worst.distance,
            _ => self.max_distance,
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        if candidate.distance > self.max_distance {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    fn into_sorted(self) -> Vec<(ObjectId, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.id, c.distance))
            .collect()
    }
}

impl<P: MetricPayload> TreeCore<P> {
    /// All objects within `radius` of `query`, sorted by distance then id.
    pub(crate) fn range_query(
        &mut self,
        query: &P,
        radius: f64,
    ) -> MTreeResult<Vec<(ObjectId, f64)>> {
        let mut results = Vec::new();
        // NaN and negative radii match nothing
        if !self.header.initialized || radius.is_nan() || radius < 0.0 {
            return Ok(results);
        }

        let root = self.header.root_page;
        self.range_recursive(root, query, radius, None, &mut results)?;
        sort_results(&mut results);
        Ok(results)
    }

    fn range_recursive(
        &mut self,
        page_id: PageId,
        query: &P,
        radius: f64,
        distance_to_parent: Option<f64>,
        results: &mut Vec<(ObjectId, f64)>,
    ) -> MTreeResult<()> {
        match self.file.read_node(page_id)? {
            Node::Leaf { entries } => {
                for entry in &entries {
                    if let Some(dp) = distance_to_parent {
                        if beyond((dp - entry.parent_distance).abs(), radius) {
                            continue;
                        }
                    }
                    let d = self.dist(&entry.object, query);
                    if d <= radius {
                        results.push((entry.id, d));
                    }
                }
            }
            Node::Directory { entries } => {
                for entry in &entries {
                    let reach = radius + entry.covering_radius;
                    if let Some(dp) = distance_to_parent {
                        if beyond((dp - entry.parent_distance).abs(), reach) {
                            continue;
                        }
                    }
                    let d = self.dist(&entry.routing_object, query);
                    if !beyond(d, reach) {
                        self.range_recursive(entry.child, query, radius, Some(d), results)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// At most `k` objects nearest to `query` within `max_distance`, sorted by
    /// distance then id.
    ///
    /// Best-first search: subtrees are visited in order of their lower bound
    /// `max(0, d - r)` and the search stops once that bound exceeds the k-th
    /// best distance found.
    pub(crate) fn nearest_neighbors(
        &mut self,
        query: &P,
        k: usize,
        max_distance: f64,
    ) -> MTreeResult<Vec<(ObjectId, f64)>> {
        if !self.header.initialized || k == 0 || max_distance.is_nan() || max_distance < 0.0 {
            return Ok(Vec::new());
        }

        let mut results = KnnResults::new(k, max_distance);
        let mut queue = BinaryHeap::new();
        let root = self.header.root_page;

        // The root has no parent: its lookups skip the parent distance bound
        self.visit_knn(root, query, None, &mut queue, &mut results)?;

        while let Some(pending) = queue.pop() {
            if beyond(pending.lower_bound, results.radius()) {
                break;
            }
            self.visit_knn(
                pending.page_id,
                query,
                Some(pending.distance_to_parent),
                &mut queue,
                &mut results,
            )?;
        }

        Ok(results.into_sorted())
    }

    fn visit_knn(
        &mut self,
        page_id: PageId,
        query: &P,
        distance_to_parent: Option<f64>,
        queue: &mut BinaryHeap<PendingNode>,
        results: &mut KnnResults,
    ) -> MTreeResult<()> {
        match self.file.read_node(page_id)? {
            Node::Leaf { entries } => {
                for entry in &entries {
                    if let Some(dp) = distance_to_parent {
                        if beyond((dp - entry.parent_distance).abs(), results.radius()) {
                            continue;
                        }
                    }
                    let d = self.dist(&entry.object, query);
                    results.offer(Candidate {
                        distance: d,
                        id: entry.id,
                    });
                }
            }
            Node::Directory { entries } => {
                for entry in &entries {
                    let reach = results.radius() + entry.covering_radius;
                    if let Some(dp) = distance_to_parent {
                        if beyond((dp - entry.parent_distance).abs(), reach) {
                            continue;
                        }
                    }
                    let d = self.dist(&entry.routing_object, query);
                    if beyond(d, reach) {
                        continue;
                    }
                    queue.push(PendingNode {
                        lower_bound: (d - entry.covering_radius).max(0.0),
                        page_id: entry.child,
                        distance_to_parent: d,
                    });
                }
            }
        }
        Ok(())
    }
}
