//! Structural integrity checks.
//!
//! The check walks every reachable node and verifies:
//! - every stored object lies within the covering radius of each ancestor entry
//! - stored parent distances match the distance to the parent routing object
//!   (and are 0 in the root)
//! - no node exceeds its capacity and only the root may be empty
//! - all leaves sit at the depth recorded as tree height
//! - the number of objects found equals the recorded entry count
//!
//! Distances computed here are not counted in the tree statistics.

use super::mtree_impl::TreeCore;
use super::mtree_query::beyond;
use super::mtree_types::{LeafEntry, MTreeEntry, MTreeResult, MetricPayload, Node, PageId};

/// Tolerance for comparing a stored parent distance with a recomputed one
const PARENT_DISTANCE_TOLERANCE: f64 = 1e-9;

/// Integrity check report
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Total nodes visited
    pub nodes_checked: u64,
    /// Objects found in leaves
    pub entries_found: u64,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_found: 0,
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Routing object and covering radius of an entry on the current path
struct Ancestor<P> {
    routing: P,
    radius: f64,
}

impl<P: MetricPayload> TreeCore<P> {
    pub(crate) fn check_integrity(&mut self) -> MTreeResult<IntegrityReport> {
        let mut report = IntegrityReport::new();

        if let Err(e) = self.header.validate() {
            report.fail(format!("Invalid header: {}", e));
            return Ok(report);
        }

        if !self.header.initialized {
            if self.header.entry_count != 0 {
                report.fail(format!(
                    "header records {} entries but the tree was never initialized",
                    self.header.entry_count
                ));
            }
            return Ok(report);
        }

        let mut ancestors = Vec::new();
        self.check_node(self.header.root_page, 1, &mut ancestors, &mut report)?;

        if report.entries_found != self.header.entry_count {
            report.fail(format!(
                "found {} objects, header records {}",
                report.entries_found, self.header.entry_count
            ));
        }

        if report.is_valid {
            log::debug!(
                "integrity check passed: {} nodes, {} objects",
                report.nodes_checked,
                report.entries_found
            );
        } else {
            log::warn!(
                "integrity check found {} problems",
                report.errors.len()
            );
        }
        Ok(report)
    }

    fn check_node(
        &mut self,
        page_id: PageId,
        depth: u32,
        ancestors: &mut Vec<Ancestor<P>>,
        report: &mut IntegrityReport,
    ) -> MTreeResult<()> {
        let node = match self.file.read_node(page_id) {
            Ok(node) => node,
            Err(e) => {
                report.fail(format!("Page {}: {}", page_id, e));
                return Ok(());
            }
        };
        report.nodes_checked += 1;

        let capacities = self.header.capacities();
        if node.len() > capacities.capacity_of(&node) {
            report.fail(format!(
                "{} page {} holds {} entries, capacity is {}",
                node.kind(),
                page_id,
                node.len(),
                capacities.capacity_of(&node)
            ));
        }
        if node.is_empty() && !ancestors.is_empty() {
            report.fail(format!("non-root {} page {} is empty", node.kind(), page_id));
        }

        match node {
            Node::Leaf { entries } => {
                if depth != self.header.height {
                    report.fail(format!(
                        "leaf page {} at depth {}, tree height is {}",
                        page_id, depth, self.header.height
                    ));
                }
                for entry in &entries {
                    report.entries_found += 1;
                    self.check_parent_distance(page_id, entry, ancestors, report);
                    self.check_covered(page_id, entry, ancestors, report);
                }
            }
            Node::Directory { entries } => {
                if depth >= self.header.height {
                    report.fail(format!(
                        "directory page {} at depth {}, tree height is {}",
                        page_id, depth, self.header.height
                    ));
                    return Ok(());
                }
                for entry in &entries {
                    self.check_parent_distance(page_id, entry, ancestors, report);
                    ancestors.push(Ancestor {
                        routing: entry.routing_object.clone(),
                        radius: entry.covering_radius,
                    });
                    let result = self.check_node(entry.child, depth + 1, ancestors, report);
                    ancestors.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    fn check_parent_distance<E: MTreeEntry<P>>(
        &self,
        page_id: PageId,
        entry: &E,
        ancestors: &[Ancestor<P>],
        report: &mut IntegrityReport,
    ) {
        match ancestors.last() {
            None if entry.parent_distance() != 0.0 => report.fail(format!(
                "root page {} entry {} has parent distance {}",
                page_id,
                entry.routing_id(),
                entry.parent_distance()
            )),
            Some(parent) => {
                let actual = self.distance.distance(&parent.routing, entry.routing_object());
                if (actual - entry.parent_distance()).abs()
                    > PARENT_DISTANCE_TOLERANCE * actual.max(1.0)
                {
                    report.fail(format!(
                        "page {} entry {}: stored parent distance {} but actual is {}",
                        page_id,
                        entry.routing_id(),
                        entry.parent_distance(),
                        actual
                    ));
                }
            }
            None => {}
        }
    }

    /// A stored object must lie within the covering radius of every entry
    /// on its path. Routing entries themselves may reach further: only the
    /// objects below them are bounded.
    fn check_covered(
        &self,
        page_id: PageId,
        entry: &LeafEntry<P>,
        ancestors: &[Ancestor<P>],
        report: &mut IntegrityReport,
    ) {
        for ancestor in ancestors {
            let d = self.distance.distance(&ancestor.routing, &entry.object);
            if beyond(d, ancestor.radius) {
                report.fail(format!(
                    "leaf page {} object {} lies at {} from an ancestor routing object \
                     with covering radius {}",
                    page_id, entry.id, d, ancestor.radius
                ));
            }
        }
    }
}
