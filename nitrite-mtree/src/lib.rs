//! # Nitrite M-Tree - Metric Indexing for Nitrite
//!
//! This crate provides a disk-paged M-Tree: an index over objects of any type
//! for which a distance function satisfying the metric axioms exists. Points,
//! strings under edit distance, feature vectors and the like can all be
//! searched by similarity without a coordinate system.
//!
//! ## Features
//!
//! - **Disk-Based Storage**: Fixed-size pages in memory or in a single file
//! - **LRU Cache**: Bounded by pages or bytes, dirty pages written back lazily
//! - **Persistent**: Page size, capacities and root survive a reopen
//! - **Pluggable Splits**: Six promotion and three distribution strategies
//! - **Range and kNN Queries**: Pruned with covering radii and cached parent distances
//! - **Thread Safe**: Cheap cloneable handles sharing one tree
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nitrite_mtree::{EuclideanDistance, MTree, MetricIndex};
//! use tempfile::tempdir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempdir()?;
//! let tree = MTree::create(&dir.path().join("points.mtree"), EuclideanDistance)?;
//!
//! tree.insert(1, vec![0.0, 0.0])?;
//! tree.insert(2, vec![3.0, 4.0])?;
//! tree.insert(3, vec![10.0, 10.0])?;
//!
//! // Everything within distance 5 of the origin
//! let hits = tree.range_query(&vec![0.0, 0.0], 5.0)?;
//! assert_eq!(hits, vec![(1, 0.0), (2, 5.0)]);
//!
//! // The two nearest neighbors
//! let nearest = tree.nearest_neighbors(&vec![9.0, 9.0], 2)?;
//! assert_eq!(nearest[0].0, 3);
//!
//! tree.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Distances
//!
//! Any `Fn(&P, &P) -> f64` closure is a distance function:
//!
//! ```rust,no_run
//! use nitrite_mtree::{MTree, MetricIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = MTree::in_memory(|a: &i64, b: &i64| (a - b).abs() as f64)?;
//! tree.insert(7, 42)?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod disk_mtree;
pub mod distance;
pub mod metric_index;
pub mod split;

// Re-export tree types
pub use builder::MTreeBuilder;
pub use disk_mtree::{
    IntegrityReport, MTree, MTreeError, MTreeResult, MTreeStats, MetricPayload, ObjectId,
    PageAccessStats,
};
pub use metric_index::MetricIndex;

// Re-export configuration
pub use config::{CacheSize, DistributionKind, MTreeConfig, PromotionKind, SplitConfig};

// Re-export distance functions
pub use distance::{
    DistanceFunction, EuclideanDistance, LevenshteinDistance, ManhattanDistance, MaximumDistance,
};

// Re-export split framework
pub use split::{
    Assignment, DistributionStrategy, MTreeSplit, PromotionStrategy, SplitContext, SplitGroup,
};
