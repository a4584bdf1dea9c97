//! Disk-paged M-Tree for similarity search in arbitrary metric spaces.
//!
//! This module provides a page-based M-Tree that only ever looks at its
//! objects through a distance function:
//! - Fixed-size pages, one node per page, with capacities derived from the
//!   page size and the encoded size of the first object
//! - LRU cache for hot pages, dirty pages written back on eviction or flush
//! - Pluggable node splits (see [`crate::split`])
//! - Range and k-nearest-neighbor queries pruned with the triangle inequality
//!
//! Pages live either in memory or in a single file. A file-backed tree can be
//! closed and reopened; page size and capacities are restored from the header.

pub mod mtree_types;
pub mod mtree_constants;
pub mod mtree_cache;
pub mod mtree_storage;
pub mod mtree_page_file;
pub mod mtree_integrity;
mod mtree_impl;
mod mtree_query;

pub use mtree_types::{
    MTreeError, MTreeResult, MTreeStats, PageAccessStats, MetricPayload, ObjectId, PageId,
    Node, LeafEntry, DirectoryEntry, MTreeEntry, NodeCapacities, FileHeader, PageWithChecksum,
};
pub use mtree_constants::DEFAULT_PAGE_SIZE;
pub use mtree_impl::MTree;
pub use mtree_integrity::IntegrityReport;
pub use mtree_storage::{MemoryPageStore, PageStore, PersistentPageStore};
