//! Constants for the disk-based M-Tree implementation.

use super::mtree_types::PageId;

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4000;

/// Page 0 holds the file header, node pages start at 1
pub const HEADER_PAGE: PageId = 0;

/// First page id handed out by a fresh store
pub const FIRST_NODE_PAGE: PageId = 1;

/// Minimum fill of a node relative to its capacity (used for the underflow bookkeeping)
pub const MIN_FILL_FACTOR: f64 = 0.4;

/// Capacities below this value still work but make for a very deep tree
pub const SMALL_CAPACITY_WARNING: usize = 10;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x4E4D5452; // "NMTR" - Nitrite M-Tree

/// File format version
pub const VERSION: u32 = 1;

/// Number of bytes probed when reading the header of a file whose page size is not known yet
pub const HEADER_PROBE_BYTES: usize = 256;

/// Random pairs evaluated by the sampled m-RAD promotion when no count is configured
pub const DEFAULT_SAMPLED_PAIRS: usize = 32;
