//! Core types and data structures for the disk-based M-Tree.
//!
//! This module defines the fundamental types used throughout the tree:
//! - Error types and result types
//! - Entry types (leaf objects and directory routing entries)
//! - The tagged `Node` variant stored in every page
//! - Capacities, file header and checksummed page wrapper
//! - Statistics structures

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io;
use thiserror::Error;

use super::mtree_constants::{
    FIRST_NODE_PAGE, MAGIC, MIN_FILL_FACTOR, SMALL_CAPACITY_WARNING, VERSION,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in metric indexing operations
#[derive(Debug, Error)]
pub enum MTreeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Tree is closed")]
    Closed,
}

impl MTreeError {
    /// Builds an invariant violation. These are programming defects, so debug
    /// builds stop right here.
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("M-Tree invariant violated: {}", msg);
        debug_assert!(false, "M-Tree invariant violated: {}", msg);
        MTreeError::InvariantViolation(msg)
    }
}

impl From<bincode::error::EncodeError> for MTreeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        MTreeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for MTreeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        MTreeError::Serialization(err.to_string())
    }
}

/// Result type for M-Tree operations
pub type MTreeResult<T> = Result<T, MTreeError>;

/// Page ID - unique identifier for a node/page in the store
pub type PageId = u64;

/// Identifier of an indexed object
pub type ObjectId = u64;

/// Anything that can be stored in the tree: it must be cloneable, serializable
/// into a page and shareable between threads. The tree never looks inside a
/// payload, it only hands it to the distance function.
pub trait MetricPayload:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> MetricPayload for T where
    T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

// ============================================================================
// Encoding helpers
// ============================================================================

pub(crate) fn encode<T: Serialize>(value: &T) -> MTreeResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::legacy(),
    )?)
}

/// Refuse a node whose checksummed page would not fit into `page_size` bytes.
pub(crate) fn ensure_fits<P: MetricPayload>(
    node: &Node<P>,
    page_size: usize,
) -> MTreeResult<()> {
    // The checksum adds a u32 in front of the node
    let size = encode(node)?.len() + std::mem::size_of::<u32>();
    if size > page_size {
        return Err(MTreeError::Storage(format!(
            "node too large: {} bytes (page size {})",
            size, page_size
        )));
    }
    Ok(())
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MTreeResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
    Ok(value)
}

// ============================================================================
// Entry Types
// ============================================================================

/// An entry in a leaf node: one indexed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry<P> {
    pub id: ObjectId,
    pub object: P,
    /// Distance to the routing object of the parent entry (0 in the root)
    pub parent_distance: f64,
}

/// An entry in a directory node: a routing object covering a subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry<P> {
    pub routing_id: ObjectId,
    pub routing_object: P,
    pub covering_radius: f64,
    /// Distance to the routing object of the parent entry (0 in the root)
    pub parent_distance: f64,
    pub child: PageId,
}

/// Uniform view over both entry kinds, used by the split machinery.
pub trait MTreeEntry<P> {
    fn routing_id(&self) -> ObjectId;
    fn routing_object(&self) -> &P;
    /// Radius of the subtree behind this entry; a leaf object covers only itself.
    fn covering_radius(&self) -> f64;
    fn parent_distance(&self) -> f64;
    fn set_parent_distance(&mut self, distance: f64);
}

impl<P> MTreeEntry<P> for LeafEntry<P> {
    fn routing_id(&self) -> ObjectId {
        self.id
    }

    fn routing_object(&self) -> &P {
        &self.object
    }

    fn covering_radius(&self) -> f64 {
        0.0
    }

    fn parent_distance(&self) -> f64 {
        self.parent_distance
    }

    fn set_parent_distance(&mut self, distance: f64) {
        self.parent_distance = distance;
    }
}

impl<P> MTreeEntry<P> for DirectoryEntry<P> {
    fn routing_id(&self) -> ObjectId {
        self.routing_id
    }

    fn routing_object(&self) -> &P {
        &self.routing_object
    }

    fn covering_radius(&self) -> f64 {
        self.covering_radius
    }

    fn parent_distance(&self) -> f64 {
        self.parent_distance
    }

    fn set_parent_distance(&mut self, distance: f64) {
        self.parent_distance = distance;
    }
}

// ============================================================================
// Node Types
// ============================================================================

/// Node types in the M-Tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node<P> {
    /// Leaf node containing the indexed objects
    Leaf { entries: Vec<LeafEntry<P>> },
    /// Directory node containing routing entries
    Directory { entries: Vec<DirectoryEntry<P>> },
}

impl<P> Node<P> {
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            entries: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Directory { entries } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label used in log and integrity messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Leaf { .. } => "leaf",
            Node::Directory { .. } => "directory",
        }
    }
}

// ============================================================================
// Capacities
// ============================================================================

/// Maximum and minimum entry counts per node kind, derived once from the
/// page size and the serialized size of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacities {
    pub dir_capacity: usize,
    pub leaf_capacity: usize,
    pub dir_minimum: usize,
    pub leaf_minimum: usize,
}

impl NodeCapacities {
    /// Derive capacities by encoding one leaf and one directory entry built
    /// from a sample object.
    pub fn derive<P: MetricPayload>(
        page_size: usize,
        sample_id: ObjectId,
        sample: &P,
    ) -> MTreeResult<Self> {
        let EntrySizes {
            overhead,
            leaf_entry,
            dir_entry,
        } = EntrySizes::measure(sample_id, sample)?;

        let usable = page_size.saturating_sub(overhead);
        let leaf_capacity = usable / leaf_entry.max(1);
        let dir_capacity = usable / dir_entry.max(1);

        log::debug!(
            "page size {} bytes: leaf entry {} bytes, directory entry {} bytes, node overhead {} bytes",
            page_size,
            leaf_entry,
            dir_entry,
            overhead
        );

        if leaf_capacity < 2 || dir_capacity < 2 {
            return Err(MTreeError::Configuration(format!(
                "page size of {} bytes is too small: a node must hold at least 2 entries \
                 (leaf capacity {}, directory capacity {})",
                page_size, leaf_capacity, dir_capacity
            )));
        }
        if leaf_capacity < SMALL_CAPACITY_WARNING || dir_capacity < SMALL_CAPACITY_WARNING {
            log::warn!(
                "page size of {} bytes yields very small nodes (leaf capacity {}, directory capacity {})",
                page_size,
                leaf_capacity,
                dir_capacity
            );
        }

        Ok(Self {
            dir_capacity,
            leaf_capacity,
            dir_minimum: minimum_for(dir_capacity),
            leaf_minimum: minimum_for(leaf_capacity),
        })
    }

    /// Make sure a full node of entries as large as the ones built from
    /// `object` still fits into a page. Every object that passes this check
    /// can be stored anywhere in the tree, as a leaf object or as a routing
    /// object, without a page overflowing later.
    pub fn admit<P: MetricPayload>(
        &self,
        page_size: usize,
        id: ObjectId,
        object: &P,
    ) -> MTreeResult<()> {
        let sizes = EntrySizes::measure(id, object)?;
        let leaf_node = sizes.overhead + sizes.leaf_entry * self.leaf_capacity;
        let dir_node = sizes.overhead + sizes.dir_entry * self.dir_capacity;
        let largest = leaf_node.max(dir_node);
        if largest > page_size {
            return Err(MTreeError::Storage(format!(
                "node too large: object {} needs {} bytes for a full node (page size {})",
                id, largest, page_size
            )));
        }
        Ok(())
    }

    pub fn capacity_of<P>(&self, node: &Node<P>) -> usize {
        if node.is_leaf() {
            self.leaf_capacity
        } else {
            self.dir_capacity
        }
    }
}

/// Encoded sizes of an empty checksummed page and of the two entry kinds
struct EntrySizes {
    overhead: usize,
    leaf_entry: usize,
    dir_entry: usize,
}

impl EntrySizes {
    fn measure<P: MetricPayload>(id: ObjectId, object: &P) -> MTreeResult<Self> {
        let overhead = encode(&PageWithChecksum::<P> {
            checksum: 0,
            node: Node::empty_leaf(),
        })?
        .len();

        let leaf_entry = encode(&LeafEntry {
            id,
            object: object.clone(),
            parent_distance: 0.0,
        })?
        .len();
        let dir_entry = encode(&DirectoryEntry {
            routing_id: id,
            routing_object: object.clone(),
            covering_radius: 0.0,
            parent_distance: 0.0,
            child: 0,
        })?
        .len();

        Ok(Self {
            overhead,
            leaf_entry,
            dir_entry,
        })
    }
}

fn minimum_for(capacity: usize) -> usize {
    ((capacity as f64 * MIN_FILL_FACTOR).round() as usize).max(1)
}

// ============================================================================
// Page with Checksum
// ============================================================================

/// A page wrapped with CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum<P> {
    /// CRC32 checksum of the encoded node
    pub checksum: u32,
    /// The actual node data
    pub node: Node<P>,
}

impl<P: MetricPayload> PageWithChecksum<P> {
    pub fn new(node: Node<P>) -> MTreeResult<Self> {
        let checksum = Self::calculate_checksum(&node)?;
        Ok(Self { checksum, node })
    }

    /// Calculate CRC32 checksum of node data
    pub fn calculate_checksum(node: &Node<P>) -> MTreeResult<u32> {
        Ok(crc32fast::hash(&encode(node)?))
    }

    /// Verify checksum and consume self to return node
    pub fn into_node(self) -> MTreeResult<Node<P>> {
        let expected = Self::calculate_checksum(&self.node)?;
        if self.checksum != expected {
            return Err(MTreeError::Storage(format!(
                "page checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                expected, self.checksum
            )));
        }
        Ok(self.node)
    }
}

// ============================================================================
// File Header
// ============================================================================

/// Header record stored at the beginning of every page store. Reopening a
/// file takes page size and capacities from here without touching any node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub dir_capacity: u32,
    pub leaf_capacity: u32,
    pub dir_minimum: u32,
    pub leaf_minimum: u32,
    /// Capacities and root are only meaningful once the first object arrived
    pub initialized: bool,
    pub root_page: PageId,
    pub next_page_id: PageId,
    pub entry_count: u64,
    pub height: u32,
}

impl FileHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            dir_capacity: 0,
            leaf_capacity: 0,
            dir_minimum: 0,
            leaf_minimum: 0,
            initialized: false,
            root_page: 0,
            next_page_id: FIRST_NODE_PAGE,
            entry_count: 0,
            height: 0,
        }
    }

    pub fn capacities(&self) -> NodeCapacities {
        NodeCapacities {
            dir_capacity: self.dir_capacity as usize,
            leaf_capacity: self.leaf_capacity as usize,
            dir_minimum: self.dir_minimum as usize,
            leaf_minimum: self.leaf_minimum as usize,
        }
    }

    pub fn set_capacities(&mut self, capacities: NodeCapacities) {
        self.dir_capacity = capacities.dir_capacity as u32;
        self.leaf_capacity = capacities.leaf_capacity as u32;
        self.dir_minimum = capacities.dir_minimum as u32;
        self.leaf_minimum = capacities.leaf_minimum as u32;
    }

    pub fn validate(&self) -> MTreeResult<()> {
        if self.magic != MAGIC {
            return Err(MTreeError::Storage(
                "invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(MTreeError::Storage(format!(
                "unsupported file format version {}",
                self.version
            )));
        }
        if self.page_size == 0 {
            return Err(MTreeError::Storage("header records a page size of 0".into()));
        }
        if self.next_page_id < FIRST_NODE_PAGE {
            return Err(MTreeError::Storage(format!(
                "header records an invalid next page id {}",
                self.next_page_id
            )));
        }
        if self.initialized {
            if self.dir_capacity < 2 || self.leaf_capacity < 2 {
                return Err(MTreeError::Storage(format!(
                    "header records unusable capacities (directory {}, leaf {})",
                    self.dir_capacity, self.leaf_capacity
                )));
            }
            if self.root_page < FIRST_NODE_PAGE || self.root_page >= self.next_page_id {
                return Err(MTreeError::Storage(format!(
                    "header records root page {} outside of allocated pages",
                    self.root_page
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Page access counters of a store. Physical accesses are real reads and
/// writes of node pages against the backing store, logical accesses every
/// page request that reached the cache.
///
/// Header rewrites, which follow every mutation, are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageAccessStats {
    pub physical_reads: u64,
    pub physical_writes: u64,
    pub logical_accesses: u64,
}

/// Statistics about M-Tree state and operations
#[derive(Debug, Clone, Default)]
pub struct MTreeStats {
    pub total_entries: u64,
    pub tree_height: u32,
    pub dir_capacity: usize,
    pub leaf_capacity: usize,
    pub allocated_pages: u64,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub physical_reads: u64,
    pub physical_writes: u64,
    pub logical_accesses: u64,
    pub distance_computations: u64,
}
