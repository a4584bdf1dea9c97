//! MTree implementation.

use parking_lot::RwLock;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MTreeConfig;
use crate::distance::DistanceFunction;
use crate::metric_index::MetricIndex;
use crate::split::{MTreeSplit, SplitContext};

use super::mtree_integrity::IntegrityReport;
use super::mtree_page_file::PageFile;
use super::mtree_query::beyond;
use super::mtree_storage::{MemoryPageStore, PageStore, PersistentPageStore};
use super::mtree_types::{
    encode, DirectoryEntry, FileHeader, LeafEntry, MTreeEntry, MTreeError, MTreeResult,
    MTreeStats, MetricPayload, Node, NodeCapacities, ObjectId, PageId,
};

/// A disk-paged M-Tree.
///
/// `MTree` is a cheap handle: clones share the same tree. Every operation
/// holds an internal lock for its whole duration, so concurrent callers are
/// serialized. Queries need the exclusive lock as well, since reading a page
/// updates the LRU order and the access counters.
pub struct MTree<P: MetricPayload> {
    inner: Arc<MTreeInner<P>>,
}

struct MTreeInner<P: MetricPayload> {
    core: RwLock<TreeCore<P>>,
    /// Is the tree closed?
    closed: RwLock<bool>,
    path: Option<PathBuf>,
}

/// One step of a descent: the directory page, the entry followed, and that
/// entry's routing object.
struct PathStep<P> {
    page_id: PageId,
    index: usize,
    routing: P,
}

/// One side of a split node, ready to be written and referenced.
struct SplitHalf<P> {
    routing_id: ObjectId,
    routing_object: P,
    covering_radius: f64,
    node: Node<P>,
}

/// The tree state behind the lock.
pub(crate) struct TreeCore<P: MetricPayload> {
    pub(crate) file: PageFile<P>,
    pub(crate) header: FileHeader,
    pub(crate) distance: Arc<dyn DistanceFunction<P>>,
    split: MTreeSplit,
    pub(crate) distance_computations: u64,
}

impl<P: MetricPayload> TreeCore<P> {
    pub(crate) fn new(
        file: PageFile<P>,
        header: FileHeader,
        distance: Arc<dyn DistanceFunction<P>>,
        split: MTreeSplit,
    ) -> Self {
        Self {
            file,
            header,
            distance,
            split,
            distance_computations: 0,
        }
    }

    /// Distance between two objects, counted
    pub(crate) fn dist(&mut self, a: &P, b: &P) -> f64 {
        self.distance_computations += 1;
        self.distance.distance(a, b)
    }

    /// Write the header with the current allocation state
    pub(crate) fn persist_header(&mut self) -> MTreeResult<()> {
        self.header.next_page_id = self.file.next_page_id();
        self.file.write_header(&self.header)
    }

    pub(crate) fn flush(&mut self) -> MTreeResult<()> {
        self.file.flush()?;
        self.persist_header()?;
        self.file.sync()
    }

    pub(crate) fn close(&mut self) -> MTreeResult<()> {
        self.persist_header()?;
        self.file.close()
    }

    pub(crate) fn stats(&self) -> MTreeStats {
        let access = self.file.access_stats();
        MTreeStats {
            total_entries: self.header.entry_count,
            tree_height: self.header.height,
            dir_capacity: self.header.dir_capacity as usize,
            leaf_capacity: self.header.leaf_capacity as usize,
            allocated_pages: self.file.next_page_id().saturating_sub(1),
            cached_pages: self.file.cached_pages() as u64,
            cache_hits: self.file.cache_hits(),
            cache_misses: self.file.cache_misses(),
            physical_reads: access.physical_reads,
            physical_writes: access.physical_writes,
            logical_accesses: access.logical_accesses,
            distance_computations: self.distance_computations,
        }
    }

    pub(crate) fn reset_page_access(&mut self) {
        self.file.reset_page_access();
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// The first object fixes the node capacities and creates the root leaf.
    fn initialize(&mut self, sample_id: ObjectId, sample: &P) -> MTreeResult<()> {
        let capacities = NodeCapacities::derive(self.file.page_size(), sample_id, sample)?;
        log::debug!(
            "node capacities: directory {} (min {}), leaf {} (min {})",
            capacities.dir_capacity,
            capacities.dir_minimum,
            capacities.leaf_capacity,
            capacities.leaf_minimum
        );

        let root = self.file.allocate();
        self.file.write_node(root, Node::empty_leaf())?;

        self.header.set_capacities(capacities);
        self.header.root_page = root;
        self.header.height = 1;
        self.header.initialized = true;
        Ok(())
    }

    pub(crate) fn insert(&mut self, id: ObjectId, object: P) -> MTreeResult<()> {
        self.insert_object(id, object)?;
        self.persist_header()
    }

    pub(crate) fn insert_bulk(&mut self, objects: Vec<(ObjectId, P)>) -> MTreeResult<()> {
        let count = objects.len();
        for (id, object) in objects {
            self.insert_object(id, object)?;
        }
        log::debug!("bulk inserted {} objects", count);
        self.persist_header()
    }

    fn insert_object(&mut self, id: ObjectId, object: P) -> MTreeResult<()> {
        if self.header.initialized {
            // Rejected before any page changes, the tree stays as it was
            self.header
                .capacities()
                .admit(self.file.page_size(), id, &object)?;
        } else {
            self.initialize(id, &object)?;
        }

        let mut path: Vec<PathStep<P>> = Vec::new();
        let mut page_id = self.header.root_page;
        let mut parent_distance = 0.0;

        loop {
            match self.file.read_node(page_id)? {
                Node::Leaf { mut entries } => {
                    entries.push(LeafEntry {
                        id,
                        object,
                        parent_distance,
                    });
                    self.store_node(page_id, Node::Leaf { entries }, path)?;
                    break;
                }
                Node::Directory { mut entries } => {
                    let (index, d) = self.choose_subtree(page_id, &entries, &object)?;
                    let entry = &mut entries[index];
                    let child = entry.child;
                    let routing = entry.routing_object.clone();

                    if d > entry.covering_radius {
                        entry.covering_radius = d;
                        self.file.write_node(page_id, Node::Directory { entries })?;
                    }

                    path.push(PathStep {
                        page_id,
                        index,
                        routing,
                    });
                    parent_distance = d;
                    page_id = child;
                }
            }
        }

        self.header.entry_count += 1;
        Ok(())
    }

    /// Pick the entry to descend into: among entries that already cover the
    /// object the nearest one, otherwise the one needing the least radius
    /// enlargement. Returns the entry index and its distance to the object.
    fn choose_subtree(
        &mut self,
        page_id: PageId,
        entries: &[DirectoryEntry<P>],
        object: &P,
    ) -> MTreeResult<(usize, f64)> {
        let mut covering: Option<(usize, f64)> = None;
        let mut enlarging: Option<(usize, f64, f64)> = None;

        for (i, entry) in entries.iter().enumerate() {
            let d = self.dist(&entry.routing_object, object);
            if d <= entry.covering_radius {
                if covering.map_or(true, |(_, best)| d < best) {
                    covering = Some((i, d));
                }
            } else {
                let enlargement = d - entry.covering_radius;
                if enlarging.map_or(true, |(_, best, _)| enlargement < best) {
                    enlarging = Some((i, enlargement, d));
                }
            }
        }

        match (covering, enlarging) {
            (Some(found), _) => Ok(found),
            (None, Some((i, _, d))) => Ok((i, d)),
            (None, None) => Err(MTreeError::invariant(format!(
                "directory page {} has no entries",
                page_id
            ))),
        }
    }

    /// Write a modified node, splitting it and every ancestor that overflows.
    fn store_node(
        &mut self,
        mut page_id: PageId,
        mut node: Node<P>,
        mut path: Vec<PathStep<P>>,
    ) -> MTreeResult<()> {
        let capacities = self.header.capacities();

        loop {
            if node.len() <= capacities.capacity_of(&node) {
                return self.file.write_node(page_id, node);
            }

            let kind = node.kind();
            let entry_count = node.len();
            let [first, second] = self.split_node(node)?;
            let new_page = self.file.allocate();
            log::debug!(
                "split {} page {} ({} entries) into {} + {} entries, new page {}",
                kind,
                page_id,
                entry_count,
                first.node.len(),
                second.node.len(),
                new_page
            );

            let mut first_entry = DirectoryEntry {
                routing_id: first.routing_id,
                routing_object: first.routing_object,
                covering_radius: first.covering_radius,
                parent_distance: 0.0,
                child: page_id,
            };
            let mut second_entry = DirectoryEntry {
                routing_id: second.routing_id,
                routing_object: second.routing_object,
                covering_radius: second.covering_radius,
                parent_distance: 0.0,
                child: new_page,
            };
            self.file.write_node(page_id, first.node)?;
            self.file.write_node(new_page, second.node)?;

            let Some(parent) = path.pop() else {
                // The root itself was split: grow the tree by one level
                let new_root = self.file.allocate();
                self.file.write_node(
                    new_root,
                    Node::Directory {
                        entries: vec![first_entry, second_entry],
                    },
                )?;
                self.header.root_page = new_root;
                self.header.height += 1;
                log::debug!(
                    "new root page {}, tree height is now {}",
                    new_root,
                    self.header.height
                );
                return Ok(());
            };

            if let Some(grandparent) = path.last() {
                let routing = grandparent.routing.clone();
                first_entry.parent_distance = self.dist(&routing, &first_entry.routing_object);
                second_entry.parent_distance = self.dist(&routing, &second_entry.routing_object);
            }

            let Node::Directory { mut entries } = self.file.read_node(parent.page_id)? else {
                return Err(MTreeError::invariant(format!(
                    "parent page {} of a split node is a leaf",
                    parent.page_id
                )));
            };
            if parent.index >= entries.len() || entries[parent.index].child != page_id {
                return Err(MTreeError::invariant(format!(
                    "parent page {} has no entry {} for child page {}",
                    parent.page_id, parent.index, page_id
                )));
            }
            entries[parent.index] = first_entry;
            entries.push(second_entry);

            page_id = parent.page_id;
            node = Node::Directory { entries };
        }
    }

    /// Split an overflowing node with the configured strategy.
    fn split_node(&mut self, node: Node<P>) -> MTreeResult<[SplitHalf<P>; 2]> {
        match node {
            Node::Leaf { entries } => self.partition(entries, |entries| Node::Leaf { entries }),
            Node::Directory { entries } => {
                self.partition(entries, |entries| Node::Directory { entries })
            }
        }
    }

    fn partition<E, F>(&mut self, entries: Vec<E>, wrap: F) -> MTreeResult<[SplitHalf<P>; 2]>
    where
        E: MTreeEntry<P>,
        F: Fn(Vec<E>) -> Node<P>,
    {
        let radii: Vec<f64> = entries.iter().map(|e| e.covering_radius()).collect();
        let distance = Arc::clone(&self.distance);
        let calls = Cell::new(0u64);

        let assignment = {
            let entries = &entries;
            let mut ctx = SplitContext::new(radii, |i, j| {
                calls.set(calls.get() + 1);
                distance.distance(entries[i].routing_object(), entries[j].routing_object())
            });
            self.split.split(&mut ctx)?
        };
        self.distance_computations += calls.get();

        let mut slots: Vec<Option<E>> = entries.into_iter().map(Some).collect();
        let mut halves = Vec::with_capacity(2);
        for group in [assignment.first, assignment.second] {
            let routing = slots[group.routing]
                .as_ref()
                .ok_or_else(|| MTreeError::invariant("split assigned a routing entry twice"))?;
            let routing_id = routing.routing_id();
            let routing_object = routing.routing_object().clone();

            let mut members = Vec::with_capacity(group.members.len());
            for (position, distance) in group.members {
                let mut entry = slots[position].take().ok_or_else(|| {
                    MTreeError::invariant(format!("split assigned entry {} twice", position))
                })?;
                entry.set_parent_distance(distance);
                members.push(entry);
            }

            halves.push(SplitHalf {
                routing_id,
                routing_object,
                covering_radius: group.covering_radius,
                node: wrap(members),
            });
        }

        let second = halves.pop();
        let first = halves.pop();
        match (first, second) {
            (Some(first), Some(second)) => Ok([first, second]),
            _ => Err(MTreeError::invariant("split did not produce two groups")),
        }
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    pub(crate) fn delete(&mut self, id: ObjectId, object: &P) -> MTreeResult<bool> {
        if !self.header.initialized || self.header.entry_count == 0 {
            return Ok(false);
        }

        let root = self.header.root_page;
        if self.delete_recursive(root, id, object, None)?.is_none() {
            return Ok(false);
        }

        self.header.entry_count -= 1;
        self.condense_root()?;
        self.persist_header()?;
        Ok(true)
    }

    /// Remove the object from the subtree at `page_id`. Returns the number of
    /// entries left in that node, or `None` if the object was not found.
    fn delete_recursive(
        &mut self,
        page_id: PageId,
        id: ObjectId,
        object: &P,
        distance_to_parent: Option<f64>,
    ) -> MTreeResult<Option<usize>> {
        match self.file.read_node(page_id)? {
            Node::Leaf { mut entries } => {
                let Some(position) = entries.iter().position(|e| e.id == id) else {
                    return Ok(None);
                };
                entries.remove(position);
                let remaining = entries.len();
                self.file.write_node(page_id, Node::Leaf { entries })?;
                Ok(Some(remaining))
            }
            Node::Directory { mut entries } => {
                for i in 0..entries.len() {
                    let radius = entries[i].covering_radius;
                    if let Some(dp) = distance_to_parent {
                        if beyond((dp - entries[i].parent_distance).abs(), radius) {
                            continue;
                        }
                    }
                    let d = self.dist(&entries[i].routing_object, object);
                    if beyond(d, radius) {
                        continue;
                    }

                    let child = entries[i].child;
                    match self.delete_recursive(child, id, object, Some(d))? {
                        None => continue,
                        Some(0) => {
                            entries.remove(i);
                            log::debug!("removed empty page {} from page {}", child, page_id);
                            let remaining = entries.len();
                            self.file.write_node(page_id, Node::Directory { entries })?;
                            return Ok(Some(remaining));
                        }
                        Some(_) => return Ok(Some(entries.len())),
                    }
                }
                Ok(None)
            }
        }
    }

    /// Shrink the tree from the top after a deletion: a root directory with
    /// a single child is replaced by that child, an empty one by an empty leaf.
    fn condense_root(&mut self) -> MTreeResult<()> {
        loop {
            let root = self.header.root_page;
            match self.file.read_node(root)? {
                Node::Directory { entries } if entries.is_empty() => {
                    self.file.write_node(root, Node::empty_leaf())?;
                    self.header.height = 1;
                    log::debug!("tree emptied, root page {} is a leaf again", root);
                    return Ok(());
                }
                Node::Directory { entries } if entries.len() == 1 => {
                    let child = entries[0].child;
                    let mut node = self.file.read_node(child)?;
                    match &mut node {
                        Node::Leaf { entries } => {
                            entries.iter_mut().for_each(|e| e.parent_distance = 0.0)
                        }
                        Node::Directory { entries } => {
                            entries.iter_mut().for_each(|e| e.parent_distance = 0.0)
                        }
                    }
                    self.file.write_node(child, node)?;
                    self.header.root_page = child;
                    self.header.height = self.header.height.saturating_sub(1).max(1);
                    log::debug!(
                        "collapsed root page {} into page {}, tree height is now {}",
                        root,
                        child,
                        self.header.height
                    );
                }
                _ => return Ok(()),
            }
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

impl<P: MetricPayload> MTree<P> {
    /// Create an empty memory-only tree with the default configuration.
    pub fn in_memory(distance: impl DistanceFunction<P> + 'static) -> MTreeResult<Self> {
        Self::create_with_config(MTreeConfig::default(), Arc::new(distance))
    }

    /// Create an empty file-backed tree at `path`, truncating any existing file.
    pub fn create(
        path: impl AsRef<Path>,
        distance: impl DistanceFunction<P> + 'static,
    ) -> MTreeResult<Self> {
        let mut config = MTreeConfig::default();
        config.set_file_path(path.as_ref());
        Self::create_with_config(config, Arc::new(distance))
    }

    /// Open an existing file-backed tree.
    ///
    /// Only the header is read: page size and node capacities come from it,
    /// nodes are loaded on demand.
    pub fn open(
        path: impl AsRef<Path>,
        distance: impl DistanceFunction<P> + 'static,
    ) -> MTreeResult<Self> {
        let mut config = MTreeConfig::default();
        config.set_file_path(path.as_ref());
        Self::open_with_config(config, Arc::new(distance))
    }

    pub(crate) fn create_with_config(
        config: MTreeConfig,
        distance: Arc<dyn DistanceFunction<P>>,
    ) -> MTreeResult<Self> {
        config.validate()?;
        let page_size = config.page_size;
        let cache_pages = config.cache_size.page_limit(page_size)?;
        let split = MTreeSplit::from_config(&config.split)?;

        let header = FileHeader::new(page_size);
        let header_size = encode(&header)?.len();
        if header_size > page_size {
            return Err(MTreeError::Configuration(format!(
                "page size of {} bytes cannot hold the {} byte file header",
                page_size, header_size
            )));
        }

        let store: Box<dyn PageStore<P>> = match &config.file_path {
            Some(path) => {
                log::info!("creating M-Tree file {}", path.display());
                Box::new(PersistentPageStore::create(path, page_size)?)
            }
            None => {
                log::info!("creating in-memory M-Tree");
                Box::new(MemoryPageStore::new(page_size))
            }
        };

        let mut core = TreeCore::new(PageFile::new(store, cache_pages), header, distance, split);
        core.persist_header()?;
        core.file.sync()?;

        Ok(Self::from_core(core, config.file_path))
    }

    pub(crate) fn open_with_config(
        config: MTreeConfig,
        distance: Arc<dyn DistanceFunction<P>>,
    ) -> MTreeResult<Self> {
        config.validate()?;
        let path = config.file_path.clone().ok_or_else(|| {
            MTreeError::Configuration("opening a tree requires a file path".into())
        })?;
        let split = MTreeSplit::from_config(&config.split)?;

        let (store, header) = PersistentPageStore::open(&path)?;
        let page_size = header.page_size as usize;
        if page_size != config.page_size {
            log::debug!(
                "using page size {} from the file header instead of configured {}",
                page_size,
                config.page_size
            );
        }
        let cache_pages = config.cache_size.page_limit(page_size)?;

        log::info!(
            "opened M-Tree file {} ({} entries, height {})",
            path.display(),
            header.entry_count,
            header.height
        );

        let core = TreeCore::new(
            PageFile::new(Box::new(store), cache_pages),
            header,
            distance,
            split,
        );
        Ok(Self::from_core(core, Some(path)))
    }

    fn from_core(core: TreeCore<P>, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(MTreeInner {
                core: RwLock::new(core),
                closed: RwLock::new(false),
                path,
            }),
        }
    }

    /// Run `op` on the engine of an open tree. The closed flag stays
    /// read-locked for the whole operation, so `close` waits for it.
    fn with_open_core<R>(
        &self,
        op: impl FnOnce(&mut TreeCore<P>) -> MTreeResult<R>,
    ) -> MTreeResult<R> {
        let closed = self.inner.closed.read();
        if *closed {
            return Err(MTreeError::Closed);
        }
        let mut core = self.inner.core.write();
        op(&mut core)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Number of levels, 0 before the first insert
    pub fn height(&self) -> u32 {
        self.inner.core.read().header.height
    }

    /// Get comprehensive statistics
    pub fn stats(&self) -> MTreeStats {
        self.inner.core.read().stats()
    }

    /// Zero the physical and logical page access counters.
    pub fn reset_page_access(&self) {
        self.inner.core.write().reset_page_access();
    }

    /// Write all dirty pages and the header, then sync the backing file.
    pub fn flush(&self) -> MTreeResult<()> {
        self.with_open_core(|core| core.flush())
    }

    /// Walk the whole tree and verify its structural invariants.
    pub fn check_integrity(&self) -> MTreeResult<IntegrityReport> {
        self.with_open_core(|core| core.check_integrity())
    }
}

impl<P: MetricPayload> Clone for MTree<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: MetricPayload> std::fmt::Debug for MTree<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MTree")
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// MetricIndex Implementation
// ============================================================================

impl<P: MetricPayload> MetricIndex<P> for MTree<P> {
    fn insert(&self, id: ObjectId, object: P) -> MTreeResult<()> {
        self.with_open_core(|core| core.insert(id, object))
    }

    fn insert_bulk(&self, objects: Vec<(ObjectId, P)>) -> MTreeResult<()> {
        self.with_open_core(|core| core.insert_bulk(objects))
    }

    fn delete(&self, id: ObjectId, object: &P) -> MTreeResult<bool> {
        self.with_open_core(|core| core.delete(id, object))
    }

    fn range_query(&self, query: &P, radius: f64) -> MTreeResult<Vec<(ObjectId, f64)>> {
        self.with_open_core(|core| core.range_query(query, radius))
    }

    fn nearest_neighbors_within(
        &self,
        query: &P,
        k: usize,
        max_distance: f64,
    ) -> MTreeResult<Vec<(ObjectId, f64)>> {
        self.with_open_core(|core| core.nearest_neighbors(query, k, max_distance))
    }

    fn size(&self) -> u64 {
        self.inner.core.read().header.entry_count
    }

    fn close(&self) -> MTreeResult<()> {
        let mut closed = self.inner.closed.write();
        if *closed {
            return Ok(());
        }

        self.inner.core.write().close()?;
        *closed = true;
        match &self.inner.path {
            Some(path) => log::info!("closed M-Tree file {}", path.display()),
            None => log::info!("closed in-memory M-Tree"),
        }
        Ok(())
    }
}

// ============================================================================
// Drop Implementation
// ============================================================================

impl<P: MetricPayload> Drop for MTreeInner<P> {
    fn drop(&mut self) {
        // Best effort flush when the last handle goes away
        if !*self.closed.get_mut() {
            if let Err(e) = self.core.get_mut().close() {
                log::warn!("failed to flush M-Tree on drop: {}", e);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
