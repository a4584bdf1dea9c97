//! Cache-backed access to a page store.
//!
//! [`PageFile`] puts the LRU [`PageCache`] in front of a [`PageStore`]:
//! reads go to the cache first and fall through to the store on a miss,
//! writes only mark the cached copy dirty. Nodes are handed out as owned
//! clones, so evicting a page can never invalidate a node the tree engine
//! is still working on.
//!
//! Evicting a dirty page writes it to the store synchronously. Any `read_node`
//! or `write_node` may therefore pay for one page write of an unrelated page;
//! that is a latency spike, not an error.

use std::num::NonZeroUsize;

use super::mtree_cache::PageCache;
use super::mtree_storage::PageStore;
use super::mtree_types::{
    ensure_fits, FileHeader, MTreeResult, MetricPayload, Node, PageAccessStats, PageId,
};

pub struct PageFile<P: MetricPayload> {
    store: Box<dyn PageStore<P>>,
    cache: PageCache<P>,
    cache_hits: u64,
    cache_misses: u64,
}

impl<P: MetricPayload> PageFile<P> {
    pub fn new(store: Box<dyn PageStore<P>>, cache_pages: Option<NonZeroUsize>) -> Self {
        Self {
            store,
            cache: PageCache::new(cache_pages),
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    pub fn allocate(&mut self) -> PageId {
        self.store.allocate()
    }

    pub fn next_page_id(&self) -> PageId {
        self.store.next_page_id()
    }

    /// Read a node - first checks cache, then loads from the store.
    pub fn read_node(&mut self, page_id: PageId) -> MTreeResult<Node<P>> {
        if let Some(node) = self.cache.get(page_id) {
            self.cache_hits += 1;
            return Ok(node.clone());
        }

        self.cache_misses += 1;
        let node = self.store.read_page(page_id)?;
        self.cache_node(page_id, node.clone(), false)?;
        Ok(node)
    }

    /// Write a node to cache (marked dirty for later flush).
    ///
    /// A node that cannot fit into a page is refused here, before it enters
    /// the cache, so the error reaches the operation that produced it.
    pub fn write_node(&mut self, page_id: PageId, node: Node<P>) -> MTreeResult<()> {
        ensure_fits(&node, self.store.page_size())?;
        self.cache_node(page_id, node, true)
    }

    /// Add a node to cache. A dirty page pushed out to make room is written
    /// to the store before it is dropped.
    fn cache_node(&mut self, page_id: PageId, node: Node<P>, dirty: bool) -> MTreeResult<()> {
        if let Some((evicted_id, evicted)) = self.cache.insert(page_id, node, dirty) {
            if evicted.dirty {
                log::trace!("flushing evicted dirty page {}", evicted_id);
                self.store.write_page(evicted_id, &evicted.node)?;
            }
        }
        Ok(())
    }

    /// Write all dirty pages to the store
    pub fn flush(&mut self) -> MTreeResult<()> {
        let mut written = 0usize;
        for (page_id, cached) in self.cache.dirty_pages_mut() {
            self.store.write_page(page_id, &cached.node)?;
            cached.dirty = false;
            written += 1;
        }
        if written > 0 {
            log::debug!("flushed {} dirty pages", written);
        }
        Ok(())
    }

    pub fn write_header(&mut self, header: &FileHeader) -> MTreeResult<()> {
        self.store.write_header(header)
    }

    pub fn sync(&mut self) -> MTreeResult<()> {
        self.store.sync()
    }

    /// Flush dirty pages, then close the underlying store
    pub fn close(&mut self) -> MTreeResult<()> {
        self.flush()?;
        self.store.close()
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    pub fn access_stats(&self) -> PageAccessStats {
        let physical = self.store.access_stats();
        PageAccessStats {
            physical_reads: physical.physical_reads,
            physical_writes: physical.physical_writes,
            logical_accesses: self.cache_hits + self.cache_misses,
        }
    }

    /// Zero the physical and logical access counters
    pub fn reset_page_access(&mut self) {
        self.store.reset_access_stats();
        self.cache_hits = 0;
        self.cache_misses = 0;
    }
}
