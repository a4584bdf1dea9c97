//! LRU cache for M-Tree pages.
//!
//! Pages are only loaded when first accessed; the cache never preloads. A
//! bounded cache hands its least recently used page back to the caller on
//! overflow so that a dirty page can be written out before it is dropped.

use lru::LruCache;
use std::num::NonZeroUsize;

use super::mtree_types::{Node, PageId};

/// A cached page with its data and dirty flag
#[derive(Debug)]
pub struct CachedPage<P> {
    pub node: Node<P>,
    pub dirty: bool,
}

/// LRU cache for M-Tree pages
pub struct PageCache<P> {
    pages: LruCache<PageId, CachedPage<P>>,
}

impl<P> PageCache<P> {
    /// Create a cache holding at most `max_pages` pages, or an unbounded one.
    pub fn new(max_pages: Option<NonZeroUsize>) -> Self {
        let pages = match max_pages {
            Some(max) => LruCache::new(max),
            None => LruCache::unbounded(),
        };
        Self { pages }
    }

    /// Get a page from cache, updating LRU order.
    /// Returns None if the page must be loaded from the store.
    pub fn get(&mut self, page_id: PageId) -> Option<&Node<P>> {
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Insert a page, returning the page that had to make room for it.
    ///
    /// Replacing a page keeps it dirty if either version was dirty.
    pub fn insert(
        &mut self,
        page_id: PageId,
        node: Node<P>,
        dirty: bool,
    ) -> Option<(PageId, CachedPage<P>)> {
        match self.pages.push(page_id, CachedPage { node, dirty }) {
            Some((old_id, old)) if old_id == page_id => {
                if old.dirty {
                    if let Some(cached) = self.pages.peek_mut(&page_id) {
                        cached.dirty = true;
                    }
                }
                None
            }
            evicted => evicted,
        }
    }

    /// Iterate over dirty pages for flushing
    pub fn dirty_pages_mut(&mut self) -> impl Iterator<Item = (PageId, &mut CachedPage<P>)> {
        self.pages
            .iter_mut()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, cached)| (*id, cached))
    }

    /// Get number of cached pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
impl<P> PageCache<P> {
    fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains(&page_id)
    }

    fn is_dirty(&self, page_id: PageId) -> bool {
        self.pages
            .peek(&page_id)
            .map(|cached| cached.dirty)
            .unwrap_or(false)
    }
}
