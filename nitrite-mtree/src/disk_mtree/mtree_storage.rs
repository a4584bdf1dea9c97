//! Page storage layer for the M-Tree.
//!
//! A [`PageStore`] owns the bytes of every node. Two stores exist:
//! - [`MemoryPageStore`]: an unbounded map from page id to node
//! - [`PersistentPageStore`]: fixed-size page slots in a backing file, page 0
//!   holding the [`FileHeader`]
//!
//! Reads are never batched: each `read_page` on a file store is one seek and
//! one read of exactly `page_size` bytes. No retry happens at this layer, an
//! I/O error surfaces to the tree operation that triggered it.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::mtree_constants::{FIRST_NODE_PAGE, HEADER_PAGE, HEADER_PROBE_BYTES};
use super::mtree_types::{
    decode, encode, ensure_fits, FileHeader, MTreeError, MTreeResult, MetricPayload, Node,
    PageAccessStats, PageId, PageWithChecksum,
};

/// Backing storage for tree nodes.
pub trait PageStore<P: MetricPayload>: Send + Sync {
    /// Size of one page in bytes
    fn page_size(&self) -> usize;

    /// Hand out a fresh page id
    fn allocate(&mut self) -> PageId;

    /// Next page id that `allocate` would return
    fn next_page_id(&self) -> PageId;

    fn read_page(&mut self, page_id: PageId) -> MTreeResult<Node<P>>;

    fn write_page(&mut self, page_id: PageId, node: &Node<P>) -> MTreeResult<()>;

    /// Rewrite the header page. Not counted as a physical write.
    fn write_header(&mut self, header: &FileHeader) -> MTreeResult<()>;

    /// Make written pages durable
    fn sync(&mut self) -> MTreeResult<()>;

    fn close(&mut self) -> MTreeResult<()>;

    /// Physical read/write counters (logical accesses are counted by the cache)
    fn access_stats(&self) -> PageAccessStats;

    fn reset_access_stats(&mut self);
}

fn reject_header_page(page_id: PageId) -> MTreeResult<()> {
    if page_id == HEADER_PAGE {
        return Err(MTreeError::Storage(
            "page 0 is reserved for the header".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Unbounded in-memory store. Pages are kept as decoded nodes, but a node
/// is still refused if its encoding would not fit into a page, so both
/// stores accept exactly the same trees.
pub struct MemoryPageStore<P> {
    pages: HashMap<PageId, Node<P>>,
    header: Option<FileHeader>,
    page_size: usize,
    next_page_id: PageId,
    stats: PageAccessStats,
}

impl<P: MetricPayload> MemoryPageStore<P> {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: HashMap::new(),
            header: None,
            page_size,
            next_page_id: FIRST_NODE_PAGE,
            stats: PageAccessStats::default(),
        }
    }

    /// Last header written to this store
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl<P: MetricPayload> PageStore<P> for MemoryPageStore<P> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    fn read_page(&mut self, page_id: PageId) -> MTreeResult<Node<P>> {
        reject_header_page(page_id)?;
        self.stats.physical_reads += 1;
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or_else(|| MTreeError::Storage(format!("page {} does not exist", page_id)))
    }

    fn write_page(&mut self, page_id: PageId, node: &Node<P>) -> MTreeResult<()> {
        reject_header_page(page_id)?;
        ensure_fits(node, self.page_size)?;
        self.stats.physical_writes += 1;
        self.pages.insert(page_id, node.clone());
        Ok(())
    }

    fn write_header(&mut self, header: &FileHeader) -> MTreeResult<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn sync(&mut self) -> MTreeResult<()> {
        Ok(())
    }

    fn close(&mut self) -> MTreeResult<()> {
        Ok(())
    }

    fn access_stats(&self) -> PageAccessStats {
        self.stats
    }

    fn reset_access_stats(&mut self) {
        self.stats = PageAccessStats::default();
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Fixed-size page slots in a backing file. Page `i` lives at offset
/// `i * page_size`, page 0 is the header.
pub struct PersistentPageStore {
    file: File,
    path: PathBuf,
    page_size: usize,
    next_page_id: PageId,
    stats: PageAccessStats,
}

impl PersistentPageStore {
    /// Create a new store file, truncating an existing one
    pub fn create(path: &Path, page_size: usize) -> MTreeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
            next_page_id: FIRST_NODE_PAGE,
            stats: PageAccessStats::default(),
        })
    }

    /// Open an existing store file. Only the header is read.
    pub fn open(path: &Path) -> MTreeResult<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let header = Self::read_header(&mut file)?;

        let store = Self {
            file,
            path: path.to_path_buf(),
            page_size: header.page_size as usize,
            next_page_id: header.next_page_id,
            stats: PageAccessStats::default(),
        };
        Ok((store, header))
    }

    fn read_header(file: &mut File) -> MTreeResult<FileHeader> {
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(MTreeError::Storage("file is empty, no header found".into()));
        }

        let mut buffer = vec![0u8; len.min(HEADER_PROBE_BYTES)];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;

        let header: FileHeader = decode(&buffer)
            .map_err(|e| MTreeError::Storage(format!("unreadable header: {}", e)))?;
        header.validate()?;

        if (len as u64) < header.page_size as u64 {
            return Err(MTreeError::Storage(format!(
                "file of {} bytes is shorter than its header page ({} bytes)",
                len, header.page_size
            )));
        }
        Ok(header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, page_id: PageId) -> u64 {
        page_id * self.page_size as u64
    }

    fn padded(&self, mut bytes: Vec<u8>, what: &str) -> MTreeResult<Vec<u8>> {
        if bytes.len() > self.page_size {
            return Err(MTreeError::Storage(format!(
                "{} too large: {} bytes (page size {})",
                what,
                bytes.len(),
                self.page_size
            )));
        }
        bytes.resize(self.page_size, 0);
        Ok(bytes)
    }
}

impl<P: MetricPayload> PageStore<P> for PersistentPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    fn read_page(&mut self, page_id: PageId) -> MTreeResult<Node<P>> {
        reject_header_page(page_id)?;

        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        self.file.read_exact(&mut buffer)?;
        self.stats.physical_reads += 1;

        let page: PageWithChecksum<P> = decode(&buffer)?;
        page.into_node()
    }

    fn write_page(&mut self, page_id: PageId, node: &Node<P>) -> MTreeResult<()> {
        reject_header_page(page_id)?;

        let page = PageWithChecksum::new(node.clone())?;
        let bytes = self.padded(encode(&page)?, "node")?;

        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        self.stats.physical_writes += 1;
        Ok(())
    }

    fn write_header(&mut self, header: &FileHeader) -> MTreeResult<()> {
        let bytes = self.padded(encode(header)?, "header")?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn sync(&mut self) -> MTreeResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> MTreeResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn access_stats(&self) -> PageAccessStats {
        self.stats
    }

    fn reset_access_stats(&mut self) {
        self.stats = PageAccessStats::default();
    }
}
