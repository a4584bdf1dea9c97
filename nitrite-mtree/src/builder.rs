use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{CacheSize, DistributionKind, MTreeConfig, PromotionKind, SplitConfig};
use crate::disk_mtree::{MTree, MTreeError, MTreeResult, MetricPayload};
use crate::distance::DistanceFunction;

/// Builder for creating and configuring an [`MTree`].
///
/// `MTreeBuilder` provides a fluent API for configuring tree options before
/// creating or opening a tree. The first invalid option is captured and
/// returned by [`build`](Self::build) or [`open`](Self::open); later setters
/// are ignored once an error was recorded.
///
/// # Examples
///
/// ```rust,no_run
/// use nitrite_mtree::{EuclideanDistance, MTree, MTreeBuilder, MetricIndex, PromotionKind};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Memory-only tree with default settings
/// let tree: MTree<Vec<f64>> = MTreeBuilder::new().build(EuclideanDistance)?;
///
/// // File-backed tree with small pages and a bounded cache
/// let tree: MTree<Vec<f64>> = MTreeBuilder::new()
///     .page_size(1024)
///     .cache_pages(64)
///     .promotion(PromotionKind::MRad)
///     .seed(42)
///     .file_path("points.mtree")
///     .build(EuclideanDistance)?;
/// tree.insert(1, vec![0.5, 1.5])?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MTreeBuilder {
    error: Option<MTreeError>,
    config: MTreeConfig,
}

impl MTreeBuilder {
    /// Creates a new `MTreeBuilder` with default configuration: 4000 byte
    /// pages, an unbounded cache, no backing file and mM-RAD promotion with
    /// balanced distribution.
    pub fn new() -> Self {
        MTreeBuilder {
            error: None,
            config: MTreeConfig::new(),
        }
    }

    /// Starts from an existing configuration, validating it.
    pub fn from_config(config: MTreeConfig) -> Self {
        let error = config.validate().err();
        MTreeBuilder { error, config }
    }

    fn apply(mut self, f: impl FnOnce(&mut MTreeConfig) -> MTreeResult<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = f(&mut self.config) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Sets the page size in bytes. Must be greater than 0; node capacities
    /// are derived from it when the first object is inserted.
    pub fn page_size(self, page_size: usize) -> Self {
        self.apply(|config| config.set_page_size(page_size))
    }

    pub fn cache_size(self, cache_size: CacheSize) -> Self {
        self.apply(|config| config.set_cache_size(cache_size))
    }

    /// Bounds the cache to `pages` pages.
    pub fn cache_pages(self, pages: usize) -> Self {
        self.cache_size(CacheSize::Pages(pages))
    }

    /// Bounds the cache to `bytes` bytes, rounded down to whole pages.
    pub fn cache_bytes(self, bytes: usize) -> Self {
        self.cache_size(CacheSize::Bytes(bytes))
    }

    /// Stores pages in the given file instead of memory.
    pub fn file_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.apply(|config| {
            config.set_file_path(path);
            Ok(())
        })
    }

    pub fn split(self, split: SplitConfig) -> Self {
        self.apply(|config| config.set_split(split))
    }

    pub fn promotion(self, promotion: PromotionKind) -> Self {
        self.apply(|config| {
            config.set_split(SplitConfig {
                promotion,
                ..config.split
            })
        })
    }

    pub fn distribution(self, distribution: DistributionKind) -> Self {
        self.apply(|config| {
            config.set_split(SplitConfig {
                distribution,
                ..config.split
            })
        })
    }

    /// Seeds randomized split strategies, making tree layouts reproducible.
    pub fn seed(self, seed: u64) -> Self {
        self.apply(|config| {
            config.set_split(SplitConfig {
                seed: Some(seed),
                ..config.split
            })
        })
    }

    pub fn config(&self) -> &MTreeConfig {
        &self.config
    }

    /// Creates a new, empty tree. An existing backing file is truncated.
    pub fn build<P, D>(self, distance: D) -> MTreeResult<MTree<P>>
    where
        P: MetricPayload,
        D: DistanceFunction<P> + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }
        MTree::create_with_config(self.config, Arc::new(distance))
    }

    /// Opens the tree stored in the configured backing file. Page size and
    /// node capacities are taken from the file header.
    pub fn open<P, D>(self, distance: D) -> MTreeResult<MTree<P>>
    where
        P: MetricPayload,
        D: DistanceFunction<P> + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }
        MTree::open_with_config(self.config, Arc::new(distance))
    }
}
