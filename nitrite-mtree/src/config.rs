//! Configuration of an M-Tree.
//!
//! An [`MTreeConfig`] is plain data (serde-serializable, so it can live in an
//! application's own configuration file). Validation happens when a tree is
//! built from it; [`crate::MTreeBuilder`] validates eagerly while setting
//! options.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::disk_mtree::mtree_constants::{DEFAULT_PAGE_SIZE, DEFAULT_SAMPLED_PAIRS};
use crate::disk_mtree::{MTreeError, MTreeResult};

/// Upper bound of the page cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSize {
    /// Keep every page that was ever touched
    #[default]
    Unbounded,
    /// At most this many pages
    Pages(usize),
    /// At most this many bytes, counted in whole pages
    Bytes(usize),
}

impl CacheSize {
    /// Number of pages the cache may hold, `None` meaning unbounded.
    pub fn page_limit(&self, page_size: usize) -> MTreeResult<Option<NonZeroUsize>> {
        match *self {
            CacheSize::Unbounded => Ok(None),
            CacheSize::Pages(pages) => NonZeroUsize::new(pages).map(Some).ok_or_else(|| {
                MTreeError::Configuration("cache must hold at least one page".into())
            }),
            CacheSize::Bytes(bytes) => {
                let pages = if page_size == 0 { 0 } else { bytes / page_size };
                NonZeroUsize::new(pages).map(Some).ok_or_else(|| {
                    MTreeError::Configuration(format!(
                        "cache budget of {} bytes is smaller than one page of {} bytes",
                        bytes, page_size
                    ))
                })
            }
        }
    }
}

/// How the two routing objects of a split are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromotionKind {
    /// Two distinct entries drawn at random
    Random,
    /// Exhaustive, minimizes the sum of both covering radii
    MRad,
    /// Exhaustive, minimizes the larger covering radius
    #[default]
    MMRad,
    /// The pair with the largest mutual distance
    MaxDistance,
    /// Farthest from the first entry, then farthest from that one
    FarthestPoints,
    /// m-RAD over a random sample of pairs
    SampledMRad { samples: usize },
}

impl PromotionKind {
    /// Sampled m-RAD with the default sample size
    pub fn sampled_mrad() -> Self {
        PromotionKind::SampledMRad {
            samples: DEFAULT_SAMPLED_PAIRS,
        }
    }
}

/// How the entries of a split node are partitioned between the two
/// promoted routing objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionKind {
    /// Every entry joins its nearer routing object
    GeneralizedHyperplane,
    /// Routing objects alternately take their nearest remaining entry
    #[default]
    Balanced,
    /// Entries ordered by distance difference, taken from both ends
    DifferenceBalanced,
}

/// Split strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub promotion: PromotionKind,
    pub distribution: DistributionKind,
    /// Seed of randomized promotions; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

/// Configuration of an M-Tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MTreeConfig {
    /// Bytes per page
    pub page_size: usize,
    pub cache_size: CacheSize,
    /// Backing file; `None` keeps all pages in memory
    pub file_path: Option<PathBuf>,
    pub split: SplitConfig,
}

impl Default for MTreeConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: CacheSize::Unbounded,
            file_path: None,
            split: SplitConfig::default(),
        }
    }
}

impl MTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page_size(&mut self, page_size: usize) -> MTreeResult<()> {
        if page_size == 0 {
            return Err(MTreeError::Configuration("page size must be > 0".into()));
        }
        if page_size > u32::MAX as usize {
            return Err(MTreeError::Configuration(format!(
                "page size {} does not fit the file header",
                page_size
            )));
        }
        self.page_size = page_size;
        Ok(())
    }

    pub fn set_cache_size(&mut self, cache_size: CacheSize) -> MTreeResult<()> {
        // A byte budget is checked again against the final page size
        if let CacheSize::Pages(0) | CacheSize::Bytes(0) = cache_size {
            return Err(MTreeError::Configuration(
                "cache must hold at least one page".into(),
            ));
        }
        self.cache_size = cache_size;
        Ok(())
    }

    pub fn set_file_path(&mut self, path: impl Into<PathBuf>) {
        self.file_path = Some(path.into());
    }

    pub fn set_split(&mut self, split: SplitConfig) -> MTreeResult<()> {
        if let PromotionKind::SampledMRad { samples: 0 } = split.promotion {
            return Err(MTreeError::Configuration(
                "sampled m-RAD promotion needs at least one sample".into(),
            ));
        }
        self.split = split;
        Ok(())
    }

    /// Check every option, including those set directly on the fields.
    pub fn validate(&self) -> MTreeResult<()> {
        let mut checked = MTreeConfig::default();
        checked.set_page_size(self.page_size)?;
        checked.set_cache_size(self.cache_size)?;
        checked.set_split(self.split)?;
        self.cache_size.page_limit(self.page_size)?;
        Ok(())
    }
}
