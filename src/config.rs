//! Index configuration.
//!
//! An [`IndexConfig`] is built once, validated before any I/O, and passed by
//! reference to the indexer and the query engine. It fixes the dimension
//! chain for the whole run:
//!
//! ```text
//! D₀ = dimension
//! Dᵢ = Dᵢ₋₁ / windows[i-1]      (windows must divide exactly)
//! ```
//!
//! Vector IDs are global, 1-based and gapless. A [`ShardLayout`] splits them
//! into contiguous ranges, one per shard.

use crate::distance::Norm;
use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Default number of vectors read or written per store call.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// How the per-block projection matrices of a level are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Dominant eigenvector of the windowed covariance (`v·vᵀ`).
    #[default]
    Pca,
    /// Data-independent matrix with every entry set to `0.5`.
    Fixed,
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKind::Pca => write!(f, "pca"),
            ProjectionKind::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for ProjectionKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pca" => Ok(ProjectionKind::Pca),
            "fixed" | "orthogonal" => Ok(ProjectionKind::Fixed),
            _ => Err(StrataError::config(format!(
                "unknown projection mode {s:?}, expected pca or fixed"
            ))),
        }
    }
}

/// Configuration of an index build and of the queries run against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Original vector dimension `D`.
    pub dimension: usize,
    /// Number of vectors `N` in the dataset.
    pub num_vectors: u64,
    /// Window size of each reduction level, finest first. `k = windows.len()`.
    pub windows: Vec<usize>,
    /// Norm for window reduction and distances.
    pub norm: Norm,
    /// Basis construction mode.
    pub projection: ProjectionKind,
    /// Vectors per read/write page.
    pub chunk_size: usize,
    /// Number of contiguous ID ranges the dataset is split into.
    pub shard_count: usize,
    /// Keep the covariance matrices as artifacts until the level is projected.
    pub keep_covariance: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 0,
            num_vectors: 0,
            windows: Vec::new(),
            norm: Norm::L2,
            projection: ProjectionKind::Pca,
            chunk_size: DEFAULT_CHUNK_SIZE,
            shard_count: 1,
            keep_covariance: false,
        }
    }
}

impl IndexConfig {
    /// Configuration for `num_vectors` vectors of `dimension` values and the
    /// given window chain.
    pub fn new(dimension: usize, num_vectors: u64, windows: Vec<usize>) -> Self {
        Self {
            dimension,
            num_vectors,
            windows,
            ..Self::default()
        }
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionKind) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_keep_covariance(mut self, keep: bool) -> Self {
        self.keep_covariance = keep;
        self
    }

    /// Check every field. Called before the first store access.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(StrataError::config("dimension must be positive"));
        }
        if self.num_vectors == 0 {
            return Err(StrataError::config("vector count must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(StrataError::config("chunk size must be positive"));
        }
        if self.shard_count == 0 {
            return Err(StrataError::config("shard count must be positive"));
        }
        if self.shard_count as u64 > self.num_vectors {
            return Err(StrataError::config(format!(
                "{} shards for {} vectors leaves empty shards",
                self.shard_count, self.num_vectors
            )));
        }

        let mut dim = self.dimension;
        for (i, &window) in self.windows.iter().enumerate() {
            let level = i + 1;
            if window == 0 {
                return Err(StrataError::config(format!(
                    "window of level {level} must be positive"
                )));
            }
            if dim % window != 0 {
                return Err(StrataError::config(format!(
                    "window {window} of level {level} does not divide dimension {dim}"
                )));
            }
            dim /= window;
        }
        Ok(())
    }

    /// Number of reduction levels `k`.
    pub fn levels(&self) -> usize {
        self.windows.len()
    }

    /// Index of the coarsest level (equal to [`levels`](Self::levels)).
    pub fn terminal_level(&self) -> usize {
        self.windows.len()
    }

    /// Dimension of every level, level 0 first (`k + 1` entries).
    pub fn dimensions(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.windows.len() + 1);
        let mut dim = self.dimension;
        dims.push(dim);
        for &window in &self.windows {
            dim /= window.max(1);
            dims.push(dim);
        }
        dims
    }

    /// Dimension of a single level.
    pub fn dimension_of(&self, level: usize) -> Result<usize> {
        self.dimensions().get(level).copied().ok_or_else(|| {
            StrataError::precondition(
                "dimension_of",
                format!("level {level} exceeds terminal level {}", self.levels()),
            )
        })
    }

    /// Window that produces `level` from `level - 1`.
    pub fn window_of(&self, level: usize) -> Result<usize> {
        level
            .checked_sub(1)
            .and_then(|i| self.windows.get(i))
            .copied()
            .ok_or_else(|| {
                StrataError::precondition("window_of", format!("level {level} has no window"))
            })
    }

    /// Split of the ID space into shards.
    pub fn shard_layout(&self) -> ShardLayout {
        ShardLayout::new(self.num_vectors, self.shard_count)
    }
}

/// Contiguous partition of the IDs `1..=total` into `shards` ranges.
///
/// The first `total % shards` shards hold one extra vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLayout {
    total: u64,
    shards: usize,
}

impl ShardLayout {
    pub fn new(total: u64, shards: usize) -> Self {
        Self {
            total,
            shards: shards.max(1),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Half-open ID range `[start, end)` of a shard. Out-of-range shards are
    /// empty.
    pub fn range(&self, shard: usize) -> Range<u64> {
        if shard >= self.shards {
            return self.total + 1..self.total + 1;
        }
        let shards = self.shards as u64;
        let shard = shard as u64;
        let base = self.total / shards;
        let extra = self.total % shards;
        let start = 1 + shard * base + shard.min(extra);
        let len = base + u64::from(shard < extra);
        start..start + len
    }

    /// Shard holding `id`, if the ID is in `1..=total`.
    pub fn shard_of(&self, id: u64) -> Option<usize> {
        if id == 0 || id > self.total {
            return None;
        }
        let shards = self.shards as u64;
        let base = self.total / shards;
        let extra = self.total % shards;
        let idx = id - 1;
        // The first `extra` shards hold `base + 1` vectors each.
        let big = extra * (base + 1);
        let shard = if idx < big {
            idx / (base + 1)
        } else {
            extra + (idx - big) / base.max(1)
        };
        Some(shard as usize)
    }
}
