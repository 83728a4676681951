//! Vector store: where level representations and artifacts live.
//!
//! The indexer and the query engine only talk to [`VectorStore`]. Two
//! backends are provided:
//!
//! - [`MemoryStore`]: keyed tables held in memory (one row per ID and level)
//! - [`DirectoryStore`]: files in a [`Directory`](crate::persistence::Directory),
//!   one directory per level
//!
//! IDs are global, 1-based and gapless. Within a level, shard `s` holds the
//! contiguous range that starts where shard `s - 1` ends, and every chunk
//! written to a shard must continue its sequence.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::error::{Result, StrataError};
use crate::VectorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Physical layout of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelLayout {
    /// One record per vector; point reads are cheap.
    PerVector,
    /// One record holding every vector of a shard; built for full scans.
    Concatenated,
}

/// Contiguous IDs held by one shard of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardExtent {
    pub start: VectorId,
    pub count: u64,
}

impl ShardExtent {
    pub fn end(&self) -> VectorId {
        self.start + self.count
    }

    pub fn range(&self) -> Range<VectorId> {
        self.start..self.end()
    }
}

/// What a store knows about a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: usize,
    pub dimension: usize,
    pub layout: LevelLayout,
    pub shards: Vec<ShardExtent>,
}

impl LevelInfo {
    pub fn new(level: usize, dimension: usize, layout: LevelLayout) -> Self {
        Self {
            level,
            dimension,
            layout,
            shards: Vec::new(),
        }
    }

    pub fn total_vectors(&self) -> u64 {
        self.shards.iter().map(|s| s.count).sum()
    }

    /// Shard containing `id`.
    pub fn shard_of(&self, id: VectorId) -> Option<usize> {
        self.shards.iter().position(|s| s.range().contains(&id))
    }

    /// Validate a chunk about to be appended and return the updated extent.
    ///
    /// Shards are opened in order; the first chunk of shard `s` starts where
    /// shard `s - 1` ends (ID 1 for shard 0).
    pub(crate) fn check_append(
        &self,
        shard: usize,
        id_start: VectorId,
        rows: &[Vec<f64>],
    ) -> Result<ShardExtent> {
        for row in rows {
            if row.len() != self.dimension {
                return Err(StrataError::DimensionMismatch {
                    expected: self.dimension,
                    actual: row.len(),
                });
            }
        }
        let expected = match self.shards.get(shard) {
            Some(extent) => {
                if shard + 1 != self.shards.len() {
                    return Err(StrataError::precondition(
                        "put_chunk",
                        format!("shard {shard} of level {} is already closed", self.level),
                    ));
                }
                extent.end()
            }
            None if shard == self.shards.len() => {
                self.shards.last().map_or(1, ShardExtent::end)
            }
            None => {
                return Err(StrataError::precondition(
                    "put_chunk",
                    format!(
                        "shard {shard} opened before shard {} of level {}",
                        self.shards.len(),
                        self.level
                    ),
                ))
            }
        };
        if id_start != expected {
            return Err(StrataError::precondition(
                "put_chunk",
                format!(
                    "chunk of level {} shard {shard} starts at id {id_start}, expected {expected}",
                    self.level
                ),
            ));
        }
        let start = self.shards.get(shard).map_or(id_start, |e| e.start);
        let count = self.shards.get(shard).map_or(0, |e| e.count) + rows.len() as u64;
        Ok(ShardExtent { start, count })
    }

    /// Check that `[id_start, id_end)` lies inside `shard`.
    pub(crate) fn check_range(
        &self,
        shard: usize,
        id_start: VectorId,
        id_end: VectorId,
    ) -> Result<ShardExtent> {
        let extent = self.shards.get(shard).copied().ok_or_else(|| {
            StrataError::precondition(
                "get_range",
                format!("level {} has no shard {shard}", self.level),
            )
        })?;
        if id_start > id_end || id_start < extent.start || id_end > extent.end() {
            return Err(StrataError::precondition(
                "get_range",
                format!(
                    "range {id_start}..{id_end} outside shard {shard} ({}..{})",
                    extent.start,
                    extent.end()
                ),
            ));
        }
        Ok(extent)
    }
}

/// Named blobs stored next to the level data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKey {
    /// Projection basis that produced a level.
    Basis { level: usize },
    /// Mean of the previous level, transient.
    Means { level: usize },
    /// Windowed covariance of the previous level, transient.
    Covariance { level: usize },
    /// Index manifest.
    Manifest,
    /// A saved query result list.
    Results { name: String },
}

impl ArtifactKey {
    /// Relative path of the artifact inside a store.
    pub fn path(&self) -> String {
        match self {
            ArtifactKey::Basis { level } => format!("artifacts/basis_{level}.json"),
            ArtifactKey::Means { level } => format!("artifacts/means_{level}.json"),
            ArtifactKey::Covariance { level } => format!("artifacts/covariance_{level}.json"),
            ArtifactKey::Manifest => "manifest.json".to_string(),
            ArtifactKey::Results { name } => format!("artifacts/results_{name}.json"),
        }
    }

    /// Transient artifacts of a level, removed by [`VectorStore::delete_artifact`].
    pub fn transient(level: usize) -> [ArtifactKey; 2] {
        [ArtifactKey::Means { level }, ArtifactKey::Covariance { level }]
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Backend holding level representations and artifacts.
pub trait VectorStore {
    /// Create (or reset) a level with the given dimension and layout.
    fn create_level(&mut self, level: usize, dimension: usize, layout: LevelLayout) -> Result<()>;

    /// Append a chunk of rows to a shard. `id_start` must continue the
    /// shard's sequence.
    fn put_chunk(
        &mut self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        rows: &[Vec<f64>],
    ) -> Result<()>;

    /// Rows `[id_start, id_end)` of a shard, in ID order.
    fn get_range(
        &self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        id_end: VectorId,
    ) -> Result<Vec<Vec<f64>>>;

    /// Representation of one vector at a level.
    fn get_by_id(&self, level: usize, id: VectorId) -> Result<Vec<f64>>;

    /// Remove the transient artifacts (means, covariance) of a level.
    fn delete_artifact(&mut self, level: usize) -> Result<()>;

    /// Drop a level and all its rows. Missing levels are ignored.
    fn delete_level(&mut self, level: usize) -> Result<()>;

    fn put_artifact(&mut self, key: &ArtifactKey, bytes: &[u8]) -> Result<()>;

    fn get_artifact(&self, key: &ArtifactKey) -> Result<Vec<u8>>;

    /// Dimension, layout and shard extents of a level.
    fn level_info(&self, level: usize) -> Result<LevelInfo>;

    /// Stream every row of a shard in ID order, at most `chunk_size` rows per
    /// call of `visit`, which gets the ID of the first row and the rows.
    ///
    /// The default pages through [`get_range`](Self::get_range). Backends
    /// that keep a shard in one sequential record read it once instead.
    fn scan_shard(
        &self,
        level: usize,
        shard: usize,
        chunk_size: usize,
        visit: &mut dyn FnMut(VectorId, Vec<Vec<f64>>) -> Result<()>,
    ) -> Result<()> {
        scan_by_range(self, level, shard, chunk_size, visit)
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(StrataError::precondition(
            "scan",
            "chunk size must be positive",
        ));
    }
    Ok(())
}

/// [`VectorStore::scan_shard`] built on `get_range` calls.
pub(crate) fn scan_by_range<S: VectorStore + ?Sized>(
    store: &S,
    level: usize,
    shard: usize,
    chunk_size: usize,
    visit: &mut dyn FnMut(VectorId, Vec<Vec<f64>>) -> Result<()>,
) -> Result<()> {
    check_chunk_size(chunk_size)?;
    let info = store.level_info(level)?;
    let extent = info.shards.get(shard).copied().ok_or_else(|| {
        StrataError::precondition("scan", format!("level {level} has no shard {shard}"))
    })?;
    let step = chunk_size as u64;
    let mut start = extent.start;
    while start < extent.end() {
        let end = (start + step).min(extent.end());
        let rows = store.get_range(level, shard, start, end)?;
        if rows.len() as u64 != end - start {
            return Err(StrataError::precondition(
                "get_range",
                format!(
                    "level {level} shard {shard} returned {} rows for {start}..{end}",
                    rows.len()
                ),
            ));
        }
        visit(start, rows)?;
        start = end;
    }
    Ok(())
}

/// Visit every row of a level in shard and ID order, `chunk_size` rows at a
/// time. The callback gets the shard, the ID of the first row and the rows.
pub fn for_each_chunk<S, F>(store: &S, level: usize, chunk_size: usize, mut visit: F) -> Result<()>
where
    S: VectorStore + ?Sized,
    F: FnMut(usize, VectorId, Vec<Vec<f64>>) -> Result<()>,
{
    check_chunk_size(chunk_size)?;
    let info = store.level_info(level)?;
    for shard in 0..info.shards.len() {
        store.scan_shard(level, shard, chunk_size, &mut |start, rows| {
            visit(shard, start, rows)
        })?;
    }
    Ok(())
}
