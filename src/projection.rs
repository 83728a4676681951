//! Hierarchical projection.
//!
//! A level-`i` vector has one component per `windowᵢ` block of its level
//! `i-1` vector:
//!
//! ```text
//! component j = norm( q(Pⱼ) · q(blockⱼ) )      q(x) = floor(x·10⁶ + 0.5) / 10⁶
//! ```
//!
//! Both operands are quantized before the product, so a vector projected
//! twice through the same basis gives bit-identical output. The dataset and
//! the query go through the same code path.

use crate::basis::Basis;
use crate::config::IndexConfig;
use crate::distance::{quantize, Norm};
use crate::error::{Result, Stage, StrataError};
use crate::persistence::artifacts;
use crate::store::{LevelInfo, LevelLayout, VectorStore};
use ndarray::{Array2, ArrayView1};
use tracing::{debug, info, warn};

/// A basis with its matrices already quantized.
#[derive(Debug, Clone)]
pub struct PreparedBasis {
    level: usize,
    window: usize,
    matrices: Vec<Array2<f64>>,
}

impl PreparedBasis {
    pub fn new(basis: &Basis) -> Result<Self> {
        basis.validate()?;
        Ok(Self {
            level: basis.level,
            window: basis.window,
            matrices: basis.matrices.iter().map(|m| m.mapv(quantize)).collect(),
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn input_dimension(&self) -> usize {
        self.matrices.len() * self.window
    }

    pub fn output_dimension(&self) -> usize {
        self.matrices.len()
    }

    /// Project one row of the previous level.
    pub fn project(&self, row: &[f64], norm: Norm) -> Result<Vec<f64>> {
        if row.len() != self.input_dimension() {
            return Err(StrataError::DimensionMismatch {
                expected: self.input_dimension(),
                actual: row.len(),
            });
        }
        Ok(self
            .matrices
            .iter()
            .zip(row.chunks_exact(self.window))
            .map(|(m, block)| reduce_block(m, block, norm))
            .collect())
    }
}

/// `norm(m · q(block))` for an already quantized `m`.
fn reduce_block(m: &Array2<f64>, block: &[f64], norm: Norm) -> f64 {
    let q = ArrayView1::from(block).mapv(quantize);
    norm.length(&m.dot(&q))
}

/// Project a single window block with its matrix.
pub fn project_window(matrix: &Array2<f64>, block: &[f64], norm: Norm) -> Result<f64> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || rows != cols || block.len() != rows {
        return Err(StrataError::DimensionMismatch {
            expected: rows,
            actual: block.len(),
        });
    }
    Ok(reduce_block(&matrix.mapv(quantize), block, norm))
}

/// Project one vector from level `basis.level - 1` to `basis.level`.
pub fn project_vector(basis: &Basis, row: &[f64], norm: Norm) -> Result<Vec<f64>> {
    PreparedBasis::new(basis)?.project(row, norm)
}

/// Applies persisted bases to datasets and queries.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    config: &'a IndexConfig,
}

impl<'a> Projector<'a> {
    pub fn new(config: &'a IndexConfig) -> Self {
        Self { config }
    }

    /// Layout a level is written with: the terminal level is concatenated
    /// for scans, every other level is per vector for point reads.
    pub fn layout_of(&self, level: usize) -> LevelLayout {
        if level == self.config.terminal_level() {
            LevelLayout::Concatenated
        } else {
            LevelLayout::PerVector
        }
    }

    /// Project a batch of rows of the previous level.
    pub fn project(&self, basis: &PreparedBasis, source_rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        source_rows
            .iter()
            .map(|row| basis.project(row, self.config.norm))
            .collect()
    }

    /// Project the whole of level `basis.level - 1` into a new level.
    ///
    /// On failure the partially written level is deleted before the error is
    /// returned. Returns the number of vectors written.
    pub fn project_level<S: VectorStore + ?Sized>(&self, store: &mut S, basis: &Basis) -> Result<u64> {
        let level = basis.level;
        let result = PreparedBasis::new(basis).and_then(|prepared| {
            let prev = level.checked_sub(1).ok_or_else(|| {
                StrataError::precondition("project_level", "level 0 is not projected")
            })?;
            let source = store.level_info(prev)?;
            if source.dimension != prepared.input_dimension() {
                return Err(StrataError::DimensionMismatch {
                    expected: prepared.input_dimension(),
                    actual: source.dimension,
                });
            }
            store.create_level(level, prepared.output_dimension(), self.layout_of(level))?;
            self.copy_projected(store, &prepared, &source)
        });

        match result {
            Ok(written) => {
                info!(level, vectors = written, layout = ?self.layout_of(level), "projected level");
                Ok(written)
            }
            Err(err) => {
                // Level 0 holds the source vectors and is never dropped here.
                if level > 0 {
                    if let Err(cleanup) = store.delete_level(level) {
                        warn!(level, error = %cleanup, "failed to remove partial level");
                    }
                }
                Err(err.in_stage(Stage::Projection { level }))
            }
        }
    }

    fn copy_projected<S: VectorStore + ?Sized>(
        &self,
        store: &mut S,
        basis: &PreparedBasis,
        source: &LevelInfo,
    ) -> Result<u64> {
        let step = self.config.chunk_size.max(1) as u64;
        let mut written = 0;
        for (shard, extent) in source.shards.iter().enumerate() {
            let mut start = extent.start;
            while start < extent.end() {
                let end = (start + step).min(extent.end());
                let rows = store.get_range(source.level, shard, start, end)?;
                let projected = self.project(basis, &rows)?;
                store.put_chunk(basis.level(), shard, start, &projected)?;
                debug!(level = basis.level(), shard, start, end, "projected chunk");
                written += projected.len() as u64;
                start = end;
            }
        }
        Ok(written)
    }

    /// The query at every level, level 0 first, using the persisted bases.
    pub fn project_query<S: VectorStore + ?Sized>(&self, store: &S, query: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.project_query_inner(store, query)
            .map_err(|e| e.in_stage(Stage::QueryProjection))
    }

    fn project_query_inner<S: VectorStore + ?Sized>(&self, store: &S, query: &[f64]) -> Result<Vec<Vec<f64>>> {
        if query.len() != self.config.dimension {
            return Err(StrataError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        let mut levels = Vec::with_capacity(self.config.levels() + 1);
        levels.push(query.to_vec());
        for level in 1..=self.config.levels() {
            let basis = artifacts::load_basis(store, level)?;
            if basis.window != self.config.window_of(level)? {
                return Err(StrataError::precondition(
                    "project_query",
                    format!(
                        "basis of level {level} has window {}, configured {}",
                        basis.window,
                        self.config.window_of(level)?
                    ),
                ));
            }
            let prepared = PreparedBasis::new(&basis)?;
            let next = prepared.project(&levels[level - 1], self.config.norm)?;
            levels.push(next);
        }
        Ok(levels)
    }
}
