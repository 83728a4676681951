//! Projection basis construction.
//!
//! The basis of level `i` holds one `windowᵢ × windowᵢ` matrix per block of
//! the level `i-1` vectors. With [`ProjectionKind::Pca`] each matrix is the
//! rank-1 projector `v·vᵀ` onto the dominant eigenvector of that block's
//! sample covariance over the whole dataset:
//!
//! ```text
//! level i-1 rows ──► mean ──► windowed covariance ──► dominant eigenpair ──► v·vᵀ
//! ```
//!
//! With [`ProjectionKind::Fixed`] every entry is `0.5` and no statistics are
//! read.
//!
//! A basis is built once per level and persisted; queries are always
//! projected with the persisted basis.

pub mod eigen;
pub mod stats;

pub use eigen::EigenPair;

use crate::config::{IndexConfig, ProjectionKind};
use crate::error::{Result, Stage, StrataError};
use crate::persistence::artifacts;
use crate::store::{for_each_chunk, VectorStore};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use stats::{CovarianceAccumulator, MeanAccumulator};
use tracing::{debug, info};

/// Entry value of every fixed-basis matrix.
pub const FIXED_ENTRY: f64 = 0.5;

/// Projection matrices that produce one level from the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basis {
    /// Level this basis produces.
    pub level: usize,
    /// Block length in the previous level.
    pub window: usize,
    pub kind: ProjectionKind,
    /// One matrix per block; `matrices.len()` is the level's dimension.
    pub matrices: Vec<Array2<f64>>,
    /// Dominant eigenvalue of each block's covariance. Empty for a fixed basis.
    #[serde(default)]
    pub eigenvalues: Vec<f64>,
}

impl Basis {
    /// Data-independent basis with every entry set to [`FIXED_ENTRY`].
    pub fn fixed(level: usize, window: usize, blocks: usize) -> Self {
        Self {
            level,
            window,
            kind: ProjectionKind::Fixed,
            matrices: (0..blocks)
                .map(|_| Array2::from_elem((window, window), FIXED_ENTRY))
                .collect(),
            eigenvalues: Vec::new(),
        }
    }

    /// Dimension of the level produced by this basis.
    pub fn output_dimension(&self) -> usize {
        self.matrices.len()
    }

    /// Dimension of the level this basis consumes.
    pub fn input_dimension(&self) -> usize {
        self.matrices.len() * self.window
    }

    /// Check shapes, e.g. after loading a basis from a store.
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 || self.matrices.is_empty() {
            return Err(StrataError::precondition(
                "basis",
                format!("basis of level {} is empty", self.level),
            ));
        }
        for (j, m) in self.matrices.iter().enumerate() {
            if m.dim() != (self.window, self.window) || !m.iter().all(|x| x.is_finite()) {
                return Err(StrataError::precondition(
                    "basis",
                    format!(
                        "matrix {j} of level {} is not a finite {w}x{w} matrix",
                        self.level,
                        w = self.window
                    ),
                ));
            }
        }
        if !self.eigenvalues.is_empty() && self.eigenvalues.len() != self.matrices.len() {
            return Err(StrataError::precondition(
                "basis",
                format!(
                    "level {} has {} eigenvalues for {} matrices",
                    self.level,
                    self.eigenvalues.len(),
                    self.matrices.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Builds the projection basis of each level from the level below it.
#[derive(Debug, Clone, Copy)]
pub struct BasisBuilder<'a> {
    config: &'a IndexConfig,
}

impl<'a> BasisBuilder<'a> {
    pub fn new(config: &'a IndexConfig) -> Self {
        Self { config }
    }

    fn check_level(&self, operation: &'static str, level: usize) -> Result<(usize, usize)> {
        if level == 0 || level > self.config.levels() {
            return Err(StrataError::precondition(
                operation,
                format!(
                    "level {level} is not a reduction level (1..={})",
                    self.config.levels()
                ),
            ));
        }
        Ok((
            self.config.dimension_of(level - 1)?,
            self.config.window_of(level)?,
        ))
    }

    /// Mean of every component of level `level - 1`, in one streaming pass
    /// read `block_size` rows at a time.
    pub fn compute_mean<S: VectorStore + ?Sized>(
        &self,
        store: &S,
        level: usize,
        block_size: usize,
    ) -> Result<Array1<f64>> {
        let (prev_dim, _) = self.check_level("compute_mean", level)?;
        let mut acc = MeanAccumulator::new(prev_dim);
        for_each_chunk(store, level - 1, block_size, |_, _, rows| {
            rows.iter().try_for_each(|row| acc.push(row))
        })?;
        debug!(level, vectors = acc.count(), "computed mean");
        acc.finish()
    }

    /// Sample covariance of every `windowᵢ` block of level `level - 1`.
    pub fn compute_covariance<S: VectorStore + ?Sized>(
        &self,
        store: &S,
        level: usize,
        block_size: usize,
        means: &Array1<f64>,
    ) -> Result<Vec<Array2<f64>>> {
        let (prev_dim, window) = self.check_level("compute_covariance", level)?;
        if means.len() != prev_dim {
            return Err(StrataError::DimensionMismatch {
                expected: prev_dim,
                actual: means.len(),
            });
        }
        let mut acc = CovarianceAccumulator::new(window, means.clone())?;
        for_each_chunk(store, level - 1, block_size, |_, _, rows| {
            rows.iter().try_for_each(|row| acc.push(row))
        })?;
        debug!(level, vectors = acc.count(), window, "computed covariance");
        acc.finish()
    }

    /// Dominant eigenpair of one covariance matrix.
    pub fn eigen_decompose(&self, covariance: &Array2<f64>) -> Result<EigenPair> {
        eigen::dominant(covariance)
    }

    /// Rank-1 projector `v·vᵀ`.
    pub fn build_projection_matrix(&self, eigenvector: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        if eigenvector.is_empty() {
            return Err(StrataError::precondition(
                "build_projection_matrix",
                "empty eigenvector",
            ));
        }
        let column = eigenvector.insert_axis(Axis(1));
        Ok(column.dot(&column.t()))
    }

    /// Build and persist the basis of `level` from level `level - 1`.
    ///
    /// Means (and the covariance, with `keep_covariance`) are stored as
    /// transient artifacts of the level; the caller removes them with
    /// [`VectorStore::delete_artifact`] once the level is projected.
    pub fn build<S: VectorStore + ?Sized>(&self, store: &mut S, level: usize) -> Result<Basis> {
        let (prev_dim, window) = self
            .check_level("build_basis", level)
            .map_err(|e| e.in_stage(Stage::Basis { level }))?;
        let blocks = prev_dim / window;

        let basis = match self.config.projection {
            ProjectionKind::Fixed => Basis::fixed(level, window, blocks),
            ProjectionKind::Pca => {
                let chunk = self.config.chunk_size;
                let means = self
                    .compute_mean(&*store, level, chunk)
                    .and_then(|means| {
                        artifacts::save_means(store, level, &means)?;
                        Ok(means)
                    })
                    .map_err(|e| e.in_stage(Stage::Mean { level }))?;

                let covariance = self
                    .compute_covariance(&*store, level, chunk, &means)
                    .and_then(|cov| {
                        if self.config.keep_covariance {
                            artifacts::save_covariance(store, level, &cov)?;
                        }
                        Ok(cov)
                    })
                    .map_err(|e| e.in_stage(Stage::Covariance { level }))?;

                let (eigenvalues, matrices): (Vec<f64>, Vec<Array2<f64>>) = covariance
                    .iter()
                    .map(|cov| {
                        let pair = self.eigen_decompose(cov)?;
                        let matrix = self.build_projection_matrix(pair.vector.view())?;
                        Ok((pair.value, matrix))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| e.in_stage(Stage::Basis { level }))?
                    .into_iter()
                    .unzip();

                Basis {
                    level,
                    window,
                    kind: ProjectionKind::Pca,
                    matrices,
                    eigenvalues,
                }
            }
        };

        artifacts::save_basis(store, &basis).map_err(|e| e.in_stage(Stage::Basis { level }))?;
        info!(level, window, blocks, kind = %basis.kind, "built projection basis");
        Ok(basis)
    }
}
