//! Index build: ingest level 0, then build and apply one basis per level.
//!
//! ```text
//! ingest ──► level 0
//! for i in 1..=k:
//!     basis(i)   ◄── mean / covariance / eigen over level i-1
//!     level i    ◄── project level i-1 with basis(i)
//!     drop transient artifacts of level i
//! manifest
//! ```
//!
//! The first failure stops the build. The error names the failing stage and
//! the partially written level of that stage is removed.

use crate::basis::BasisBuilder;
use crate::config::IndexConfig;
use crate::error::{Result, Stage, StrataError};
use crate::persistence::{artifacts, IndexManifest};
use crate::projection::Projector;
use crate::store::VectorStore;
use tracing::{debug, info, warn};

/// Builds the multilevel index described by an [`IndexConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Indexer<'a> {
    config: &'a IndexConfig,
}

impl<'a> Indexer<'a> {
    /// Validates the configuration; no store is touched yet.
    pub fn new(config: &'a IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IndexConfig {
        self.config
    }

    /// Write the original vectors as level 0, assigning IDs `1..=N` and
    /// splitting them into the configured shards.
    pub fn ingest<S, I>(&self, store: &mut S, rows: I) -> Result<u64>
    where
        S: VectorStore + ?Sized,
        I: IntoIterator<Item = Vec<f64>>,
    {
        let result = self.ingest_inner(store, rows);
        if result.is_err() {
            if let Err(cleanup) = store.delete_level(0) {
                warn!(error = %cleanup, "failed to remove partial level 0");
            }
        }
        result.map_err(|e| e.in_stage(Stage::Ingest))
    }

    fn ingest_inner<S, I>(&self, store: &mut S, rows: I) -> Result<u64>
    where
        S: VectorStore + ?Sized,
        I: IntoIterator<Item = Vec<f64>>,
    {
        let layout = self.config.shard_layout();
        let chunk_size = self.config.chunk_size;
        store.create_level(
            0,
            self.config.dimension,
            Projector::new(self.config).layout_of(0),
        )?;

        let mut buffer: Vec<Vec<f64>> = Vec::with_capacity(chunk_size.min(1 << 16));
        let mut buffer_shard = 0;
        let mut buffer_start = 1;
        let mut next_id: u64 = 1;

        for row in rows {
            if row.len() != self.config.dimension {
                return Err(StrataError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: row.len(),
                });
            }
            let shard = layout.shard_of(next_id).ok_or_else(|| {
                StrataError::precondition(
                    "ingest",
                    format!("dataset has more than {} vectors", self.config.num_vectors),
                )
            })?;
            if !buffer.is_empty() && (shard != buffer_shard || buffer.len() == chunk_size) {
                store.put_chunk(0, buffer_shard, buffer_start, &buffer)?;
                debug!(shard = buffer_shard, start = buffer_start, rows = buffer.len(), "ingested chunk");
                buffer.clear();
            }
            if buffer.is_empty() {
                buffer_shard = shard;
                buffer_start = next_id;
            }
            buffer.push(row);
            next_id += 1;
        }
        if !buffer.is_empty() {
            store.put_chunk(0, buffer_shard, buffer_start, &buffer)?;
        }

        let ingested = next_id - 1;
        if ingested != self.config.num_vectors {
            return Err(StrataError::precondition(
                "ingest",
                format!(
                    "dataset has {ingested} vectors, configured {}",
                    self.config.num_vectors
                ),
            ));
        }
        info!(vectors = ingested, shards = layout.shard_count(), "ingested level 0");
        Ok(ingested)
    }

    /// Build every reduction level from level 0.
    pub fn build_levels<S: VectorStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let builder = BasisBuilder::new(self.config);
        let projector = Projector::new(self.config);
        for level in 1..=self.config.levels() {
            let built = builder.build(store, level).and_then(|_| {
                // Project with the stored copy, the one queries will load.
                let basis = artifacts::load_basis(&*store, level)
                    .map_err(|e| e.in_stage(Stage::Basis { level }))?;
                projector.project_level(store, &basis)
            });
            if let Err(err) = built {
                if let Err(cleanup) = store.delete_artifact(level) {
                    warn!(level, error = %cleanup, "failed to remove transient artifacts");
                }
                return Err(err);
            }
            store
                .delete_artifact(level)
                .map_err(|e| e.in_stage(Stage::Projection { level }))?;
            debug!(level, "level complete");
        }
        Ok(())
    }

    /// Ingest, build every level and write the manifest.
    pub fn run<S, I>(&self, store: &mut S, rows: I) -> Result<IndexManifest>
    where
        S: VectorStore + ?Sized,
        I: IntoIterator<Item = Vec<f64>>,
    {
        info!(
            dimension = self.config.dimension,
            vectors = self.config.num_vectors,
            levels = self.config.levels(),
            norm = %self.config.norm,
            "building index"
        );
        self.ingest(store, rows)?;
        self.build_levels(store)?;
        let manifest = IndexManifest::new(self.config);
        artifacts::save_manifest(store, &manifest).map_err(|e| e.in_stage(Stage::Manifest))?;
        info!(dimensions = ?manifest.dimensions, "index complete");
        Ok(manifest)
    }
}
