//! File-backed store over a [`Directory`].
//!
//! Each level is a directory `level_{L}` with a `meta.json` describing its
//! dimension, layout and shard extents. Per-vector levels keep one record
//! file per ID under `vectors/`; concatenated levels keep one file per shard.
//! See [`crate::persistence::format`] for the record encoding.

use super::{scan_by_range, ArtifactKey, LevelInfo, LevelLayout, VectorStore};
use crate::error::{Result, StorageContext, StrataError};
use crate::persistence::format::{self, DATASET_MAGIC, VECTOR_MAGIC};
use crate::persistence::{Directory, PersistenceError, PersistenceResult};
use crate::VectorId;
use std::collections::BTreeMap;
use std::io::{BufReader, Read, Write};
use tracing::debug;

/// Vector store laid out as files in a [`Directory`].
pub struct DirectoryStore<D: Directory> {
    dir: D,
    levels: BTreeMap<usize, LevelInfo>,
}

fn level_dir(level: usize) -> String {
    format!("level_{level}")
}

fn meta_path(level: usize) -> String {
    format!("level_{level}/meta.json")
}

fn vectors_dir(level: usize) -> String {
    format!("level_{level}/vectors")
}

fn vector_path(level: usize, id: VectorId) -> String {
    format!("level_{level}/vectors/{id}.vec")
}

fn shard_path(level: usize, shard: usize) -> String {
    format!("level_{level}/shard_{shard}.dat")
}

impl<D: Directory> DirectoryStore<D> {
    /// Open a store, loading the metadata of every level already present.
    ///
    /// Levels are built bottom-up, so discovery stops at the first level
    /// without metadata.
    pub fn open(dir: D) -> Result<Self> {
        let mut levels = BTreeMap::new();
        let mut level = 0;
        while dir.exists(&meta_path(level)) {
            let bytes = dir.read_all(&meta_path(level)).storage("open")?;
            let info: LevelInfo = serde_json::from_slice(&bytes)
                .map_err(PersistenceError::from)
                .storage("open")?;
            levels.insert(level, info);
            level += 1;
        }
        debug!(levels = levels.len(), "opened directory store");
        Ok(Self { dir, levels })
    }

    pub fn directory(&self) -> &D {
        &self.dir
    }

    fn info(&self, operation: &'static str, level: usize) -> Result<&LevelInfo> {
        self.levels.get(&level).ok_or_else(|| StrataError::StorageUnavailable {
            operation,
            source: PersistenceError::NotFound(format!("level {level}")),
        })
    }

    fn write_meta(&self, info: &LevelInfo) -> PersistenceResult<()> {
        let bytes = serde_json::to_vec_pretty(info)?;
        self.dir.atomic_write(&meta_path(info.level), &bytes)
    }

    fn write_vectors(
        &self,
        level: usize,
        dimension: usize,
        id_start: VectorId,
        rows: &[Vec<f64>],
    ) -> PersistenceResult<()> {
        for (offset, row) in rows.iter().enumerate() {
            let mut w = self.dir.create_file(&vector_path(level, id_start + offset as u64))?;
            format::write_header(&mut w, VECTOR_MAGIC, dimension)?;
            format::write_values(&mut w, row)?;
            w.flush()?;
        }
        Ok(())
    }

    fn append_shard(
        &self,
        level: usize,
        shard: usize,
        dimension: usize,
        fresh: bool,
        rows: &[Vec<f64>],
    ) -> PersistenceResult<()> {
        let path = shard_path(level, shard);
        let mut w = if fresh {
            let mut w = self.dir.create_file(&path)?;
            format::write_header(&mut w, DATASET_MAGIC, dimension)?;
            w
        } else {
            self.dir.append_file(&path)?
        };
        for row in rows {
            format::write_values(&mut w, row)?;
        }
        w.flush()?;
        Ok(())
    }

    fn read_vector(
        &self,
        level: usize,
        dimension: usize,
        id: VectorId,
    ) -> PersistenceResult<Vec<f64>> {
        let mut r = BufReader::new(self.dir.open_file(&vector_path(level, id))?);
        let stored = format::read_header(&mut r, VECTOR_MAGIC)?;
        if stored != dimension {
            return Err(PersistenceError::Format(format!(
                "vector {id} of level {level} has dimension {stored}, expected {dimension}"
            )));
        }
        format::read_values(&mut r, dimension)
    }

    /// Open a shard file positioned after its header.
    fn open_shard(
        &self,
        level: usize,
        shard: usize,
        dimension: usize,
    ) -> PersistenceResult<BufReader<Box<dyn Read>>> {
        let mut r = BufReader::new(self.dir.open_file(&shard_path(level, shard))?);
        let stored = format::read_header(&mut r, DATASET_MAGIC)?;
        if stored != dimension {
            return Err(PersistenceError::Format(format!(
                "shard {shard} of level {level} has dimension {stored}, expected {dimension}"
            )));
        }
        Ok(r)
    }

    /// Read `count` rows from a shard file, starting `skip` rows in.
    fn read_shard(
        &self,
        level: usize,
        shard: usize,
        dimension: usize,
        skip: u64,
        count: u64,
    ) -> PersistenceResult<Vec<Vec<f64>>> {
        let mut r = self.open_shard(level, shard, dimension)?;
        format::skip_values(&mut r, dimension, skip)?;
        (0..count)
            .map(|_| format::read_values(&mut r, dimension))
            .collect()
    }
}

impl<D: Directory> VectorStore for DirectoryStore<D> {
    fn create_level(&mut self, level: usize, dimension: usize, layout: LevelLayout) -> Result<()> {
        if dimension == 0 {
            return Err(StrataError::precondition(
                "create_level",
                format!("level {level} has zero dimension"),
            ));
        }
        self.dir.delete_dir_all(&level_dir(level)).storage("create_level")?;
        self.dir.create_dir_all(&level_dir(level)).storage("create_level")?;
        if layout == LevelLayout::PerVector {
            self.dir.create_dir_all(&vectors_dir(level)).storage("create_level")?;
        }
        let info = LevelInfo::new(level, dimension, layout);
        self.write_meta(&info).storage("create_level")?;
        self.levels.insert(level, info);
        Ok(())
    }

    fn put_chunk(
        &mut self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        rows: &[Vec<f64>],
    ) -> Result<()> {
        let info = self.info("put_chunk", level)?;
        let extent = info.check_append(shard, id_start, rows)?;
        let (dimension, layout) = (info.dimension, info.layout);
        let fresh = shard >= info.shards.len();

        let written = match layout {
            LevelLayout::PerVector => self.write_vectors(level, dimension, id_start, rows),
            LevelLayout::Concatenated => self.append_shard(level, shard, dimension, fresh, rows),
        };
        written.storage("put_chunk")?;

        let mut info = self.info("put_chunk", level)?.clone();
        if fresh {
            info.shards.push(extent);
        } else {
            info.shards[shard] = extent;
        }
        self.write_meta(&info).storage("put_chunk")?;
        self.levels.insert(level, info);
        Ok(())
    }

    fn get_range(
        &self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        id_end: VectorId,
    ) -> Result<Vec<Vec<f64>>> {
        let info = self.info("get_range", level)?;
        let extent = info.check_range(shard, id_start, id_end)?;
        let rows = match info.layout {
            LevelLayout::PerVector => (id_start..id_end)
                .map(|id| self.read_vector(level, info.dimension, id))
                .collect::<PersistenceResult<Vec<_>>>(),
            LevelLayout::Concatenated => self.read_shard(
                level,
                shard,
                info.dimension,
                id_start - extent.start,
                id_end - id_start,
            ),
        };
        rows.storage("get_range")
    }

    fn get_by_id(&self, level: usize, id: VectorId) -> Result<Vec<f64>> {
        let info = self.info("get_by_id", level)?;
        let row = match info.layout {
            LevelLayout::PerVector => self.read_vector(level, info.dimension, id),
            LevelLayout::Concatenated => match info.shard_of(id) {
                Some(shard) => self
                    .read_shard(level, shard, info.dimension, id - info.shards[shard].start, 1)
                    .and_then(|mut rows| {
                        rows.pop().ok_or_else(|| {
                            PersistenceError::Format(format!("shard {shard} is empty"))
                        })
                    }),
                None => Err(PersistenceError::NotFound(format!("level {level} id {id}"))),
            },
        };
        row.storage("get_by_id")
    }

    fn delete_artifact(&mut self, level: usize) -> Result<()> {
        for key in ArtifactKey::transient(level) {
            self.dir.delete(&key.path()).storage("delete_artifact")?;
        }
        Ok(())
    }

    fn delete_level(&mut self, level: usize) -> Result<()> {
        self.dir.delete_dir_all(&level_dir(level)).storage("delete_level")?;
        self.levels.remove(&level);
        Ok(())
    }

    fn put_artifact(&mut self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.dir.atomic_write(&key.path(), bytes).storage("put_artifact")
    }

    fn get_artifact(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        self.dir.read_all(&key.path()).storage("get_artifact")
    }

    fn level_info(&self, level: usize) -> Result<LevelInfo> {
        self.info("level_info", level).cloned()
    }

    /// A concatenated shard is read front to back through one open file.
    fn scan_shard(
        &self,
        level: usize,
        shard: usize,
        chunk_size: usize,
        visit: &mut dyn FnMut(VectorId, Vec<Vec<f64>>) -> Result<()>,
    ) -> Result<()> {
        let info = self.info("scan", level)?;
        if info.layout == LevelLayout::PerVector || chunk_size == 0 {
            return scan_by_range(self, level, shard, chunk_size, visit);
        }
        let extent = info.shards.get(shard).copied().ok_or_else(|| {
            StrataError::precondition("scan", format!("level {level} has no shard {shard}"))
        })?;
        if extent.count == 0 {
            return Ok(());
        }
        let dimension = info.dimension;
        let mut r = self.open_shard(level, shard, dimension).storage("scan")?;
        let mut start = extent.start;
        while start < extent.end() {
            let end = (start + chunk_size as u64).min(extent.end());
            let rows = (start..end)
                .map(|_| format::read_values(&mut r, dimension))
                .collect::<PersistenceResult<Vec<_>>>()
                .storage("scan")?;
            visit(start, rows)?;
            start = end;
        }
        Ok(())
    }
}
