//! In-memory store.
//!
//! Each level is a table keyed by vector ID, the same shape as a relational
//! table with an identity column. Range reads are ordered key scans and point
//! reads are key lookups. The layout of a level is recorded but does not
//! change how rows are kept.

use super::{ArtifactKey, LevelInfo, LevelLayout, VectorStore};
use crate::error::{Result, StrataError, StorageContext};
use crate::persistence::PersistenceError;
use crate::VectorId;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Table {
    info: LevelInfo,
    rows: BTreeMap<VectorId, Vec<f64>>,
}

/// Vector store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    levels: BTreeMap<usize, Table>,
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels currently held, coarsest last.
    pub fn levels(&self) -> Vec<usize> {
        self.levels.keys().copied().collect()
    }

    /// Whether an artifact is present.
    pub fn has_artifact(&self, key: &ArtifactKey) -> bool {
        self.artifacts.contains_key(&key.path())
    }

    fn table(&self, operation: &'static str, level: usize) -> Result<&Table> {
        self.levels
            .get(&level)
            .ok_or_else(|| missing_level(operation, level))
    }
}

fn missing_level(operation: &'static str, level: usize) -> StrataError {
    StrataError::StorageUnavailable {
        operation,
        source: PersistenceError::NotFound(format!("level {level}")),
    }
}

impl VectorStore for MemoryStore {
    fn create_level(&mut self, level: usize, dimension: usize, layout: LevelLayout) -> Result<()> {
        if dimension == 0 {
            return Err(StrataError::precondition(
                "create_level",
                format!("level {level} has zero dimension"),
            ));
        }
        self.levels.insert(
            level,
            Table {
                info: LevelInfo::new(level, dimension, layout),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn put_chunk(
        &mut self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        rows: &[Vec<f64>],
    ) -> Result<()> {
        let table = self
            .levels
            .get_mut(&level)
            .ok_or_else(|| missing_level("put_chunk", level))?;
        let extent = table.info.check_append(shard, id_start, rows)?;
        for (offset, row) in rows.iter().enumerate() {
            table.rows.insert(id_start + offset as u64, row.clone());
        }
        if shard < table.info.shards.len() {
            table.info.shards[shard] = extent;
        } else {
            table.info.shards.push(extent);
        }
        Ok(())
    }

    fn get_range(
        &self,
        level: usize,
        shard: usize,
        id_start: VectorId,
        id_end: VectorId,
    ) -> Result<Vec<Vec<f64>>> {
        let table = self.table("get_range", level)?;
        table.info.check_range(shard, id_start, id_end)?;
        Ok(table
            .rows
            .range(id_start..id_end)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn get_by_id(&self, level: usize, id: VectorId) -> Result<Vec<f64>> {
        self.table("get_by_id", level)?
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("level {level} id {id}")))
            .storage("get_by_id")
    }

    fn delete_artifact(&mut self, level: usize) -> Result<()> {
        for key in ArtifactKey::transient(level) {
            self.artifacts.remove(&key.path());
        }
        Ok(())
    }

    fn delete_level(&mut self, level: usize) -> Result<()> {
        self.levels.remove(&level);
        Ok(())
    }

    fn put_artifact(&mut self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.artifacts.insert(key.path(), bytes.to_vec());
        Ok(())
    }

    fn get_artifact(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        self.artifacts
            .get(&key.path())
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(key.path()))
            .storage("get_artifact")
    }

    fn level_info(&self, level: usize) -> Result<LevelInfo> {
        Ok(self.table("level_info", level)?.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::for_each_chunk;

    fn rows(start: usize, n: usize) -> Vec<Vec<f64>> {
        (start..start + n).map(|i| vec![i as f64, -(i as f64)]).collect()
    }

    #[test]
    fn chunks_and_point_reads() {
        let mut store = MemoryStore::new();
        store.create_level(0, 2, LevelLayout::PerVector).unwrap();
        store.put_chunk(0, 0, 1, &rows(1, 2)).unwrap();
        store.put_chunk(0, 0, 3, &rows(3, 1)).unwrap();
        store.put_chunk(0, 1, 4, &rows(4, 2)).unwrap();

        let info = store.level_info(0).unwrap();
        assert_eq!(info.total_vectors(), 5);
        assert_eq!(info.shards[1].range(), 4..6);

        assert_eq!(store.get_by_id(0, 4).unwrap(), vec![4.0, -4.0]);
        assert_eq!(store.get_range(0, 0, 2, 4).unwrap(), rows(2, 2));
        assert!(store.get_range(0, 0, 2, 5).is_err());
        assert!(matches!(
            store.get_by_id(0, 9),
            Err(StrataError::StorageUnavailable { operation: "get_by_id", .. })
        ));
    }

    #[test]
    fn gaps_are_rejected() {
        let mut store = MemoryStore::new();
        store.create_level(0, 2, LevelLayout::PerVector).unwrap();
        assert!(matches!(
            store.put_chunk(0, 0, 2, &rows(2, 1)),
            Err(StrataError::PreconditionViolation { .. })
        ));
        assert!(store.put_chunk(1, 0, 1, &rows(1, 1)).is_err());
    }

    #[test]
    fn scan_visits_all_rows_in_order() {
        let mut store = MemoryStore::new();
        store.create_level(2, 2, LevelLayout::Concatenated).unwrap();
        store.put_chunk(2, 0, 1, &rows(1, 4)).unwrap();
        store.put_chunk(2, 1, 5, &rows(5, 3)).unwrap();

        let mut seen = Vec::new();
        for_each_chunk(&store, 2, 3, |_, start, chunk| {
            for (i, row) in chunk.iter().enumerate() {
                assert_eq!(row[0], (start + i as u64) as f64);
                seen.push(start + i as u64);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn transient_artifacts_are_deleted() {
        let mut store = MemoryStore::new();
        store.put_artifact(&ArtifactKey::Basis { level: 1 }, b"b").unwrap();
        store.put_artifact(&ArtifactKey::Means { level: 1 }, b"m").unwrap();
        store
            .put_artifact(&ArtifactKey::Covariance { level: 1 }, b"c")
            .unwrap();
        store.delete_artifact(1).unwrap();
        assert!(store.has_artifact(&ArtifactKey::Basis { level: 1 }));
        assert!(!store.has_artifact(&ArtifactKey::Means { level: 1 }));
        assert!(store.get_artifact(&ArtifactKey::Covariance { level: 1 }).is_err());
    }

    #[test]
    fn delete_level_drops_rows() {
        let mut store = MemoryStore::new();
        store.create_level(1, 2, LevelLayout::PerVector).unwrap();
        store.put_chunk(1, 0, 1, &rows(1, 1)).unwrap();
        store.delete_level(1).unwrap();
        assert!(store.level_info(1).is_err());
        assert!(store.levels().is_empty());
    }
}
