//! End-to-end tests: build an index, then query it.
//!
//! Every scenario runs against the in-memory store and the directory store
//! (in-memory and on-disk directories).

use std::cell::Cell;
use strata::persistence::{Directory, FsDirectory, MemoryDirectory};
use strata::store::{ArtifactKey, LevelInfo};
use strata::{
    DirectoryStore, IndexConfig, Indexer, LevelLayout, MemoryStore, Norm, Projector,
    QueryEngine, Result, Stage, StrataError, VectorStore,
};
use tempfile::TempDir;

fn dataset() -> Vec<Vec<f64>> {
    vec![
        vec![1.0, 2.0, 3.0, 4.0],
        vec![2.0, 0.0, 1.0, 3.0],
        vec![-1.0, 4.0, 0.0, 2.0],
    ]
}

fn config() -> IndexConfig {
    IndexConfig::new(4, 3, vec![2, 2]).with_norm(Norm::L2)
}

fn l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Runs `check` against every backend.
fn for_each_backend(check: impl Fn(&mut dyn VectorStore)) {
    check(&mut MemoryStore::new());
    check(&mut DirectoryStore::open(MemoryDirectory::new()).expect("open"));
    let temp_dir = TempDir::new().expect("tempdir");
    let dir = FsDirectory::new(temp_dir.path()).expect("fs directory");
    check(&mut DirectoryStore::open(dir).expect("open"));
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn scenario_a_large_epsilon_returns_everything() {
    for_each_backend(|store| {
        let cfg = config();
        Indexer::new(&cfg).unwrap().run(store, dataset()).unwrap();

        let query = [0.0, 1.0, 2.0, 3.0];
        let outcome = QueryEngine::new(&*store, cfg).unwrap().query(&query, 1e9).unwrap();
        let results = outcome.into_results();
        assert_eq!(results.len(), 3);

        let mut expected: Vec<(u64, f64)> = dataset()
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64 + 1, l2(v, &query)))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (hit, (id, distance)) in results.iter().zip(&expected) {
            assert_eq!(hit.id, *id);
            assert!((hit.distance - distance).abs() < 1e-12);
        }
        // Nearest first.
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    });
}

#[test]
fn scenario_b_zero_epsilon_finds_the_query_vector() {
    for_each_backend(|store| {
        let cfg = config();
        Indexer::new(&cfg).unwrap().run(store, dataset()).unwrap();

        let outcome = QueryEngine::new(&*store, cfg)
            .unwrap()
            .query(&dataset()[1], 0.0)
            .unwrap();
        let results = outcome.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 2);
        assert_eq!(results[0].distance, 0.0);
    });
}

#[test]
fn l1_index_matches_exact_l1_distances() {
    for_each_backend(|store| {
        let cfg = config().with_norm(Norm::L1);
        Indexer::new(&cfg).unwrap().run(store, dataset()).unwrap();
        let query = [1.0, 1.0, 1.0, 1.0];
        let outcome = QueryEngine::new(&*store, cfg).unwrap().query(&query, 1e9).unwrap();
        for hit in outcome.results.iter() {
            let v = &dataset()[(hit.id - 1) as usize];
            assert_eq!(hit.distance, Norm::L1.distance(v, &query));
        }
        assert_eq!(outcome.len(), 3);
    });
}

// =============================================================================
// Build properties
// =============================================================================

fn level_rows(store: &dyn VectorStore, level: usize) -> Vec<Vec<f64>> {
    let info: LevelInfo = store.level_info(level).unwrap();
    let mut rows = Vec::new();
    for (shard, extent) in info.shards.iter().enumerate() {
        rows.extend(store.get_range(level, shard, extent.start, extent.end()).unwrap());
    }
    rows
}

fn bits(rows: &[Vec<f64>]) -> Vec<Vec<u64>> {
    rows.iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect())
        .collect()
}

fn wide_dataset(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            (0..8)
                .map(|j| ((i * 31 + j * 17) % 13) as f64 * 0.37 - (j as f64) * 0.11)
                .collect()
        })
        .collect()
}

#[test]
fn chunk_size_does_not_change_levels() {
    let n = 9;
    let base = IndexConfig::new(8, n as u64, vec![2, 2]);

    let mut one = MemoryStore::new();
    let cfg_one = base.clone().with_chunk_size(1);
    Indexer::new(&cfg_one).unwrap().run(&mut one, wide_dataset(n)).unwrap();

    let mut all = DirectoryStore::open(MemoryDirectory::new()).unwrap();
    let cfg_all = base.with_chunk_size(n);
    Indexer::new(&cfg_all).unwrap().run(&mut all, wide_dataset(n)).unwrap();

    for level in 0..=2 {
        assert_eq!(
            bits(&level_rows(&one, level)),
            bits(&level_rows(&all, level)),
            "level {level}"
        );
    }
    assert_eq!(
        one.get_artifact(&ArtifactKey::Basis { level: 2 }).unwrap(),
        all.get_artifact(&ArtifactKey::Basis { level: 2 }).unwrap()
    );
}

#[test]
fn sharding_does_not_change_results() {
    let n = 10;
    let query = wide_dataset(n)[4].clone();

    let mut results = Vec::new();
    for shards in [1, 3] {
        let cfg = IndexConfig::new(8, n as u64, vec![4])
            .with_shard_count(shards)
            .with_chunk_size(2);
        let mut store = MemoryStore::new();
        Indexer::new(&cfg).unwrap().run(&mut store, wide_dataset(n)).unwrap();
        assert_eq!(store.level_info(1).unwrap().shards.len(), shards);
        let outcome = QueryEngine::new(&store, cfg).unwrap().query(&query, 2.5).unwrap();
        results.push(outcome.into_results());
    }
    assert_eq!(results[0], results[1]);
    assert!(results[0].iter().any(|c| c.id == 5 && c.distance == 0.0));
}

#[test]
fn query_projection_matches_indexed_rows() {
    let n = 6;
    let cfg = IndexConfig::new(8, n as u64, vec![2, 4]);
    let mut store = MemoryStore::new();
    Indexer::new(&cfg).unwrap().run(&mut store, wide_dataset(n)).unwrap();

    let projector = Projector::new(&cfg);
    for (i, row) in wide_dataset(n).iter().enumerate() {
        let id = i as u64 + 1;
        let first = projector.project_query(&store, row).unwrap();
        let second = projector.project_query(&store, row).unwrap();
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(first[1], store.get_by_id(1, id).unwrap());
        assert_eq!(first[2], store.get_range(2, 0, id, id + 1).unwrap()[0]);
    }
}

#[test]
fn terminal_level_is_concatenated() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = DirectoryStore::open(FsDirectory::new(temp_dir.path()).unwrap()).unwrap();
    Indexer::new(&config()).unwrap().run(&mut store, dataset()).unwrap();

    assert!(temp_dir.path().join("level_2/shard_0.dat").exists());
    assert!(temp_dir.path().join("level_1/vectors/3.vec").exists());
    assert!(temp_dir.path().join("level_0/vectors/1.vec").exists());
    assert!(temp_dir.path().join("manifest.json").exists());
    assert!(temp_dir.path().join("artifacts/basis_1.json").exists());
    assert!(!temp_dir.path().join("artifacts/means_1.json").exists());
    assert_eq!(store.level_info(2).unwrap().layout, LevelLayout::Concatenated);

    // A reopened store answers queries from its manifest.
    drop(store);
    let store = DirectoryStore::open(FsDirectory::new(temp_dir.path()).unwrap()).unwrap();
    let outcome = QueryEngine::open(&store).unwrap().query(&dataset()[0], 0.0).unwrap();
    assert_eq!(outcome.results.ids(), vec![1]);
}

// =============================================================================
// Query behaviour
// =============================================================================

/// Store wrapper counting point reads.
struct CountingStore {
    inner: MemoryStore,
    point_reads: Cell<usize>,
}

impl VectorStore for CountingStore {
    fn create_level(&mut self, level: usize, dimension: usize, layout: LevelLayout) -> Result<()> {
        self.inner.create_level(level, dimension, layout)
    }

    fn put_chunk(&mut self, level: usize, shard: usize, id_start: u64, rows: &[Vec<f64>]) -> Result<()> {
        self.inner.put_chunk(level, shard, id_start, rows)
    }

    fn get_range(&self, level: usize, shard: usize, id_start: u64, id_end: u64) -> Result<Vec<Vec<f64>>> {
        self.inner.get_range(level, shard, id_start, id_end)
    }

    fn get_by_id(&self, level: usize, id: u64) -> Result<Vec<f64>> {
        self.point_reads.set(self.point_reads.get() + 1);
        self.inner.get_by_id(level, id)
    }

    fn delete_artifact(&mut self, level: usize) -> Result<()> {
        self.inner.delete_artifact(level)
    }

    fn delete_level(&mut self, level: usize) -> Result<()> {
        self.inner.delete_level(level)
    }

    fn put_artifact(&mut self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.inner.put_artifact(key, bytes)
    }

    fn get_artifact(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        self.inner.get_artifact(key)
    }

    fn level_info(&self, level: usize) -> Result<LevelInfo> {
        self.inner.level_info(level)
    }
}

#[test]
fn empty_bootstrap_skips_refinement_reads() {
    let cfg = config();
    let mut store = CountingStore {
        inner: MemoryStore::new(),
        point_reads: Cell::new(0),
    };
    Indexer::new(&cfg).unwrap().run(&mut store, dataset()).unwrap();

    let outcome = QueryEngine::new(&store, cfg)
        .unwrap()
        .query(&[1000.0, 1000.0, 1000.0, 1000.0], 0.0)
        .unwrap();
    assert!(outcome.is_empty());
    assert!(outcome.stats.terminated_early);
    assert_eq!(outcome.stats.point_reads, 0);
    assert_eq!(store.point_reads.get(), 0);
}

#[test]
fn refinement_reads_only_candidates() {
    let cfg = config();
    let mut store = CountingStore {
        inner: MemoryStore::new(),
        point_reads: Cell::new(0),
    };
    Indexer::new(&cfg).unwrap().run(&mut store, dataset()).unwrap();

    let outcome = QueryEngine::new(&store, cfg)
        .unwrap()
        .query(&[0.0, 0.0, 0.0, 0.0], 1e9)
        .unwrap();
    // Three candidates refined at levels 1 and 0.
    assert_eq!(store.point_reads.get(), 6);
    assert_eq!(outcome.stats.point_reads, 6);
    assert!(!outcome.stats.terminated_early);
}

#[test]
fn candidate_counts_never_grow() {
    let n = 12;
    let cfg = IndexConfig::new(8, n as u64, vec![2, 2, 2]).with_chunk_size(5);
    let mut store = MemoryStore::new();
    Indexer::new(&cfg).unwrap().run(&mut store, wide_dataset(n)).unwrap();
    let engine = QueryEngine::new(&store, cfg).unwrap();

    for (i, query) in wide_dataset(n).iter().enumerate() {
        for eps in [0.0, 0.5, 1.0, 2.0, 4.0] {
            let outcome = engine.query(query, eps).unwrap();
            let levels = &outcome.stats.levels;
            assert_eq!(levels[0].level, 3);
            assert_eq!(levels[0].examined, n as u64);
            for pair in levels.windows(2) {
                assert_eq!(pair[1].level + 1, pair[0].level);
                assert_eq!(pair[1].examined, pair[0].survivors);
                assert!(pair[1].survivors <= pair[0].survivors);
            }
            // No false positives and the query vector itself is always found.
            for hit in outcome.results.iter() {
                assert!(hit.distance <= eps);
            }
            assert!(outcome.results.iter().any(|c| c.id == i as u64 + 1));
        }
    }
}

#[test]
fn missing_record_aborts_query() {
    let mut store = DirectoryStore::open(MemoryDirectory::new()).unwrap();
    let cfg = config();
    Indexer::new(&cfg).unwrap().run(&mut store, dataset()).unwrap();
    store.directory().delete("level_0/vectors/2.vec").unwrap();

    let err = QueryEngine::new(&store, cfg)
        .unwrap()
        .query(&[0.0, 0.0, 0.0, 0.0], 1e9)
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Refine { level: 0 }));
    assert!(matches!(
        err.root(),
        StrataError::StorageUnavailable {
            operation: "get_by_id",
            ..
        }
    ));
}

#[test]
fn wrong_query_dimension_is_rejected() {
    let cfg = config();
    let mut store = MemoryStore::new();
    Indexer::new(&cfg).unwrap().run(&mut store, dataset()).unwrap();
    let err = QueryEngine::new(&store, cfg)
        .unwrap()
        .query(&[0.0, 0.0, 0.0], 1.0)
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::QueryProjection));
    assert!(matches!(
        err.root(),
        StrataError::DimensionMismatch { expected: 4, actual: 3 }
    ));
}
