//! Progressive epsilon-range queries.
//!
//! The query runs coarse to fine:
//!
//! 1. **Bootstrap** at the terminal level `k`: scan every vector and keep
//!    those within `epsilon` of the query's level-`k` projection.
//! 2. **Refine** at levels `k-1, …, 0`: re-read each remaining candidate at
//!    that level, drop it if it is now farther than `epsilon`, otherwise
//!    update its distance. An empty set ends the query.
//! 3. Survivors of level 0 are returned sorted by their exact distance.
//!
//! With no reduction levels the bootstrap is already an exact scan.
//!
//! The coarse levels are used as a filter without a lower-bound guarantee: a
//! vector within `epsilon` at level 0 can in principle be dropped at a
//! coarser level. Results contain no false positives; recall is not
//! guaranteed to be complete.

use crate::candidates::{Candidate, CandidateSet};
use crate::config::IndexConfig;
use crate::error::{Result, Stage, StrataError};
use crate::persistence::artifacts::{self, ResultEntry};
use crate::projection::Projector;
use crate::store::{for_each_chunk, VectorStore};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Candidate counts at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStats {
    pub level: usize,
    /// Vectors whose distance was computed at this level.
    pub examined: u64,
    /// Candidates left after this level.
    pub survivors: u64,
}

/// What a query did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Bootstrap level first, then each refined level.
    pub levels: Vec<LevelStats>,
    /// Rows read by the bootstrap scan.
    pub scanned: u64,
    /// Point reads issued during refinement.
    pub point_reads: u64,
    /// The candidate set emptied before level 0 was reached.
    pub terminated_early: bool,
    /// Wall-clock time from query projection to the sorted result.
    pub elapsed: Duration,
}

/// Result of a query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Survivors sorted by ascending exact distance.
    pub results: CandidateSet,
    pub stats: QueryStats,
}

impl QueryOutcome {
    pub fn into_results(self) -> Vec<Candidate> {
        self.results.to_vec()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Persist the result list as the artifact `name`.
    pub fn save<S: VectorStore + ?Sized>(&self, store: &mut S, name: &str) -> Result<()> {
        save_results(store, name, &self.results)
    }
}

/// Persist a result list as `(id, distance)` pairs.
pub fn save_results<S: VectorStore + ?Sized>(
    store: &mut S,
    name: &str,
    results: &CandidateSet,
) -> Result<()> {
    let entries: Vec<ResultEntry> = results.iter().map(ResultEntry::from).collect();
    artifacts::save_results(store, name, &entries)
}

/// Runs queries against a built index.
pub struct QueryEngine<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    config: IndexConfig,
}

impl<'a, S: VectorStore + ?Sized> QueryEngine<'a, S> {
    pub fn new(store: &'a S, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Engine configured from the manifest stored with the index.
    pub fn open(store: &'a S) -> Result<Self> {
        let manifest = artifacts::load_manifest(store)?;
        Self::new(store, manifest.config)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// All vectors within `epsilon` of `query`, nearest first.
    pub fn query(&self, query: &[f64], epsilon: f64) -> Result<QueryOutcome> {
        if !(epsilon.is_finite() && epsilon >= 0.0) {
            return Err(StrataError::config(format!(
                "epsilon must be finite and non-negative, got {epsilon}"
            )));
        }
        let started = Instant::now();
        let projections = Projector::new(&self.config).project_query(self.store, query)?;
        let terminal = self.config.terminal_level();
        let mut stats = QueryStats::default();

        let mut candidates = self
            .bootstrap(terminal, &projections[terminal], epsilon, &mut stats)
            .map_err(|e| e.in_stage(Stage::Bootstrap { level: terminal }))?;

        if terminal == 0 {
            stats.elapsed = started.elapsed();
            info!(
                epsilon,
                results = candidates.len(),
                elapsed_us = stats.elapsed.as_micros() as u64,
                "exact scan complete"
            );
            return Ok(QueryOutcome {
                results: candidates,
                stats,
            });
        }

        for level in (0..terminal).rev() {
            if candidates.is_empty() {
                stats.terminated_early = true;
                debug!(level, "no candidates left");
                break;
            }
            self.refine(level, &projections[level], epsilon, &mut candidates, &mut stats)
                .map_err(|e| e.in_stage(Stage::Refine { level }))?;
        }

        let mut results = CandidateSet::with_capacity(candidates.len());
        for c in candidates.iter() {
            results.insert_sorted(c.id, c.distance)?;
        }
        stats.elapsed = started.elapsed();
        info!(
            epsilon,
            results = results.len(),
            point_reads = stats.point_reads,
            elapsed_us = stats.elapsed.as_micros() as u64,
            terminated_early = stats.terminated_early,
            "query complete"
        );
        Ok(QueryOutcome { results, stats })
    }

    fn distance(&self, row: &[f64], query: &[f64]) -> Result<f64> {
        if row.len() != query.len() {
            return Err(StrataError::DimensionMismatch {
                expected: query.len(),
                actual: row.len(),
            });
        }
        Ok(self.config.norm.distance(row, query))
    }

    fn bootstrap(
        &self,
        level: usize,
        query: &[f64],
        epsilon: f64,
        stats: &mut QueryStats,
    ) -> Result<CandidateSet> {
        let exact = level == 0;
        let mut set = CandidateSet::new();
        for_each_chunk(self.store, level, self.config.chunk_size, |_, start, rows| {
            for (offset, row) in rows.iter().enumerate() {
                let d = self.distance(row, query)?;
                if d <= epsilon {
                    let id = start + offset as u64;
                    if exact {
                        set.insert_sorted(id, d)?;
                    } else {
                        set.insert_head(id, d)?;
                    }
                }
            }
            stats.scanned += rows.len() as u64;
            Ok(())
        })?;
        stats.levels.push(LevelStats {
            level,
            examined: stats.scanned,
            survivors: set.len() as u64,
        });
        debug!(level, scanned = stats.scanned, candidates = set.len(), "bootstrap scan");
        Ok(set)
    }

    fn refine(
        &self,
        level: usize,
        query: &[f64],
        epsilon: f64,
        set: &mut CandidateSet,
        stats: &mut QueryStats,
    ) -> Result<()> {
        let examined = set.len() as u64;
        let mut cursor = set.first();
        while let Some(entry) = cursor {
            cursor = set.next(entry);
            let id = match set.get(entry) {
                Some(c) => c.id,
                None => continue,
            };
            let row = self.store.get_by_id(level, id)?;
            stats.point_reads += 1;
            let d = self.distance(&row, query)?;
            if d > epsilon {
                set.remove(entry)?;
            } else {
                set.update_distance(entry, d)?;
            }
        }
        stats.levels.push(LevelStats {
            level,
            examined,
            survivors: set.len() as u64,
        });
        debug!(level, examined, survivors = set.len(), "refined candidates");
        Ok(())
    }
}
