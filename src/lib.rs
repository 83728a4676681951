//! strata: multiresolution epsilon-range search over windowed projections.
//!
//! An index is a hierarchy of reduced-dimension copies of a dataset. Level 0
//! holds the original `D`-dimensional vectors; level `i` is obtained from
//! level `i-1` by cutting every vector into blocks of `windowᵢ` components,
//! projecting each block with a per-block matrix and keeping the norm of the
//! result. A query starts with a full scan of the coarsest level and then
//! narrows the candidate set level by level down to the original vectors.
//!
//! - [`config`]: [`IndexConfig`], dimension chain, shard layout
//! - [`basis`]: windowed mean/covariance, Jacobi eigensolver, projection bases
//! - [`projection`]: applying a basis to a dataset or a query
//! - [`index`]: [`Indexer`], the build pipeline
//! - [`query`]: [`QueryEngine`], coarse-to-fine refinement
//! - [`candidates`]: arena-backed [`CandidateSet`]
//! - [`store`]: [`VectorStore`] with in-memory and directory backends
//! - [`persistence`]: directories, record formats, artifacts
//! - [`dataset`]: text dataset and query readers
//!
//! ```no_run
//! use strata::{IndexConfig, Indexer, MemoryStore, QueryEngine};
//!
//! let rows = vec![
//!     vec![1.0, 2.0, 3.0, 4.0],
//!     vec![2.0, 1.0, 0.0, 1.0],
//!     vec![0.0, 0.5, 1.0, 1.5],
//! ];
//! let config = IndexConfig::new(4, 3, vec![2, 2]);
//! let mut store = MemoryStore::new();
//! Indexer::new(&config)?.run(&mut store, rows)?;
//!
//! let outcome = QueryEngine::new(&store, config)?.query(&[1.0, 2.0, 3.0, 4.0], 0.5)?;
//! for hit in outcome.results.iter() {
//!     println!("{} {}", hit.id, hit.distance);
//! }
//! # Ok::<(), strata::StrataError>(())
//! ```
//!
//! # Critical Nuances
//!
//! ## The filter is a heuristic
//!
//! A vector's distance at a coarse level is not a proven lower bound of its
//! distance at a finer level. Refinement drops candidates whose coarse
//! distance exceeds `epsilon`, so a vector that is within `epsilon` in the
//! original space can be lost at a coarse level. Every returned distance is
//! exact; completeness of the result is not guaranteed.
//!
//! ## Quantized projection
//!
//! Matrix and block entries are rounded to six decimals before they are
//! multiplied. Projections are therefore reproducible bit for bit, but
//! components smaller than `5e-7` vanish.
//!
//! ## Exact divisibility
//!
//! Every window must divide the dimension of the level it reduces. A chain
//! that would drop trailing components is rejected by
//! [`IndexConfig::validate`].

pub mod basis;
pub mod candidates;
pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod persistence;
pub mod projection;
pub mod query;
pub mod store;

/// Global, 1-based vector identifier.
pub type VectorId = u64;

// Re-exports
pub use basis::{Basis, BasisBuilder};
pub use candidates::{Candidate, CandidateSet, EntryRef};
pub use config::{IndexConfig, ProjectionKind, ShardLayout};
pub use distance::Norm;
pub use error::{Result, Stage, StrataError};
pub use index::Indexer;
pub use projection::Projector;
pub use query::{QueryEngine, QueryOutcome, QueryStats};
pub use store::{DirectoryStore, LevelLayout, MemoryStore, VectorStore};
