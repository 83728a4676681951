//! Disk persistence for `strata` indexes.
//!
//! - [`directory`]: the `Directory` abstraction (filesystem and in-memory)
//! - [`format`]: record headers, value encoding and the index manifest
//! - [`artifacts`]: typed save/load of bases, statistics, manifests and results
//!   through any [`VectorStore`](crate::store::VectorStore)
//!
//! See [`format`] for the directory layout used by
//! [`DirectoryStore`](crate::store::DirectoryStore).

pub mod artifacts;
pub mod directory;
pub mod error;
pub mod format;

pub use directory::{Directory, FsDirectory, MemoryDirectory};
pub use error::{PersistenceError, PersistenceResult};
pub use format::IndexManifest;
