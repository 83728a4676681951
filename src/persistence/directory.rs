//! Storage backends for `strata` persistence.
//!
//! `strata` exposes a `Directory` abstraction for the file-backed vector store.
//! Both backends delegate to the implementations in `durability::storage` and
//! adapt error types. Paths are `/`-separated and relative to the root.
//!
//! On top of the delegated primitives this layer guarantees:
//! - parents are created before a file is written;
//! - `open_file` on a missing path is [`PersistenceError::NotFound`];
//! - `delete` on a missing path succeeds;
//! - `delete_dir_all` removes every file below a path (empty directories may
//!   remain on disk).

use crate::persistence::error::{PersistenceError, PersistenceResult};
use durability::storage::Directory as DurabilityDirectory;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::debug;

/// Filesystem-like directory abstraction for `strata` persistence.
pub trait Directory: Send + Sync {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>>;
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> PersistenceResult<()>;
    fn delete_dir_all(&self, path: &str) -> PersistenceResult<()>;
    fn create_dir_all(&self, path: &str) -> PersistenceResult<()>;
    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>>;
    fn append_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>>;
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()>;

    /// Read a whole file into memory.
    fn read_all(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_file(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

/// Full path of a `list_dir` entry, whether the backend reports names or paths.
fn child_path(parent: &str, entry: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() || entry.starts_with(&format!("{parent}/")) {
        entry.to_string()
    } else {
        format!("{parent}/{entry}")
    }
}

fn ensure_parent<D: DurabilityDirectory>(inner: &D, path: &str) -> PersistenceResult<()> {
    match parent_of(path) {
        Some(parent) => inner.create_dir_all(parent).map_err(PersistenceError::from),
        None => Ok(()),
    }
}

fn remove_tree<D: DurabilityDirectory>(inner: &D, path: &str) -> PersistenceResult<()> {
    if let Ok(entries) = inner.list_dir(path) {
        for entry in entries {
            let child = child_path(path, &entry);
            if child != path {
                remove_tree(inner, &child)?;
            }
        }
    }
    if inner.exists(path) {
        // Files go away here; directories may refuse and stay behind empty.
        if let Err(e) = inner.delete(path) {
            debug!(path, error = %PersistenceError::from(e), "left directory entry in place");
        }
    }
    Ok(())
}

macro_rules! delegate_directory {
    ($ty:ty) => {
        impl Directory for $ty {
            fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
                ensure_parent(&self.inner, path)?;
                self.inner.create_file(path).map_err(PersistenceError::from)
            }
            fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
                if !self.inner.exists(path) {
                    return Err(PersistenceError::NotFound(path.to_string()));
                }
                self.inner.open_file(path).map_err(PersistenceError::from)
            }
            fn exists(&self, path: &str) -> bool {
                self.inner.exists(path)
            }
            fn delete(&self, path: &str) -> PersistenceResult<()> {
                if !self.inner.exists(path) {
                    return Ok(());
                }
                self.inner.delete(path).map_err(PersistenceError::from)
            }
            fn delete_dir_all(&self, path: &str) -> PersistenceResult<()> {
                remove_tree(&self.inner, path)
            }
            fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
                self.inner
                    .create_dir_all(path)
                    .map_err(PersistenceError::from)
            }
            fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
                self.inner.list_dir(path).map_err(PersistenceError::from)
            }
            fn append_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
                ensure_parent(&self.inner, path)?;
                self.inner.append_file(path).map_err(PersistenceError::from)
            }
            fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
                ensure_parent(&self.inner, path)?;
                self.inner
                    .atomic_write(path, data)
                    .map_err(PersistenceError::from)
            }
        }
    };
}

/// In-memory directory, for tests and throwaway indexes.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: durability::storage::MemoryDirectory,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            inner: durability::storage::MemoryDirectory::new(),
        }
    }
}

delegate_directory!(MemoryDirectory);

/// Directory rooted at a path on the local filesystem.
pub struct FsDirectory {
    root: PathBuf,
    inner: durability::storage::FsDirectory,
}

impl FsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        let inner = durability::storage::FsDirectory::new(root.clone())
            .map_err(PersistenceError::from)?;
        Ok(Self { root, inner })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

delegate_directory!(FsDirectory);
