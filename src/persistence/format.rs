//! On-disk formats for strata.
//!
//! # File Layout
//!
//! ```text
//! index-root
//! ├── manifest.json              # IndexManifest
//! ├── level_0/
//! │   ├── meta.json              # dimension, layout, shard extents
//! │   └── vectors/
//! │       ├── 1.vec              # one record per vector
//! │       └── ...
//! ├── level_1/ ...               # intermediate levels: same as level_0
//! ├── level_k/
//! │   ├── meta.json
//! │   ├── shard_0.dat            # terminal level: all vectors of a shard
//! │   └── ...
//! ├── artifacts/
//! │   ├── basis_1.json           # projection basis of level 1
//! │   ├── means_1.json           # transient
//! │   ├── covariance_1.json      # transient, only with keep_covariance
//! │   └── results_<name>.json
//! ```
//!
//! # Record Format
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Magic (4B): "STRV" vector / "STRD" shard│
//! │ Version (4B): u32 LE                    │
//! │ Dimension (4B): u32 LE                  │
//! ├─────────────────────────────────────────┤
//! │ Values: dimension × f64 LE per vector   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Values are stored as raw `f64` bits so a level read back from disk is
//! bit-identical to the one that was projected.

use super::error::{PersistenceError, PersistenceResult};
use crate::config::IndexConfig;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Magic bytes for single-vector record files.
pub const VECTOR_MAGIC: [u8; 4] = *b"STRV";

/// Magic bytes for concatenated shard files.
pub const DATASET_MAGIC: [u8; 4] = *b"STRD";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes: magic + version + dimension.
pub const HEADER_LEN: usize = 12;

/// Write a record header.
pub fn write_header<W: Write + ?Sized>(
    writer: &mut W,
    magic: [u8; 4],
    dimension: usize,
) -> PersistenceResult<()> {
    let dimension = u32::try_from(dimension)
        .map_err(|_| PersistenceError::Format(format!("dimension {dimension} exceeds u32")))?;
    writer.write_all(&magic)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&dimension.to_le_bytes())?;
    Ok(())
}

/// Read and validate a record header, returning its dimension.
pub fn read_header<R: Read + ?Sized>(reader: &mut R, magic: [u8; 4]) -> PersistenceResult<usize> {
    let mut buf = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut buf)
        .map_err(|e| PersistenceError::Format(format!("truncated header: {e}")))?;

    if buf[0..4] != magic {
        return Err(PersistenceError::Format(format!(
            "bad magic {:?}, expected {:?}",
            &buf[0..4],
            magic
        )));
    }

    let mut u32_buf = [0u8; 4];
    u32_buf.copy_from_slice(&buf[4..8]);
    let version = u32::from_le_bytes(u32_buf);
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported format version {version}"
        )));
    }

    u32_buf.copy_from_slice(&buf[8..12]);
    Ok(u32::from_le_bytes(u32_buf) as usize)
}

/// Write the values of one vector.
pub fn write_values<W: Write + ?Sized>(writer: &mut W, values: &[f64]) -> PersistenceResult<()> {
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Read the values of one vector of the given dimension.
pub fn read_values<R: Read + ?Sized>(reader: &mut R, dimension: usize) -> PersistenceResult<Vec<f64>> {
    let mut bytes = vec![0u8; dimension * 8];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| PersistenceError::Format(format!("truncated record: {e}")))?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_le_bytes(b)
        })
        .collect())
}

/// Skip `count` records of the given dimension.
pub fn skip_values<R: Read + ?Sized>(
    reader: &mut R,
    dimension: usize,
    count: u64,
) -> PersistenceResult<()> {
    let bytes = count * dimension as u64 * 8;
    let skipped = std::io::copy(&mut (&mut *reader).take(bytes), &mut std::io::sink())?;
    if skipped != bytes {
        return Err(PersistenceError::Format(format!(
            "record file ended after {skipped} of {bytes} bytes"
        )));
    }
    Ok(())
}

/// Manifest written once a build completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Format version
    pub version: u32,
    /// Configuration the index was built with
    pub config: IndexConfig,
    /// Dimension of every level, level 0 first
    pub dimensions: Vec<usize>,
    /// Total vector count
    pub total_vectors: u64,
}

impl IndexManifest {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            version: FORMAT_VERSION,
            config: config.clone(),
            dimensions: config.dimensions(),
            total_vectors: config.num_vectors,
        }
    }
}
