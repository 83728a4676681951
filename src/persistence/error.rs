//! Error types for persistence operations.

use durability as durability_crate;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (invalid magic bytes, version mismatch, truncated record)
    #[error("format error: {0}")]
    Format(String),

    /// Serialization error (serde_json)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid state (e.g. a chunk that does not continue the ID sequence,
    /// or a lock the backing store could not take)
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Resource not found (level, record, artifact)
    #[error("resource not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("json error: {}", e))
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<durability_crate::PersistenceError> for PersistenceError {
    fn from(e: durability_crate::PersistenceError) -> Self {
        match e {
            durability_crate::PersistenceError::Io(e) => Self::Io(e),
            durability_crate::PersistenceError::Format(s) => Self::Format(s),
            durability_crate::PersistenceError::FormatDetail {
                message,
                expected,
                actual,
            } => {
                let mut s = message;
                if expected.is_some() || actual.is_some() {
                    s.push_str(&format!(" (expected={expected:?}, actual={actual:?})"));
                }
                Self::Format(s)
            }
            durability_crate::PersistenceError::CrcMismatch { expected, actual } => {
                Self::Format(format!("checksum mismatch: expected {expected}, got {actual}"))
            }
            durability_crate::PersistenceError::Encode(s)
            | durability_crate::PersistenceError::Decode(s) => Self::Serialization(s),
            durability_crate::PersistenceError::InvalidState(s)
            | durability_crate::PersistenceError::InvalidConfig(s)
            | durability_crate::PersistenceError::NotSupported(s) => Self::InvalidState(s),
            durability_crate::PersistenceError::LockFailed { resource, reason } => {
                Self::InvalidState(format!("failed to acquire lock on {resource}: {reason}"))
            }
            durability_crate::PersistenceError::NotFound(s) => Self::NotFound(s),
            durability_crate::PersistenceError::MissingPath(p) => {
                Self::NotFound(p.to_string_lossy().to_string())
            }
        }
    }
}
