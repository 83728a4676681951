//! Error types for strata.

use crate::persistence::PersistenceError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage reported when an indexing or query run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Writing the original vectors to level 0.
    Ingest,
    /// Streaming mean over the previous level.
    Mean { level: usize },
    /// Windowed covariance accumulation.
    Covariance { level: usize },
    /// Eigendecomposition and projection matrix construction.
    Basis { level: usize },
    /// Projecting the dataset into a level.
    Projection { level: usize },
    /// Writing the index manifest.
    Manifest,
    /// Projecting the query vector.
    QueryProjection,
    /// Coarsest-level scan.
    Bootstrap { level: usize },
    /// Per-candidate refinement at a finer level.
    Refine { level: usize },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest => write!(f, "ingest"),
            Stage::Mean { level } => write!(f, "mean (level {level})"),
            Stage::Covariance { level } => write!(f, "covariance (level {level})"),
            Stage::Basis { level } => write!(f, "basis (level {level})"),
            Stage::Projection { level } => write!(f, "projection (level {level})"),
            Stage::Manifest => write!(f, "manifest"),
            Stage::QueryProjection => write!(f, "query projection"),
            Stage::Bootstrap { level } => write!(f, "bootstrap scan (level {level})"),
            Stage::Refine { level } => write!(f, "refinement (level {level})"),
        }
    }
}

/// Errors that can occur while indexing or querying.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Rejected configuration (dimension, windows, counts, norm, epsilon).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required read or write against the vector store failed.
    #[error("storage unavailable in {operation}: {source}")]
    StorageUnavailable {
        operation: &'static str,
        #[source]
        source: PersistenceError,
    },

    /// An operation was called with input it cannot work on.
    #[error("precondition violated in {operation}: {detail}")]
    PreconditionViolation {
        operation: &'static str,
        detail: String,
    },

    /// A vector or query does not have the dimension of its level.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Failure of a pipeline stage; wraps the underlying cause.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<StrataError>,
    },
}

impl StrataError {
    pub(crate) fn precondition(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            operation,
            detail: detail.into(),
        }
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        Self::InvalidConfiguration(detail.into())
    }

    /// Tag this error with the stage it aborted. Already-tagged errors keep
    /// their innermost stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            err @ StrataError::Stage { .. } => err,
            other => StrataError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was raised in, if it was tagged.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StrataError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping stage wrappers.
    pub fn root(&self) -> &StrataError {
        match self {
            StrataError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension for attaching the failing store operation to persistence results.
pub(crate) trait StorageContext<T> {
    fn storage(self, operation: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, PersistenceError> {
    fn storage(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| StrataError::StorageUnavailable { operation, source })
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapping_keeps_innermost_stage() {
        let err = StrataError::config("window 0")
            .in_stage(Stage::Covariance { level: 2 })
            .in_stage(Stage::Projection { level: 2 });
        assert_eq!(err.stage(), Some(Stage::Covariance { level: 2 }));
        assert!(matches!(err.root(), StrataError::InvalidConfiguration(_)));
        assert_eq!(
            err.to_string(),
            "covariance (level 2) failed: invalid configuration: window 0"
        );
    }

    #[test]
    fn storage_context_names_operation() {
        let res: std::result::Result<(), PersistenceError> =
            Err(PersistenceError::NotFound("level_1/7.vec".into()));
        let err = res.storage("get_by_id").unwrap_err();
        assert_eq!(
            err.to_string(),
            "storage unavailable in get_by_id: resource not found: level_1/7.vec"
        );
    }
}
