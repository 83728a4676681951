//! Typed artifacts stored as JSON blobs through a [`VectorStore`].

use super::error::PersistenceError;
use super::format::IndexManifest;
use crate::basis::Basis;
use crate::candidates::Candidate;
use crate::error::{Result, StorageContext, StrataError};
use crate::store::{ArtifactKey, VectorStore};
use crate::VectorId;
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One row of a saved result list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub id: VectorId,
    pub distance: f64,
}

impl From<&Candidate> for ResultEntry {
    fn from(c: &Candidate) -> Self {
        Self {
            id: c.id,
            distance: c.distance,
        }
    }
}

pub fn save_json<S, T>(store: &mut S, key: &ArtifactKey, value: &T) -> Result<()>
where
    S: VectorStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)
        .map_err(PersistenceError::from)
        .storage("put_artifact")?;
    store.put_artifact(key, &bytes)
}

pub fn load_json<S, T>(store: &S, key: &ArtifactKey) -> Result<T>
where
    S: VectorStore + ?Sized,
    T: DeserializeOwned,
{
    let bytes = store.get_artifact(key)?;
    serde_json::from_slice(&bytes)
        .map_err(PersistenceError::from)
        .storage("get_artifact")
}

pub fn save_basis<S: VectorStore + ?Sized>(store: &mut S, basis: &Basis) -> Result<()> {
    save_json(store, &ArtifactKey::Basis { level: basis.level }, basis)
}

/// Load and shape-check the basis of a level.
pub fn load_basis<S: VectorStore + ?Sized>(store: &S, level: usize) -> Result<Basis> {
    let basis: Basis = load_json(store, &ArtifactKey::Basis { level })?;
    if basis.level != level {
        return Err(StrataError::precondition(
            "load_basis",
            format!("artifact of level {level} holds the basis of level {}", basis.level),
        ));
    }
    basis.validate()?;
    Ok(basis)
}

pub fn save_means<S: VectorStore + ?Sized>(
    store: &mut S,
    level: usize,
    means: &Array1<f64>,
) -> Result<()> {
    save_json(store, &ArtifactKey::Means { level }, means)
}

pub fn load_means<S: VectorStore + ?Sized>(store: &S, level: usize) -> Result<Array1<f64>> {
    load_json(store, &ArtifactKey::Means { level })
}

pub fn save_covariance<S: VectorStore + ?Sized>(
    store: &mut S,
    level: usize,
    covariance: &[Array2<f64>],
) -> Result<()> {
    save_json(store, &ArtifactKey::Covariance { level }, covariance)
}

pub fn load_covariance<S: VectorStore + ?Sized>(store: &S, level: usize) -> Result<Vec<Array2<f64>>> {
    load_json(store, &ArtifactKey::Covariance { level })
}

pub fn save_manifest<S: VectorStore + ?Sized>(store: &mut S, manifest: &IndexManifest) -> Result<()> {
    save_json(store, &ArtifactKey::Manifest, manifest)
}

pub fn load_manifest<S: VectorStore + ?Sized>(store: &S) -> Result<IndexManifest> {
    let manifest: IndexManifest = load_json(store, &ArtifactKey::Manifest)?;
    if manifest.version != super::format::FORMAT_VERSION {
        return Err(StrataError::StorageUnavailable {
            operation: "load_manifest",
            source: PersistenceError::Format(format!(
                "unsupported manifest version {}",
                manifest.version
            )),
        });
    }
    Ok(manifest)
}

fn check_result_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StrataError::config(format!(
            "result name {name:?} must be non-empty ASCII letters, digits, '_' or '-'"
        )))
    }
}

/// Persist a result list under `name`.
pub fn save_results<S: VectorStore + ?Sized>(
    store: &mut S,
    name: &str,
    results: &[ResultEntry],
) -> Result<()> {
    check_result_name(name)?;
    save_json(
        store,
        &ArtifactKey::Results {
            name: name.to_string(),
        },
        results,
    )
}

pub fn load_results<S: VectorStore + ?Sized>(store: &S, name: &str) -> Result<Vec<ResultEntry>> {
    check_result_name(name)?;
    load_json(
        store,
        &ArtifactKey::Results {
            name: name.to_string(),
        },
    )
}
