//! Plain-text dataset and query files.
//!
//! A dataset file starts with two integers, the vector count `N` and the
//! dimension `D`, followed by `N·D` numbers. A query file holds `D` numbers.
//! Tokens are separated by any whitespace, so one vector per line and one
//! value per line both work.
//!
//! ```text
//! 3 4
//! 1.0 2.0 3.0 4.0
//! 0.5 0.5 0.5 0.5
//! -1 0 1 2
//! ```

use crate::config::IndexConfig;
use crate::error::{Result, StorageContext, StrataError};
use crate::persistence::PersistenceError;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Vectors read from a dataset file.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub dimension: usize,
    pub rows: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index configuration for this dataset with the given windows.
    pub fn config(&self, windows: Vec<usize>) -> IndexConfig {
        IndexConfig::new(self.dimension, self.rows.len() as u64, windows)
    }
}

fn format_error(operation: &'static str, detail: String) -> StrataError {
    StrataError::StorageUnavailable {
        operation,
        source: PersistenceError::Format(detail),
    }
}

fn read_text<R: Read>(operation: &'static str, mut reader: R) -> Result<String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(PersistenceError::from)
        .storage(operation)?;
    Ok(text)
}

fn parse_values<'t, I>(operation: &'static str, tokens: &mut I, count: usize) -> Result<Vec<f64>>
where
    I: Iterator<Item = &'t str>,
{
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let token = tokens.next().ok_or_else(|| {
            format_error(operation, format!("expected {count} values, found {i}"))
        })?;
        let value: f64 = token
            .parse()
            .map_err(|_| format_error(operation, format!("invalid number {token:?}")))?;
        values.push(value);
    }
    Ok(values)
}

fn parse_count(operation: &'static str, token: Option<&str>, what: &str) -> Result<usize> {
    let token = token.ok_or_else(|| format_error(operation, format!("missing {what}")))?;
    let value: usize = token
        .parse()
        .map_err(|_| format_error(operation, format!("invalid {what} {token:?}")))?;
    if value == 0 {
        return Err(StrataError::config(format!("{what} must be positive")));
    }
    Ok(value)
}

/// Parse a dataset: header `N D`, then `N·D` values.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset> {
    const OP: &str = "read_dataset";
    let text = read_text(OP, reader)?;
    let mut tokens = text.split_whitespace();
    let count = parse_count(OP, tokens.next(), "vector count")?;
    let dimension = parse_count(OP, tokens.next(), "dimension")?;

    let rows = (0..count)
        .map(|_| parse_values(OP, &mut tokens, dimension))
        .collect::<Result<Vec<_>>>()?;
    if let Some(extra) = tokens.next() {
        return Err(format_error(
            OP,
            format!("unexpected trailing value {extra:?} after {count} vectors"),
        ));
    }
    Ok(Dataset { dimension, rows })
}

/// Parse a query of exactly `dimension` values.
pub fn read_query<R: Read>(reader: R, dimension: usize) -> Result<Vec<f64>> {
    const OP: &str = "read_query";
    let text = read_text(OP, reader)?;
    let mut tokens = text.split_whitespace();
    let query = parse_values(OP, &mut tokens, dimension)?;
    let extra = tokens.count();
    if extra > 0 {
        return Err(StrataError::DimensionMismatch {
            expected: dimension,
            actual: dimension + extra,
        });
    }
    Ok(query)
}

fn open(operation: &'static str, path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PersistenceError::NotFound(path.display().to_string()),
            _ => PersistenceError::Io(e),
        })
        .storage(operation)?;
    Ok(BufReader::new(file))
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    read_dataset(open("load_dataset", path.as_ref())?)
}

pub fn load_query(path: impl AsRef<Path>, dimension: usize) -> Result<Vec<f64>> {
    read_query(open("load_query", path.as_ref())?, dimension)
}
