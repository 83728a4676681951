//! Norms and distances used at every reduction level.
//!
//! The same [`Norm`] is used twice: once to fold a projected window into a
//! single scalar (a vector length) and once to compare two level
//! representations (a distance). Both are configured globally for a run.
//!
//! ## Important nuance
//!
//! Projection operands are quantized to six decimals with [`quantize`] before
//! they are multiplied. Distances are computed on the stored values as they
//! are, without quantization.

use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scale used by [`quantize`].
pub const QUANTIZATION_SCALE: f64 = 1_000_000.0;

/// Norm used for window reduction and level distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Norm {
    /// Manhattan: Σ|x|.
    L1,
    /// Euclidean: sqrt(Σx²).
    #[default]
    L2,
}

impl Norm {
    /// Length of a vector under this norm.
    #[inline]
    #[must_use]
    pub fn length<'a, I>(self, v: I) -> f64
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let v = v.into_iter();
        match self {
            Norm::L1 => v.map(|x| x.abs()).sum(),
            Norm::L2 => v.map(|x| x * x).sum::<f64>().sqrt(),
        }
    }

    /// Distance between two vectors under this norm.
    ///
    /// If dimensions mismatch, this returns `f64::INFINITY` (so it never
    /// passes an epsilon bound).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        if a.len() != b.len() {
            return f64::INFINITY;
        }
        match self {
            Norm::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Norm::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Norm::L1 => write!(f, "L1"),
            Norm::L2 => write!(f, "L2"),
        }
    }
}

impl FromStr for Norm {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L1" | "l1" => Ok(Norm::L1),
            "L2" | "l2" => Ok(Norm::L2),
            other => Err(StrataError::config(format!(
                "unknown norm mode {other:?}, expected L1 or L2"
            ))),
        }
    }
}

/// Round to six decimal places: `floor(x·10⁶ + 0.5) / 10⁶`.
///
/// Halves round towards positive infinity (`-0.0000005` becomes `-0.0`).
#[inline]
#[must_use]
pub fn quantize(x: f64) -> f64 {
    (x * QUANTIZATION_SCALE + 0.5).floor() / QUANTIZATION_SCALE
}
