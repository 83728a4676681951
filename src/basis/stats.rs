//! Streaming statistics over a level.
//!
//! Both accumulators take one row at a time so a level can be read in
//! chunks of any size with the same result.

use crate::error::{Result, StrataError};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

/// Running mean, `mean_k = mean_{k-1} + (x_k - mean_{k-1}) / k`.
#[derive(Debug, Clone)]
pub struct MeanAccumulator {
    mean: Array1<f64>,
    count: u64,
}

impl MeanAccumulator {
    pub fn new(dimension: usize) -> Self {
        Self {
            mean: Array1::zeros(dimension),
            count: 0,
        }
    }

    pub fn push(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.mean.len() {
            return Err(StrataError::DimensionMismatch {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }
        self.count += 1;
        let k = self.count as f64;
        self.mean
            .zip_mut_with(&ArrayView1::from(row), |m, &x| *m += (x - *m) / k);
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(self) -> Result<Array1<f64>> {
        if self.count == 0 {
            return Err(StrataError::precondition(
                "compute_mean",
                "no vectors to average",
            ));
        }
        Ok(self.mean)
    }
}

/// Sample covariance of each `window`-length block of a row.
///
/// Each block follows `C_k = (C_{k-1}·(k-1) + d·dᵀ) / k` with `d = x - μ`.
/// [`finish`](Self::finish) applies the Bessel factor `N / (N - 1)` once to
/// the upper triangle and mirrors it into the lower one.
#[derive(Debug, Clone)]
pub struct CovarianceAccumulator {
    window: usize,
    means: Array1<f64>,
    blocks: Vec<Array2<f64>>,
    count: u64,
}

impl CovarianceAccumulator {
    pub fn new(window: usize, means: Array1<f64>) -> Result<Self> {
        if window == 0 || means.is_empty() {
            return Err(StrataError::precondition(
                "compute_covariance",
                "window and means must be non-empty",
            ));
        }
        if means.len() % window != 0 {
            return Err(StrataError::precondition(
                "compute_covariance",
                format!(
                    "window {window} does not divide dimension {}",
                    means.len()
                ),
            ));
        }
        let blocks = (0..means.len() / window)
            .map(|_| Array2::zeros((window, window)))
            .collect();
        Ok(Self {
            window,
            means,
            blocks,
            count: 0,
        })
    }

    pub fn push(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.means.len() {
            return Err(StrataError::DimensionMismatch {
                expected: self.means.len(),
                actual: row.len(),
            });
        }
        self.count += 1;
        let k = self.count as f64;
        let w = self.window;
        let row = ArrayView1::from(row);
        for (b, cov) in self.blocks.iter_mut().enumerate() {
            let x = row.slice(s![b * w..(b + 1) * w]);
            let mu = self.means.slice(s![b * w..(b + 1) * w]);
            let d = &x - &mu;
            let col = d.view().insert_axis(Axis(1));
            let outer = col.dot(&col.t());
            cov.zip_mut_with(&outer, |c, &p| *c = (*c * (k - 1.0) + p) / k);
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(mut self) -> Result<Vec<Array2<f64>>> {
        if self.count < 2 {
            return Err(StrataError::precondition(
                "compute_covariance",
                format!("sample covariance needs at least 2 vectors, got {}", self.count),
            ));
        }
        let n = self.count as f64;
        let bessel = n / (n - 1.0);
        let w = self.window;
        for cov in &mut self.blocks {
            for i in 0..w {
                for j in i..w {
                    let c = cov[[i, j]] * bessel;
                    cov[[i, j]] = c;
                    cov[[j, i]] = c;
                }
            }
        }
        Ok(self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn streaming_mean() {
        let mut acc = MeanAccumulator::new(2);
        for row in [[1.0, 10.0], [2.0, 20.0], [6.0, 0.0]] {
            acc.push(&row).unwrap();
        }
        assert_eq!(acc.count(), 3);
        let mean = acc.finish().unwrap();
        assert!(close(mean[0], 3.0));
        assert!(close(mean[1], 10.0));
    }

    #[test]
    fn empty_mean_is_precondition() {
        assert!(matches!(
            MeanAccumulator::new(3).finish(),
            Err(StrataError::PreconditionViolation { .. })
        ));
    }

    #[test]
    fn sample_covariance_per_block() {
        // Blocks [x0, x1] and [x2, x3]; the second block is constant.
        let rows = [
            [1.0, 2.0, 5.0, 5.0],
            [3.0, 6.0, 5.0, 5.0],
            [5.0, 10.0, 5.0, 5.0],
        ];
        let means = arr1(&[3.0, 6.0, 5.0, 5.0]);
        let mut acc = CovarianceAccumulator::new(2, means).unwrap();
        for row in &rows {
            acc.push(row).unwrap();
        }
        let blocks = acc.finish().unwrap();
        assert_eq!(blocks.len(), 2);
        // var(x0) = 4, var(x1) = 16, cov = 8 (sample, N-1 = 2)
        assert!(close(blocks[0][[0, 0]], 4.0));
        assert!(close(blocks[0][[1, 1]], 16.0));
        assert!(close(blocks[0][[0, 1]], 8.0));
        assert_eq!(blocks[0][[0, 1]], blocks[0][[1, 0]]);
        assert!(blocks[1].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn covariance_needs_two_vectors() {
        let mut acc = CovarianceAccumulator::new(1, arr1(&[0.0])).unwrap();
        acc.push(&[1.0]).unwrap();
        assert!(matches!(
            acc.finish(),
            Err(StrataError::PreconditionViolation { .. })
        ));
    }

    #[test]
    fn covariance_rejects_bad_shapes() {
        assert!(CovarianceAccumulator::new(0, arr1(&[0.0])).is_err());
        assert!(CovarianceAccumulator::new(2, Array1::zeros(3)).is_err());
        let mut acc = CovarianceAccumulator::new(2, Array1::zeros(4)).unwrap();
        assert!(acc.push(&[1.0, 2.0]).is_err());
    }
}
