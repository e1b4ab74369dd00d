//! Kernel and graph-Laplacian construction over the joint sample set.
//!
//! Both matrices are computed once per run from the fixed joint feature
//! matrix and shared read-only afterwards.

use std::str::FromStr;

use nalgebra::DMatrix;

use crate::error::{AdaptError, Result};

/// Kernel families supported by the Gram-matrix builder.
///
/// Kernel selection is resolved to this enum at configuration time, so an
/// unknown kernel string is rejected up front instead of silently falling
/// back to the identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Identity: the feature matrix is its own "kernel".
    Primal,
    /// Inner product between sample columns.
    Linear,
    /// Gaussian kernel with bandwidth `gamma`.
    Rbf,
}

impl FromStr for KernelKind {
    type Err = AdaptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primal" => Ok(KernelKind::Primal),
            "linear" => Ok(KernelKind::Linear),
            "rbf" => Ok(KernelKind::Rbf),
            other => Err(AdaptError::config(format!(
                "unknown kernel type '{}' (expected primal, linear or rbf)",
                other
            ))),
        }
    }
}

/// Gram matrix between the columns of `x` (and `x2` when given).
///
/// For `rbf` the squared distances come from the expansion
/// `||a||^2 + ||b||^2 - 2 a.b`, so no per-pair scalar loops are needed
/// beyond the column-norm vectors. With `x2` absent the result is
/// symmetric positive semi-definite for `linear` and `rbf`.
pub fn kernel(
    kind: KernelKind,
    x: &DMatrix<f64>,
    x2: Option<&DMatrix<f64>>,
    gamma: f64,
) -> DMatrix<f64> {
    match kind {
        KernelKind::Primal => x.clone(),
        KernelKind::Linear => match x2 {
            Some(other) => x.transpose() * other,
            None => x.transpose() * x,
        },
        KernelKind::Rbf => {
            let col_sq = |m: &DMatrix<f64>| -> Vec<f64> {
                m.column_iter().map(|c| c.norm_squared()).collect()
            };
            let n1 = col_sq(x);
            let (n2, cross) = match x2 {
                Some(other) => (col_sq(other), x.transpose() * other),
                None => (n1.clone(), x.transpose() * x),
            };
            DMatrix::from_fn(n1.len(), n2.len(), |i, j| {
                let d = n1[i] + n2[j] - 2.0 * cross[(i, j)];
                (-gamma * d).exp()
            })
        }
    }
}

/// Normalized graph Laplacian from k-nearest-neighbor cosine similarities.
///
/// `points` holds one sample per row. Each sample is linked to its `k`
/// nearest neighbors under cosine distance (self excluded); links are
/// mirrored so the similarity matrix stays symmetric even though the
/// neighbor relation is not. The diagonal is 1.0, rows/columns are
/// degree-normalized by `sqrt(S_i * S_j)`, and the result is
/// `I - normalized similarity`.
pub fn laplacian(points: &DMatrix<f64>, k: usize) -> Result<DMatrix<f64>> {
    let n = points.nrows();
    if k >= n {
        return Err(AdaptError::config(format!(
            "laplacian neighbor count k={} must be below the sample count n={}",
            k, n
        )));
    }

    let norms: Vec<f64> = (0..n).map(|i| points.row(i).norm()).collect();
    let mut sim = DMatrix::zeros(n, n);

    for i in 0..n {
        let mut dists: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| {
                let denom = norms[i] * norms[j];
                let cos = if denom > 0.0 {
                    points.row(i).dot(&points.row(j)) / denom
                } else {
                    0.0
                };
                (j, 1.0 - cos)
            })
            .collect();
        dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for &(j, dist) in dists.iter().take(k) {
            sim[(i, j)] = 1.0 - dist;
            sim[(j, i)] = 1.0 - dist;
        }
    }

    for i in 0..n {
        sim[(i, i)] = 1.0;
    }

    let degree: Vec<f64> = (0..n).map(|i| sim.row(i).sum()).collect();
    for i in 0..n {
        for j in 0..n {
            sim[(i, j)] /= (degree[i] * degree[j]).sqrt();
        }
    }

    Ok(DMatrix::identity(n, n) - sim)
}
