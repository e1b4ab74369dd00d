//! Cheap label predictors.
//!
//! These do double duty: seeding the evolutionary population with
//! plausible individuals, and providing the single-neighbor baseline
//! accuracy reported before the adaptation runs.

use nalgebra::DMatrix;

/// A classifier trained on labeled source rows that predicts labels for
/// target rows. Implementations are interchangeable seeding strategies.
pub trait LabelPredictor: Sync {
    fn name(&self) -> &'static str;

    fn fit_predict(&self, xs: &DMatrix<f64>, ys: &[usize], xt: &DMatrix<f64>) -> Vec<usize>;
}

/// 1-nearest-neighbor under squared Euclidean distance.
pub struct OneNearestNeighbor;

impl LabelPredictor for OneNearestNeighbor {
    fn name(&self) -> &'static str {
        "1nn"
    }

    fn fit_predict(&self, xs: &DMatrix<f64>, ys: &[usize], xt: &DMatrix<f64>) -> Vec<usize> {
        (0..xt.nrows())
            .map(|i| {
                let mut best = 0usize;
                let mut best_dist = f64::INFINITY;
                for j in 0..xs.nrows() {
                    let dist: f64 = xt
                        .row(i)
                        .iter()
                        .zip(xs.row(j).iter())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum();
                    if dist < best_dist {
                        best_dist = dist;
                        best = j;
                    }
                }
                ys[best]
            })
            .collect()
    }
}

/// Assigns each target row the label of the closest per-class source mean.
pub struct NearestCentroid;

impl LabelPredictor for NearestCentroid {
    fn name(&self) -> &'static str {
        "nearest-centroid"
    }

    fn fit_predict(&self, xs: &DMatrix<f64>, ys: &[usize], xt: &DMatrix<f64>) -> Vec<usize> {
        let n_classes = ys.iter().copied().max().unwrap_or(0);
        let d = xs.ncols();

        let mut centroids = vec![vec![0.0; d]; n_classes];
        let mut counts = vec![0usize; n_classes];
        for (i, &label) in ys.iter().enumerate() {
            counts[label - 1] += 1;
            for j in 0..d {
                centroids[label - 1][j] += xs[(i, j)];
            }
        }
        for (centroid, &count) in centroids.iter_mut().zip(&counts) {
            if count > 0 {
                for v in centroid.iter_mut() {
                    *v /= count as f64;
                }
            }
        }

        (0..xt.nrows())
            .map(|i| {
                let mut best = 1usize;
                let mut best_dist = f64::INFINITY;
                for (c, centroid) in centroids.iter().enumerate() {
                    if counts[c] == 0 {
                        continue;
                    }
                    let dist: f64 = xt
                        .row(i)
                        .iter()
                        .zip(centroid.iter())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum();
                    if dist < best_dist {
                        best_dist = dist;
                        best = c + 1;
                    }
                }
                best
            })
            .collect()
    }
}
