//! Mixing coefficient between marginal and conditional distribution shift.
//!
//! The refinement step blends the marginal operator M0 with the per-class
//! conditional operator using a coefficient in [0,1]. The reference
//! behavior pins it to 0.5; the data-driven proxy-distance estimate is
//! available as an opt-in strategy behind the same interface.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Estimates the coefficient balancing marginal vs conditional shift.
pub trait MixingEstimator: Sync {
    fn estimate(
        &self,
        xs: &DMatrix<f64>,
        ys: &[usize],
        xt: &DMatrix<f64>,
        yt_pseudo: &[usize],
    ) -> f64;
}

/// Constant coefficient; behavioral parity with the reference system.
pub struct FixedMixing(pub f64);

impl Default for FixedMixing {
    fn default() -> Self {
        FixedMixing(0.5)
    }
}

impl MixingEstimator for FixedMixing {
    fn estimate(
        &self,
        _xs: &DMatrix<f64>,
        _ys: &[usize],
        _xt: &DMatrix<f64>,
        _yt_pseudo: &[usize],
    ) -> f64 {
        self.0
    }
}

/// Data-driven estimate from proxy distances: a linear max-margin
/// classifier is trained to separate source from target rows, overall and
/// restricted to each class, and the per-class/overall distance ratio
/// becomes the coefficient.
pub struct ProxyDistanceMixing {
    pub epochs: usize,
    pub seed: u64,
}

impl Default for ProxyDistanceMixing {
    fn default() -> Self {
        Self { epochs: 20, seed: 0 }
    }
}

const MU_EPSILON: f64 = 1e-3;

impl MixingEstimator for ProxyDistanceMixing {
    fn estimate(
        &self,
        xs: &DMatrix<f64>,
        ys: &[usize],
        xt: &DMatrix<f64>,
        yt_pseudo: &[usize],
    ) -> f64 {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let overall = proxy_distance(xs, xt, self.epochs, &mut rng);

        let n_classes = ys.iter().copied().max().unwrap_or(0);
        let mut class_sum = 0.0;
        for c in 1..=n_classes {
            let src = select_rows(xs, ys, c);
            let tgt = select_rows(xt, yt_pseudo, c);
            if src.nrows() == 0 || tgt.nrows() == 0 {
                log::warn!(
                    "class {} empty in one domain; its proxy distance is taken as 0",
                    c
                );
                continue;
            }
            class_sum += proxy_distance(&src, &tgt, self.epochs, &mut rng);
        }
        let class_avg = class_sum / n_classes as f64;

        let denom = class_avg + overall;
        let mut mu = if denom.abs() > 0.0 {
            class_avg / denom
        } else {
            0.5
        };
        if mu > 1.0 {
            mu = 1.0;
        }
        if mu < MU_EPSILON {
            mu = 0.0;
        }
        mu
    }
}

fn select_rows(x: &DMatrix<f64>, labels: &[usize], class: usize) -> DMatrix<f64> {
    let idx: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == class)
        .map(|(i, _)| i)
        .collect();
    DMatrix::from_fn(idx.len(), x.ncols(), |i, j| x[(idx[i], j)])
}

/// Proxy distance between two sample sets: `2 * (1 - 2 * err)` where `err`
/// is the training error of a hinge-loss linear separator between them.
fn proxy_distance(a: &DMatrix<f64>, b: &DMatrix<f64>, epochs: usize, rng: &mut StdRng) -> f64 {
    if b.nrows() < 2 {
        // not enough target rows to separate anything
        return -2.0;
    }

    let d = a.ncols();
    let n = a.nrows() + b.nrows();
    let row = |i: usize| -> (Vec<f64>, f64) {
        if i < a.nrows() {
            (a.row(i).iter().copied().collect(), -1.0)
        } else {
            (b.row(i - a.nrows()).iter().copied().collect(), 1.0)
        }
    };

    // Pegasos-style subgradient descent on the hinge loss.
    let reg = 1e-2;
    let mut w = vec![0.0; d];
    let mut bias = 0.0;
    let mut order: Vec<usize> = (0..n).collect();
    let mut t = 0usize;

    for _ in 0..epochs {
        order.shuffle(rng);
        for &i in &order {
            t += 1;
            let step = 1.0 / (reg * t as f64);
            let (x, y) = row(i);
            let margin = y * (dot(&w, &x) + bias);
            for (wj, xj) in w.iter_mut().zip(&x) {
                *wj -= step * reg * *wj;
                if margin < 1.0 {
                    *wj += step * y * xj;
                }
            }
            if margin < 1.0 {
                bias += step * y;
            }
        }
    }

    let mut errors = 0usize;
    for i in 0..n {
        let (x, y) = row(i);
        let pred = if dot(&w, &x) + bias >= 0.0 { 1.0 } else { -1.0 };
        if pred != y {
            errors += 1;
        }
    }
    let err = errors as f64 / n as f64;
    2.0 * (1.0 - 2.0 * err)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_fixed_mixing_is_constant() {
        let est = FixedMixing::default();
        let x = DMatrix::zeros(2, 2);
        assert_eq!(est.estimate(&x, &[1, 2], &x, &[2, 1]), 0.5);
    }

    #[test]
    fn test_proxy_mixing_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(21);
        let xs = DMatrix::from_fn(20, 3, |_, _| rng.gen_range(-1.0..1.0));
        let xt = DMatrix::from_fn(20, 3, |_, _| rng.gen_range(-1.0..1.0) + 0.5);
        let ys: Vec<usize> = (0..20).map(|i| 1 + i % 2).collect();
        let yt: Vec<usize> = (0..20).map(|i| 1 + (i / 2) % 2).collect();

        let est = ProxyDistanceMixing::default();
        let mu = est.estimate(&xs, &ys, &xt, &yt);
        assert!((0.0..=1.0).contains(&mu), "mu out of range: {}", mu);
    }

    #[test]
    fn test_separable_sets_have_large_proxy_distance() {
        let mut rng = StdRng::seed_from_u64(9);
        let a = DMatrix::from_fn(30, 2, |_, _| rng.gen_range(-0.2..0.2) - 3.0);
        let b = DMatrix::from_fn(30, 2, |_, _| rng.gen_range(-0.2..0.2) + 3.0);
        let dist = proxy_distance(&a, &b, 20, &mut rng);
        // a perfect separator gives err = 0 and distance 2
        assert!(dist > 1.5, "distance too small: {}", dist);
    }

    #[test]
    fn test_empty_class_contributes_zero() {
        // target never carries class 2, source does; must not divide by zero
        let mut rng = StdRng::seed_from_u64(33);
        let xs = DMatrix::from_fn(10, 2, |_, _| rng.gen_range(-1.0..1.0));
        let xt = DMatrix::from_fn(10, 2, |_, _| rng.gen_range(-1.0..1.0));
        let ys: Vec<usize> = (0..10).map(|i| 1 + i % 2).collect();
        let yt = vec![1; 10];

        let est = ProxyDistanceMixing::default();
        let mu = est.estimate(&xs, &ys, &xt, &yt);
        assert!(mu.is_finite());
        assert!((0.0..=1.0).contains(&mu));
    }
}
