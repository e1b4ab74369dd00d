//! Shared per-run context: every matrix that stays constant across
//! iterations and generations, built once and then only read.
//!
//! Fitness evaluation and refinement used to depend on module-level
//! globals in the original system; here they borrow an `AdaptContext`,
//! which is `Sync` and safely shared by parallel evaluators.

use nalgebra::{DMatrix, DVector};

use crate::error::{AdaptError, Result};
use crate::matrices::{kernel, laplacian, KernelKind};
use crate::transform::SubspaceTransform;

/// Hyperparameters of the regularized least-squares refinement.
#[derive(Debug, Clone)]
pub struct MedaParams {
    pub kernel: KernelKind,
    /// Bandwidth of the rbf kernel.
    pub gamma: f64,
    /// Weight of the distribution-discrepancy operator.
    pub lambda: f64,
    /// Weight of the Laplacian smoothness term.
    pub rho: f64,
    /// Ridge weight on the projection coefficients.
    pub eta: f64,
    /// Neighbor count for the graph Laplacian.
    pub neighbors: usize,
    /// Iteration count of the plain refinement loop.
    pub iterations: usize,
}

impl Default for MedaParams {
    fn default() -> Self {
        Self {
            kernel: KernelKind::Rbf,
            gamma: 0.5,
            lambda: 10.0,
            rho: 1.0,
            eta: 0.1,
            neighbors: 10,
            iterations: 10,
        }
    }
}

/// Read-only bundle of the run-constant matrices.
#[derive(Debug)]
pub struct AdaptContext {
    pub ns: usize,
    pub nt: usize,
    pub n_classes: usize,
    /// Projected, unit-norm source samples, one per row.
    pub xs: DMatrix<f64>,
    /// Projected, unit-norm target samples, one per row.
    pub xt: DMatrix<f64>,
    /// Ground-truth source labels in `1..=C`.
    pub ys: Vec<usize>,
    /// Gram matrix K over the joint samples.
    pub kernel: DMatrix<f64>,
    /// Graph Laplacian L over the joint samples.
    pub laplacian: DMatrix<f64>,
    /// Diagonal domain indicator A: 1 on source entries, 0 on target.
    pub domain_indicator: DMatrix<f64>,
    /// Marginal mean-difference operator, built from domain sizes only.
    pub m0: DMatrix<f64>,
    /// One-hot source labels stacked over target zeros, (ns+nt) x C.
    pub label_onehot: DMatrix<f64>,
}

impl AdaptContext {
    /// Project both domains, column-normalize the joint matrix and
    /// precompute K, L, A, M0 and the source one-hot block.
    pub fn build(
        xs: &DMatrix<f64>,
        ys: &[usize],
        xt: &DMatrix<f64>,
        n_classes: usize,
        transform: &dyn SubspaceTransform,
        dim: usize,
        params: &MedaParams,
    ) -> Result<Self> {
        if xs.ncols() != xt.ncols() {
            return Err(AdaptError::shape(format!(
                "source feature width {} differs from target width {}",
                xs.ncols(),
                xt.ncols()
            )));
        }
        if ys.len() != xs.nrows() {
            return Err(AdaptError::shape(format!(
                "{} source labels for {} source samples",
                ys.len(),
                xs.nrows()
            )));
        }

        let (zs, zt) = transform.project(xs, xt, dim)?;
        if zs.ncols() != zt.ncols() {
            return Err(AdaptError::shape(
                "subspace transform produced mismatched widths".to_string(),
            ));
        }

        let ns = zs.nrows();
        let nt = zt.nrows();
        let n = ns + nt;
        let d = zs.ncols();

        // Joint matrix with samples as columns, each scaled to unit norm.
        let mut x = DMatrix::zeros(d, n);
        for i in 0..ns {
            x.set_column(i, &zs.row(i).transpose());
        }
        for i in 0..nt {
            x.set_column(ns + i, &zt.row(i).transpose());
        }
        for j in 0..n {
            let norm = x.column(j).norm();
            if norm > 0.0 {
                let mut col = x.column_mut(j);
                col /= norm;
            }
        }

        let k = kernel(params.kernel, &x, None, params.gamma);
        if k.nrows() != n || k.ncols() != n {
            return Err(AdaptError::config(format!(
                "kernel {:?} does not produce an {n}x{n} Gram matrix; the \
                 kernelized solve needs linear or rbf",
                params.kernel
            )));
        }
        let l = laplacian(&x.transpose(), params.neighbors)?;

        let domain_indicator = DMatrix::from_fn(n, n, |i, j| {
            if i == j && i < ns {
                1.0
            } else {
                0.0
            }
        });

        // M0 = C * e e^T with e = [1/ns ...; -1/nt ...]
        let e = DVector::from_fn(n, |i, _| {
            if i < ns {
                1.0 / ns as f64
            } else {
                -1.0 / nt as f64
            }
        });
        let m0 = (&e * e.transpose()) * n_classes as f64;

        let mut label_onehot = DMatrix::zeros(n, n_classes);
        for (i, &label) in ys.iter().enumerate() {
            label_onehot[(i, label - 1)] = 1.0;
        }

        // Normalized rows go back out for the 1-NN seeding and the
        // discrepancy estimator.
        let joint = x.transpose();
        let xs_rows = joint.rows(0, ns).into_owned();
        let xt_rows = joint.rows(ns, nt).into_owned();

        Ok(Self {
            ns,
            nt,
            n_classes,
            xs: xs_rows,
            xt: xt_rows,
            ys: ys.to_vec(),
            kernel: k,
            laplacian: l,
            domain_indicator,
            m0,
            label_onehot,
        })
    }

    /// Total joint sample count.
    pub fn n(&self) -> usize {
        self.ns + self.nt
    }

    /// Full one-hot indicator over source ground truth plus the given
    /// target pseudo-label assignment.
    pub fn one_hot(&self, yt_pseudo: &[usize]) -> DMatrix<f64> {
        let mut f = DMatrix::zeros(self.n(), self.n_classes);
        for (i, &label) in self.ys.iter().enumerate() {
            f[(i, label - 1)] = 1.0;
        }
        for (i, &label) in yt_pseudo.iter().enumerate() {
            f[(self.ns + i, label - 1)] = 1.0;
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::IdentityTransform;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_context() -> AdaptContext {
        let mut rng = StdRng::seed_from_u64(5);
        let xs = DMatrix::from_fn(6, 3, |_, _| rng.gen_range(-1.0..1.0));
        let xt = DMatrix::from_fn(4, 3, |_, _| rng.gen_range(-1.0..1.0));
        let ys = vec![1, 1, 2, 2, 1, 2];
        let params = MedaParams {
            neighbors: 3,
            ..MedaParams::default()
        };
        AdaptContext::build(&xs, &ys, &xt, 2, &IdentityTransform, 3, &params).unwrap()
    }

    #[test]
    fn test_build_shapes() {
        let ctx = small_context();
        assert_eq!(ctx.n(), 10);
        assert_eq!(ctx.kernel.nrows(), 10);
        assert_eq!(ctx.laplacian.nrows(), 10);
        assert_eq!(ctx.m0.nrows(), 10);
        assert_eq!(ctx.label_onehot.ncols(), 2);
        // target block of the stacked one-hot is all zero
        for i in ctx.ns..ctx.n() {
            assert_eq!(ctx.label_onehot.row(i).sum(), 0.0);
        }
    }

    #[test]
    fn test_domain_indicator_diagonal() {
        let ctx = small_context();
        for i in 0..ctx.n() {
            let expect = if i < ctx.ns { 1.0 } else { 0.0 };
            assert_eq!(ctx.domain_indicator[(i, i)], expect);
        }
    }

    #[test]
    fn test_one_hot_rows_sum_to_one() {
        let ctx = small_context();
        let f = ctx.one_hot(&[2, 1, 2, 1]);
        for i in 0..ctx.n() {
            assert!((f.row(i).sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_build_rejects_width_mismatch() {
        let xs = DMatrix::zeros(3, 4);
        let xt = DMatrix::zeros(3, 5);
        let err = AdaptContext::build(
            &xs,
            &[1, 2, 1],
            &xt,
            2,
            &IdentityTransform,
            4,
            &MedaParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AdaptError::DataShapeMismatch(_)));
    }
}
