//! Subspace-alignment collaborator seam.
//!
//! The geodesic-flow feature transform used by the original system is an
//! external collaborator: the pipeline only depends on this narrow
//! contract, and ships a pass-through implementation.

use nalgebra::DMatrix;

use crate::error::Result;

/// Maps source and target feature matrices (rows = samples) into a shared
/// subspace of the requested dimensionality.
pub trait SubspaceTransform {
    fn project(
        &self,
        xs: &DMatrix<f64>,
        xt: &DMatrix<f64>,
        dim: usize,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)>;
}

/// Pass-through used when no external subspace-alignment implementation is
/// wired in; the requested dimensionality is ignored.
pub struct IdentityTransform;

impl SubspaceTransform for IdentityTransform {
    fn project(
        &self,
        xs: &DMatrix<f64>,
        xt: &DMatrix<f64>,
        dim: usize,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        if dim != xs.ncols() {
            log::debug!(
                "identity transform keeps {} features (requested dim {})",
                xs.ncols(),
                dim
            );
        }
        Ok((xs.clone(), xt.clone()))
    }
}
