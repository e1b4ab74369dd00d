//! Evolutionary manifold-regularized domain adaptation.
//!
//! Given labeled source-domain samples and unlabeled target-domain
//! samples, this crate predicts target labels two ways: a plain iterative
//! regularized least-squares loop (MEDA), and an evolutionary search over
//! discrete label assignments that uses the same objective as its fitness
//! oracle and re-anchors its population with MEDA refinement steps.

pub mod baseline;
pub mod context;
pub mod data;
pub mod discrepancy;
pub mod error;
pub mod evolve;
pub mod matrices;
pub mod meda;
pub mod report;
pub mod transform;
pub mod voting;
