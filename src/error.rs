//! Error types for the adaptation pipeline.

use thiserror::Error;

/// Unified error type for all operations in this crate.
#[derive(Error, Debug)]
pub enum AdaptError {
    /// Bad run parameters: malformed configuration file, unknown kernel
    /// type, a neighbor count that is too large for the sample count.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Singular or ill-conditioned system in the refinement solve.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// Source/target feature widths or label vector lengths disagree,
    /// or an input table is malformed.
    #[error("data shape mismatch: {0}")]
    DataShapeMismatch(String),

    /// I/O errors while reading input tables or writing the run report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdaptError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        AdaptError::InvalidConfiguration(message.into())
    }

    /// Creates a numerical-instability error.
    pub fn numerical(message: impl Into<String>) -> Self {
        AdaptError::NumericalInstability(message.into())
    }

    /// Creates a shape-mismatch error.
    pub fn shape(message: impl Into<String>) -> Self {
        AdaptError::DataShapeMismatch(message.into())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AdaptError>;
