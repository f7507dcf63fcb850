//! Dense linear algebra for the rxn kinetics runtime
//!
//! This crate provides the small amount of numerical plumbing the stiff
//! integrator backend needs: a row-major dense matrix with LU
//! factorization, and the weighted norms used for error control and
//! Newton convergence tests.

#![deny(missing_docs)]
#![warn(clippy::all)]

use thiserror::Error;

pub mod matrix;
pub mod norms;

pub use matrix::{LuDecomposition, Matrix};
pub use norms::{max_norm, weighted_rms_norm};

/// Result type for math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Errors from dense linear algebra routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// Operand dimensions do not agree
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        got: usize,
    },

    /// Matrix is singular to working precision
    #[error("Singular matrix: zero pivot in column {column}")]
    SingularMatrix {
        /// Column at which elimination found no usable pivot
        column: usize,
    },

    /// Index outside the valid range
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Container length
        length: usize,
    },
}
