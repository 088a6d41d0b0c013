//! Error types for building a [`Bvh`].
//!
//! Only malformed input is reported through [`BvhError`]. Broken partitioning invariants are
//! defects and trip assertions instead.
//!
//! [`Bvh`]: ../bvh/struct.Bvh.html

use crate::Real;
use thiserror::Error;

/// Error type for BVH construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvhError {
    /// No triangles were supplied.
    #[error("Invalid input: cannot build a BVH over zero triangles")]
    EmptyInput,

    /// The maximum number of triangles per leaf must be at least one.
    #[error("Invalid input: leaf size must be at least 1, got {0}")]
    InvalidLeafSize(usize),

    /// The SAH traversal cost must be a finite, non-negative number.
    #[error("Invalid input: traversal cost must be finite and non-negative, got {0}")]
    InvalidTraversalCost(Real),

    /// An axis index outside of `0..3`.
    #[error("Invalid input: axis index must be 0, 1 or 2, got {0}")]
    InvalidAxis(usize),

    /// A vertex coordinate was NaN or infinite.
    #[error("Invalid input: triangle {triangle} has a non-finite coordinate in vertex {vertex}")]
    NonFiniteVertex {
        /// Index of the offending triangle in the input, if known.
        triangle: usize,
        /// Which of the three vertices (0, 1 or 2) is affected.
        vertex: usize,
    },
}

impl BvhError {
    /// Rewrites the triangle index of a [`BvhError::NonFiniteVertex`].
    /// Triangles validate themselves before they know their position in the input.
    pub(crate) fn at_triangle(self, index: usize) -> BvhError {
        match self {
            BvhError::NonFiniteVertex { vertex, .. } => BvhError::NonFiniteVertex {
                triangle: index,
                vertex,
            },
            other => other,
        }
    }
}

/// Result type for fallible operations of this crate.
pub type Result<T> = std::result::Result<T, BvhError>;
