//! A crate which builds a binary bounding volume hierarchy over triangles using the
//! surface area heuristic, and flattens it into a linear record layout which a renderer
//! can walk without a traversal stack.
//!
//! ## About
//!
//! Ray tracers spend most of their time finding the closest primitive along a ray. A BVH
//! reduces that search from O(n) to roughly O(log2(n)) at the cost of building the tree once
//! in advance. This crate only builds and serializes the tree. Traversal itself happens on
//! the rendering device, which consumes the flat buffers produced by [`flat_bvh`].
//!
//! The builder sorts the triangle indices once per axis and keeps the three sorted views in
//! sync while partitioning, so no node ever re-sorts its primitives.
//!
//! ## Example
//!
//! ```
//! use tribvh::bvh::Bvh;
//! use tribvh::triangle::Triangle;
//! use tribvh::Point3;
//!
//! let mut triangles = Vec::new();
//! for i in 0..64 {
//!     let x = i as tribvh::Real;
//!     let a = Point3::new(x, 0.0, 0.0);
//!     let b = Point3::new(x + 1.0, 0.0, 0.0);
//!     let c = Point3::new(x, 1.0, 0.0);
//!     triangles.push(Triangle::new([a, b, c], ()).unwrap());
//! }
//!
//! let bvh = Bvh::build(triangles, 4).unwrap();
//! let flat = bvh.flatten();
//! let nodes = flat.node_buffer();
//! let positions = flat.triangle_buffer();
//! assert_eq!(nodes.len(), flat.nodes.len() * 12);
//! assert_eq!(positions.len(), 64 * 9);
//! ```
//!
//! ## Features
//!
//! - `rayon` (default **enabled**) - adds [`Bvh::build_par`] which builds sibling subtrees in parallel
//! - `serde` (default **disabled**) - adds `Serialize` and `Deserialize` implementations for some types
//! - `f64` (default **disabled**) - switches [`Real`] from `f32` to `f64`
//!
//! [`Bvh::build_par`]: bvh/struct.Bvh.html#method.build_par
//!

#[cfg(feature = "f64")]
/// Float type used by this crate
pub type Real = f64;

#[cfg(not(feature = "f64"))]
/// Float type used by this crate
pub type Real = f32;

/// Point math type used by this crate. Type alias for [`nalgebra::Point3`].
pub type Point3 = nalgebra::Point3<Real>;

/// Vector math type used by this crate. Type alias for [`nalgebra::Vector3`].
pub type Vector3 = nalgebra::Vector3<Real>;

/// A minimal floating value used as a lower bound.
pub const EPSILON: Real = 0.00001;

pub mod aabb;
pub mod axis;
pub mod bvh;
pub mod config;
pub mod error;
pub mod flat_bvh;
pub mod triangle;
pub mod vector;

pub use crate::error::{BvhError, Result};

#[cfg(test)]
mod testbase;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
