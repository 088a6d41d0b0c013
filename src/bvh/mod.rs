//! This module defines a [`Bvh`] over triangles, built with the surface area heuristic.
//!
//! [`Bvh`]: struct.Bvh.html
//!

mod axis_indices;
mod bvh_impl;
mod bvh_node;

pub use self::bvh_impl::*;
pub use self::bvh_node::*;
