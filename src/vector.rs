//! Small vector helpers used by the geometry code.
//!
//! These are thin wrappers around [`nalgebra`] so that call sites read like the math they
//! implement. Rotations about an arbitrary axis use [`nalgebra::Rotation3`].

use crate::{Real, Vector3};
use nalgebra::{Rotation3, Unit};

/// Returns `a + b`.
#[inline]
pub fn add(a: &Vector3, b: &Vector3) -> Vector3 {
    a + b
}

/// Returns `a - b`.
#[inline]
pub fn sub(a: &Vector3, b: &Vector3) -> Vector3 {
    a - b
}

/// Returns `v * s`.
#[inline]
pub fn scale(v: &Vector3, s: Real) -> Vector3 {
    v * s
}

/// Returns the dot product of `a` and `b`.
#[inline]
pub fn dot(a: &Vector3, b: &Vector3) -> Real {
    a.dot(b)
}

/// Returns the cross product `a x b`.
#[inline]
pub fn cross(a: &Vector3, b: &Vector3) -> Vector3 {
    a.cross(b)
}

/// Returns the euclidean length of `v`.
#[inline]
pub fn magnitude(v: &Vector3) -> Real {
    v.norm()
}

/// Returns `v` scaled to unit length. The zero vector is returned unchanged.
pub fn normalize(v: &Vector3) -> Vector3 {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Returns the componentwise reciprocal of `v`.
#[inline]
pub fn inverse(v: &Vector3) -> Vector3 {
    v.map(|x| 1.0 / x)
}

/// Returns the componentwise minimum of `a` and `b`.
#[inline]
pub fn min(a: &Vector3, b: &Vector3) -> Vector3 {
    a.inf(b)
}

/// Returns the componentwise maximum of `a` and `b`.
#[inline]
pub fn max(a: &Vector3, b: &Vector3) -> Vector3 {
    a.sup(b)
}

/// Rotates `v` by `angle` radians around the X axis, about the point `pivot`.
pub fn rotate_x(v: &Vector3, angle: Real, pivot: &Vector3) -> Vector3 {
    rotate_about(v, &Vector3::x_axis(), angle, pivot)
}

/// Rotates `v` by `angle` radians around the Y axis, about the point `pivot`.
pub fn rotate_y(v: &Vector3, angle: Real, pivot: &Vector3) -> Vector3 {
    rotate_about(v, &Vector3::y_axis(), angle, pivot)
}

/// Rotates `v` by `angle` radians around `axis`, which passes through the origin.
/// A zero `axis` leaves `v` untouched.
pub fn rotate_arbitrary(v: &Vector3, axis: &Vector3, angle: Real) -> Vector3 {
    match Unit::try_new(*axis, 0.0) {
        Some(axis) => Rotation3::from_axis_angle(&axis, angle) * v,
        None => *v,
    }
}

fn rotate_about(v: &Vector3, axis: &Unit<Vector3>, angle: Real, pivot: &Vector3) -> Vector3 {
    Rotation3::from_axis_angle(axis, angle) * (v - pivot) + pivot
}
