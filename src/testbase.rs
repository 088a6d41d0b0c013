//! Common utilities shared by unit tests.
#![cfg(test)]

use crate::aabb::Aabb;
use crate::triangle::Triangle;
use crate::{Point3, Real, Vector3};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A vector represented as a tuple
pub type TupleVec = (Real, Real, Real);

/// Generate a `TupleVec` for [`proptest::strategy::Strategy`] from -10e10 to 10e10
/// A small enough range to prevent most fp32 errors from breaking certain tests
pub fn tuplevec_small_strategy() -> impl Strategy<Value = TupleVec> {
    (
        -10e10 as Real..10e10 as Real,
        -10e10 as Real..10e10 as Real,
        -10e10 as Real..10e10 as Real,
    )
}

/// Generate a `TupleVec` for [`proptest::strategy::Strategy`] inside the default test bounds.
pub fn tuplevec_scene_strategy() -> impl Strategy<Value = TupleVec> {
    (
        -1000.0 as Real..1000.0 as Real,
        -1000.0 as Real..1000.0 as Real,
        -1000.0 as Real..1000.0 as Real,
    )
}

/// Convert a `TupleVec` to a [`Point3`].
pub fn tuple_to_point(tpl: &TupleVec) -> Point3 {
    Point3::new(tpl.0, tpl.1, tpl.2)
}

/// Convert a `TupleVec` to a [`Vector3`].
pub fn tuple_to_vector(tpl: &TupleVec) -> Vector3 {
    Vector3::new(tpl.0, tpl.1, tpl.2)
}

/// Generates lists of 1 to `max_len` triangles with vertices inside the default test bounds.
pub fn triangles_strategy(max_len: usize) -> impl Strategy<Value = Vec<Triangle>> {
    prop::collection::vec(
        (
            tuplevec_scene_strategy(),
            tuplevec_scene_strategy(),
            tuplevec_scene_strategy(),
        ),
        1..=max_len,
    )
    .prop_map(|corners| {
        corners
            .iter()
            .map(|(a, b, c)| {
                Triangle::new([tuple_to_point(a), tuple_to_point(b), tuple_to_point(c)], ())
                    .unwrap()
            })
            .collect()
    })
}

/// A triangle collapsed onto a single point.
pub fn point_triangle(x: Real, y: Real, z: Real) -> Triangle {
    let p = Point3::new(x, y, z);
    Triangle::new([p, p, p], ()).unwrap()
}

/// A small triangle in the XY plane around `center`.
pub fn tiny_triangle(center: Point3, size: Real) -> Triangle {
    Triangle::new(
        [
            center + Vector3::new(-size, -size, 0.0),
            center + Vector3::new(size, -size, 0.0),
            center + Vector3::new(0.0, size, 0.0),
        ],
        (),
    )
    .unwrap()
}

/// Eight tiny triangles centered in the octants of the unit cube around the origin.
/// Triangle `i` sits at `x = ±0.5` by bit 0, `y` by bit 1 and `z` by bit 2.
pub fn octant_triangles() -> Vec<Triangle> {
    (0..8)
        .map(|i| {
            let coord = |bit: usize| if i & (1 << bit) == 0 { -0.5 } else { 0.5 };
            tiny_triangle(Point3::new(coord(0), coord(1), coord(2)), 0.01)
        })
        .collect()
}

/// Two triangles forming the unit square in the XY plane.
pub fn unit_square() -> Vec<Triangle> {
    let p = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    vec![
        Triangle::new([p[0], p[1], p[2]], ())
            .unwrap()
            .with_indices([0, 1, 2]),
        Triangle::new([p[0], p[2], p[3]], ())
            .unwrap()
            .with_indices([0, 2, 3]),
    ]
}

/// Creates a unit size cube centered at `pos` and pushes the triangles to `shapes`.
pub fn push_cube(pos: Point3, shapes: &mut Vec<Triangle>) {
    let top_front_right = pos + Vector3::new(0.5, 0.5, -0.5);
    let top_back_right = pos + Vector3::new(0.5, 0.5, 0.5);
    let top_back_left = pos + Vector3::new(-0.5, 0.5, 0.5);
    let top_front_left = pos + Vector3::new(-0.5, 0.5, -0.5);
    let bottom_front_right = pos + Vector3::new(0.5, -0.5, -0.5);
    let bottom_back_right = pos + Vector3::new(0.5, -0.5, 0.5);
    let bottom_back_left = pos + Vector3::new(-0.5, -0.5, 0.5);
    let bottom_front_left = pos + Vector3::new(-0.5, -0.5, -0.5);

    let faces = [
        [top_back_right, top_front_right, top_front_left],
        [top_front_left, top_back_left, top_back_right],
        [bottom_front_left, bottom_front_right, bottom_back_right],
        [bottom_back_right, bottom_back_left, bottom_front_left],
        [top_back_left, top_front_left, bottom_front_left],
        [bottom_front_left, bottom_back_left, top_back_left],
        [bottom_front_right, top_front_right, top_back_right],
        [top_back_right, bottom_back_right, bottom_front_right],
        [top_front_left, top_front_right, bottom_front_right],
        [bottom_front_right, bottom_front_left, top_front_left],
        [bottom_back_right, top_back_right, top_back_left],
        [top_back_left, bottom_back_left, bottom_back_right],
    ];
    for vertices in faces {
        shapes.push(Triangle::new(vertices, ()).unwrap());
    }
}

/// Implementation of splitmix64.
/// For reference see: http://xoroshiro.di.unimi.it/splitmix64.c
fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9E3779B97F4A7C15u64);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9u64);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EBu64);
    z ^ (z >> 31)
}

/// Generates a new `Point3`, which will lie inside the given `aabb`. Mutates the seed.
pub fn next_point3(seed: &mut u64, aabb: &Aabb) -> Point3 {
    let u = splitmix64(seed);
    let a = (u >> 43) as Real / (1u64 << 21) as Real;
    let b = ((u >> 22) & 0x1F_FFFF) as Real / (1u64 << 21) as Real;
    let c = (u & 0x3F_FFFF) as Real / (1u64 << 22) as Real;
    let size = aabb.size();
    aabb.min + Vector3::new(a * size.x, b * size.y, c * size.z)
}

/// Returns an `Aabb` which defines the default testing space bounds.
pub fn default_bounds() -> Aabb {
    Aabb::with_bounds(
        Point3::new(-1000.0, -1000.0, -1000.0),
        Point3::new(1000.0, 1000.0, 1000.0),
    )
}

/// Creates `n` deterministic random cubes. Returns the `Vec` of surface `Triangle`s.
pub fn create_n_cubes(n: usize, bounds: &Aabb) -> Vec<Triangle> {
    let mut vec = Vec::new();
    let mut seed = 0;
    for _ in 0..n {
        push_cube(next_point3(&mut seed, bounds), &mut vec);
    }
    vec
}

/// Creates `n` triangles with random vertices in the unit cube, tagged with their input
/// position as material.
pub fn random_triangles(n: usize, seed: u64) -> Vec<Triangle<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut point = || Point3::new(rng.random(), rng.random(), rng.random());
    (0..n)
        .map(|i| Triangle::new([point(), point(), point()], i).unwrap())
        .collect()
}
