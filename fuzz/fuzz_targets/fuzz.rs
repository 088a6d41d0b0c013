#![no_main]
use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ordered_float::NotNan;
use tribvh::bvh::Bvh;
use tribvh::config::BuildConfig;
use tribvh::triangle::Triangle;
use tribvh::{Point3, Real, Vector3};

const LIMIT: Real = 1_000_000.0;

fuzz_target!(|workload: Workload| {
    workload.fuzz();
});

#[derive(Arbitrary)]
struct ArbitraryPoint {
    coordinates: [NotNan<Real>; 3],
}

impl ArbitraryPoint {
    fn point(&self) -> Point3 {
        let [x, y, z] = self.coordinates.map(|f| f.into_inner().clamp(-LIMIT, LIMIT));
        Point3::new(x, y, z)
    }
}

impl Debug for ArbitraryPoint {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&self.point(), f)
    }
}

#[derive(Debug, Arbitrary)]
struct ArbitraryTriangle {
    vertices: [ArbitraryPoint; 3],
    material: u16,
}

impl ArbitraryTriangle {
    fn triangle(&self) -> Triangle<u16> {
        let vertices = [
            self.vertices[0].point(),
            self.vertices[1].point(),
            self.vertices[2].point(),
        ];
        Triangle::new(vertices, self.material).expect("clamped coordinates are finite")
    }
}

#[derive(Debug, Arbitrary)]
struct Workload {
    triangles: Vec<ArbitraryTriangle>,
    leaf_size: u8,
    traversal_cost: NotNan<Real>,
    direction: ArbitraryPoint,
}

impl Workload {
    fn fuzz(self) {
        let triangles = self
            .triangles
            .iter()
            .map(ArbitraryTriangle::triangle)
            .collect::<Vec<_>>();
        let config = BuildConfig::default()
            .with_leaf_size(self.leaf_size as usize)
            .with_traversal_cost(self.traversal_cost.into_inner());

        let bvh = match Bvh::build_with_config(triangles.clone(), config) {
            Ok(bvh) => bvh,
            // Empty input, zero leaf size or a negative cost.
            Err(_) => return,
        };
        bvh.assert_consistent();

        let parallel = Bvh::build_par_with_config(triangles, config).unwrap();
        assert_eq!(bvh.nodes(), parallel.nodes());
        assert_eq!(bvh.triangle_order(), parallel.triangle_order());

        let flat = bvh.flatten();
        assert_eq!(flat.nodes.len(), bvh.nodes().len());
        assert_eq!(flat.triangles().len(), bvh.triangles().len());

        // Entering every node reaches every leaf exactly once, in any direction.
        let direction: Vector3 = self.direction.point().coords;
        let leaves = flat
            .stackless_iter(direction, |_, _| true)
            .collect::<Vec<_>>();
        assert_eq!(leaves.len(), bvh.leaf_count());
        assert_eq!(leaves.iter().collect::<HashSet<_>>().len(), leaves.len());
    }
}
