use flexi_logger::{detailed_format, Logger};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tribvh::bvh::Bvh;
use tribvh::config::BuildConfig;
use tribvh::triangle::{smooth_normals, Triangle};
use tribvh::{Point3, Real, Vector3};

/// Builds a grid of `size * size` quads with random heights, two triangles per quad.
fn height_field(size: usize, rng: &mut StdRng) -> Vec<Triangle<u32>> {
    let heights = (0..(size + 1) * (size + 1))
        .map(|_| rng.random_range(0.0..2.0))
        .collect::<Vec<Real>>();
    let vertex = |x: usize, z: usize| {
        let index = z * (size + 1) + x;
        (index, Point3::new(x as Real, heights[index], z as Real))
    };

    let mut triangles = Vec::with_capacity(size * size * 2);
    for z in 0..size {
        for x in 0..size {
            let material = ((x + z) % 4) as u32;
            let (i00, p00) = vertex(x, z);
            let (i10, p10) = vertex(x + 1, z);
            let (i01, p01) = vertex(x, z + 1);
            let (i11, p11) = vertex(x + 1, z + 1);
            for (indices, points) in [
                ([i00, i01, i10], [p00, p01, p10]),
                ([i10, i01, i11], [p10, p01, p11]),
            ] {
                let triangle = Triangle::new(points, material)
                    .expect("finite heights")
                    .with_indices(indices);
                triangles.push(triangle);
            }
        }
    }
    triangles
}

pub fn main() {
    Logger::try_with_str("debug")
        .unwrap()
        .format(detailed_format)
        .start()
        .unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    let mut triangles = height_field(200, &mut rng);
    smooth_normals(&mut triangles);

    let config = BuildConfig::default().with_leaf_size(4);
    let bvh = Bvh::build_par_with_config(triangles, config).unwrap();
    bvh.assert_consistent();
    info!(
        "{} triangles, {} nodes, {} leaves, depth {}",
        bvh.triangles().len(),
        bvh.nodes().len(),
        bvh.leaf_count(),
        bvh.depth()
    );

    let flat = bvh.flatten();
    let nodes = flat.node_buffer();
    let positions = flat.triangle_buffer();
    info!(
        "Node buffer: {} floats, triangle buffer: {} floats, uv buffer: {} floats",
        nodes.len(),
        positions.len(),
        flat.uv_buffer().len()
    );

    // Count the leaves a ray straight down through the middle of the field would consider.
    let (x, z) = (100.5, 100.5);
    let hit = flat
        .stackless_iter(Vector3::new(0.0, -1.0, 0.0), |_, node| {
            let aabb = &node.aabb;
            aabb.min.x <= x && x <= aabb.max.x && aabb.min.z <= z && z <= aabb.max.z
        })
        .collect::<Vec<_>>();
    info!("Leaves below ({}, {}): {:?}", x, z, hit);
}
