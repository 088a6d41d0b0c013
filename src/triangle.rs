//! This module defines the [`Triangle`] primitive the hierarchy is built over, along with the
//! shading attributes that travel with it to the renderer.
//!
//! [`Triangle`]: struct.Triangle.html

use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::error::Result;
use crate::vector::{cross, normalize, scale, sub};
use crate::{Point3, Real, Vector3};
use std::collections::HashMap;

/// Texture coordinates used when a triangle is created without any.
const DEFAULT_UVS: [[Real; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];

/// A triangle in world space together with its shading attributes.
///
/// A `Triangle` is immutable once built: its [`Aabb`] is computed from the vertices on
/// construction and cached. The `material` is an opaque payload owned by the caller; the
/// hierarchy only carries it through to the flat buffers.
///
/// [`Aabb`]: ../aabb/struct.Aabb.html
///
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Triangle<M = ()> {
    vertices: [Point3; 3],
    indices: Option<[usize; 3]>,
    uvs: [[Real; 2]; 3],
    normals: [Vector3; 3],
    tangents: [Vector3; 3],
    bitangents: [Vector3; 3],
    material: M,
    aabb: Aabb,
}

impl<M> Triangle<M> {
    /// Creates a new [`Triangle`] from three vertex positions.
    ///
    /// The shading normals default to the face normal and the tangent frame is derived from
    /// the default texture coordinates `(0,0)`, `(1,0)`, `(0,1)`. Fails with
    /// [`BvhError::NonFiniteVertex`] if a coordinate is NaN or infinite.
    ///
    /// # Examples
    /// ```
    /// use tribvh::triangle::Triangle;
    /// use tribvh::Point3;
    ///
    /// let a = Point3::new(0.0, 0.0, 0.0);
    /// let b = Point3::new(1.0, 0.0, 0.0);
    /// let c = Point3::new(0.0, 1.0, 0.0);
    /// let triangle = Triangle::new([a, b, c], "red").unwrap();
    ///
    /// assert_eq!(triangle.face_normal().z, 1.0);
    /// assert_eq!(*triangle.material(), "red");
    /// ```
    ///
    /// [`Triangle`]: struct.Triangle.html
    /// [`BvhError::NonFiniteVertex`]: ../error/enum.BvhError.html
    ///
    pub fn new(vertices: [Point3; 3], material: M) -> Result<Triangle<M>> {
        let aabb = Aabb::from_points(&vertices)?;
        let mut triangle = Triangle {
            vertices,
            indices: None,
            uvs: DEFAULT_UVS,
            normals: [Vector3::zeros(); 3],
            tangents: [Vector3::zeros(); 3],
            bitangents: [Vector3::zeros(); 3],
            material,
            aabb,
        };
        let normal = triangle.face_normal();
        triangle.normals = [normal; 3];
        triangle.update_tangent_frame();
        Ok(triangle)
    }

    /// Records the indices of the vertices in the source mesh.
    pub fn with_indices(mut self, indices: [usize; 3]) -> Triangle<M> {
        self.indices = Some(indices);
        self
    }

    /// Sets the texture coordinates and recomputes the tangent frame from them.
    pub fn with_uvs(mut self, uvs: [[Real; 2]; 3]) -> Triangle<M> {
        self.uvs = uvs;
        self.update_tangent_frame();
        self
    }

    /// Overrides the per-vertex shading normals.
    pub fn with_normals(mut self, normals: [Vector3; 3]) -> Triangle<M> {
        self.normals = normals;
        self
    }

    /// Overrides the per-vertex tangents and bitangents.
    pub fn with_tangent_frame(
        mut self,
        tangents: [Vector3; 3],
        bitangents: [Vector3; 3],
    ) -> Triangle<M> {
        self.tangents = tangents;
        self.bitangents = bitangents;
        self
    }

    /// The three vertex positions.
    pub fn vertices(&self) -> &[Point3; 3] {
        &self.vertices
    }

    /// The source mesh indices of the three vertices, if known.
    pub fn indices(&self) -> Option<[usize; 3]> {
        self.indices
    }

    /// The texture coordinates of the three vertices.
    pub fn uvs(&self) -> &[[Real; 2]; 3] {
        &self.uvs
    }

    /// The shading normals of the three vertices.
    pub fn normals(&self) -> &[Vector3; 3] {
        &self.normals
    }

    /// The tangents of the three vertices.
    pub fn tangents(&self) -> &[Vector3; 3] {
        &self.tangents
    }

    /// The bitangents of the three vertices.
    pub fn bitangents(&self) -> &[Vector3; 3] {
        &self.bitangents
    }

    /// The opaque material payload.
    pub fn material(&self) -> &M {
        &self.material
    }

    /// Returns the centroid of this triangle's [`Aabb`] on `axis`.
    ///
    /// [`Aabb`]: ../aabb/struct.Aabb.html
    ///
    #[inline]
    pub fn centroid(&self, axis: Axis) -> Real {
        self.aabb.centroid(axis)
    }

    /// Returns the unit normal of the plane spanned by the vertices, following the
    /// counter-clockwise winding `a -> b -> c`. Degenerate triangles return the zero vector.
    pub fn face_normal(&self) -> Vector3 {
        let [a, b, c] = self.vertices;
        normalize(&cross(&sub(&b.coords, &a.coords), &sub(&c.coords, &a.coords)))
    }

    /// Computes a flat tangent frame from the vertex positions and texture coordinates.
    ///
    /// When the texture mapping is degenerate (zero UV area) an arbitrary orthonormal frame
    /// around the face normal is returned instead.
    pub fn compute_tangent_frame(&self) -> (Vector3, Vector3) {
        let [a, b, c] = self.vertices;
        let edge1 = sub(&b.coords, &a.coords);
        let edge2 = sub(&c.coords, &a.coords);

        let du1 = self.uvs[1][0] - self.uvs[0][0];
        let dv1 = self.uvs[1][1] - self.uvs[0][1];
        let du2 = self.uvs[2][0] - self.uvs[0][0];
        let dv2 = self.uvs[2][1] - self.uvs[0][1];

        let det = du1 * dv2 - du2 * dv1;
        if det.abs() > Real::EPSILON {
            let r = 1.0 / det;
            let tangent = normalize(&scale(&sub(&scale(&edge1, dv2), &scale(&edge2, dv1)), r));
            let bitangent = normalize(&scale(&sub(&scale(&edge2, du1), &scale(&edge1, du2)), r));
            if tangent != Vector3::zeros() && bitangent != Vector3::zeros() {
                return (tangent, bitangent);
            }
        }
        orthonormal_frame(&self.face_normal())
    }

    fn update_tangent_frame(&mut self) {
        let (tangent, bitangent) = self.compute_tangent_frame();
        self.tangents = [tangent; 3];
        self.bitangents = [bitangent; 3];
    }
}

impl<M> Bounded for Triangle<M> {
    fn aabb(&self) -> Aabb {
        self.aabb
    }
}

/// Builds two unit vectors perpendicular to `normal` and to each other.
/// A zero `normal` yields the X and Y axes.
fn orthonormal_frame(normal: &Vector3) -> (Vector3, Vector3) {
    if *normal == Vector3::zeros() {
        return (Vector3::x(), Vector3::y());
    }
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let tangent = normalize(&cross(&helper, normal));
    let bitangent = cross(normal, &tangent);
    (tangent, bitangent)
}

/// Replaces the shading normals of all `triangles` by the average of the face normals of
/// every triangle sharing the same source mesh vertex. Triangles without mesh indices keep
/// their normals.
///
/// # Examples
/// ```
/// use tribvh::triangle::{smooth_normals, Triangle};
/// use tribvh::Point3;
///
/// // Two triangles folded along the shared edge 0-1.
/// let p = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let mut triangles = vec![
///     Triangle::new([p[0], p[1], p[2]], ()).unwrap().with_indices([0, 1, 2]),
///     Triangle::new([p[0], p[1], p[3]], ()).unwrap().with_indices([0, 1, 3]),
/// ];
/// smooth_normals(&mut triangles);
///
/// // The shared vertices blend both faces, the others keep their face normal.
/// let shared = triangles[0].normals()[0];
/// assert!(shared.y < 0.0 && shared.z > 0.0);
/// assert_eq!(triangles[0].normals()[2], triangles[0].face_normal());
/// ```
pub fn smooth_normals<M>(triangles: &mut [Triangle<M>]) {
    let mut accumulated: HashMap<usize, Vector3> = HashMap::new();
    for triangle in triangles.iter() {
        if let Some(indices) = triangle.indices {
            let normal = triangle.face_normal();
            for index in indices {
                *accumulated.entry(index).or_insert_with(Vector3::zeros) += normal;
            }
        }
    }

    for triangle in triangles.iter_mut() {
        if let Some(indices) = triangle.indices {
            for (normal, index) in triangle.normals.iter_mut().zip(indices) {
                if let Some(sum) = accumulated.get(&index) {
                    *normal = normalize(sum);
                }
            }
        }
    }
}
