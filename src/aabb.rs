//! Axis Aligned Bounding Boxes.

use crate::axis::Axis;
use crate::error::{BvhError, Result};
use crate::{Point3, Real, Vector3};
use std::fmt;

/// Aabb struct.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    /// Minimum coordinates
    pub min: Point3,

    /// Maximum coordinates
    pub max: Point3,
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Min bound: {}; Max bound: {}", self.min, self.max)
    }
}

/// A trait implemented by things which can be bounded by an [`Aabb`].
///
/// [`Aabb`]: struct.Aabb.html
///
pub trait Bounded {
    /// Returns the geometric bounds of this object in the form of an [`Aabb`].
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::{Aabb, Bounded};
    /// use tribvh::Point3;
    ///
    /// struct Something;
    ///
    /// impl Bounded for Something {
    ///     fn aabb(&self) -> Aabb {
    ///         let point1 = Point3::new(0.0,0.0,0.0);
    ///         let point2 = Point3::new(1.0,1.0,1.0);
    ///         Aabb::with_bounds(point1, point2)
    ///     }
    /// }
    ///
    /// let something = Something;
    /// let aabb = something.aabb();
    ///
    /// assert!(aabb.contains(&Point3::new(0.0,0.0,0.0)));
    /// assert!(aabb.contains(&Point3::new(1.0,1.0,1.0)));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    fn aabb(&self) -> Aabb;
}

impl<T: Bounded> Bounded for &T {
    fn aabb(&self) -> Aabb {
        T::aabb(self)
    }
}

impl Aabb {
    /// Creates a new [`Aabb`] with the given bounds.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0,-1.0,-1.0), Point3::new(1.0,1.0,1.0));
    /// assert_eq!(aabb.min.x, -1.0);
    /// assert_eq!(aabb.max.z, 1.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn with_bounds(min: Point3, max: Point3) -> Aabb {
        Aabb { min, max }
    }

    /// Creates a new empty [`Aabb`]. Its minimum is `+inf` and its maximum is `-inf` on every
    /// axis, so the first [`grow`] or [`join`] replaces both bounds.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    ///
    /// let aabb = Aabb::empty();
    /// assert!(aabb.is_empty());
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`grow`]: struct.Aabb.html#method.grow
    /// [`join`]: struct.Aabb.html#method.join
    ///
    pub fn empty() -> Aabb {
        Aabb {
            min: Point3::new(Real::INFINITY, Real::INFINITY, Real::INFINITY),
            max: Point3::new(Real::NEG_INFINITY, Real::NEG_INFINITY, Real::NEG_INFINITY),
        }
    }

    /// Creates the tightest [`Aabb`] around `points`, rejecting non-finite coordinates.
    /// The returned error names the offending position in `points` as its `vertex`.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let points = [Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 2.0, -1.0)];
    /// let aabb = Aabb::from_points(&points).unwrap();
    /// assert_eq!(aabb.min, Point3::new(0.0, 0.0, -1.0));
    /// assert_eq!(aabb.max, Point3::new(1.0, 2.0, 0.0));
    ///
    /// let broken = [Point3::new(tribvh::Real::NAN, 0.0, 0.0)];
    /// assert!(Aabb::from_points(&broken).is_err());
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn from_points(points: &[Point3]) -> Result<Aabb> {
        let mut aabb = Aabb::empty();
        for (vertex, point) in points.iter().enumerate() {
            aabb.try_grow(point).map_err(|_| BvhError::NonFiniteVertex {
                triangle: 0,
                vertex,
            })?;
        }
        Ok(aabb)
    }

    /// Returns true if the [`Aabb`] has not been grown yet, i.e. `min > max` on some axis.
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Returns true if the [`Point3`] is inside the [`Aabb`].
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let min = Point3::new(-1.0,-1.0,-1.0);
    /// let max = Point3::new(1.0,1.0,1.0);
    /// let aabb = Aabb::with_bounds(min, max);
    /// let point_inside = Point3::new(0.125,-0.25,0.5);
    /// let point_outside = Point3::new(1.0,-2.0,4.0);
    ///
    /// assert!(aabb.contains(&point_inside));
    /// assert!(!aabb.contains(&point_outside));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Returns true if the [`Point3`] is approximately inside the [`Aabb`]
    /// with respect to some `epsilon`.
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn approx_contains_eps(&self, p: &Point3, epsilon: Real) -> bool {
        (p.x - self.min.x) > -epsilon
            && (p.x - self.max.x) < epsilon
            && (p.y - self.min.y) > -epsilon
            && (p.y - self.max.y) < epsilon
            && (p.z - self.min.z) > -epsilon
            && (p.z - self.max.z) < epsilon
    }

    /// Returns true if the `other` [`Aabb`] is approximately inside this [`Aabb`]
    /// with respect to some `epsilon`.
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn approx_contains_aabb_eps(&self, other: &Aabb, epsilon: Real) -> bool {
        self.approx_contains_eps(&other.min, epsilon)
            && self.approx_contains_eps(&other.max, epsilon)
    }

    /// Returns true if the `other` [`Aabb`] is approximately equal to this [`Aabb`]
    /// with respect to some `epsilon`.
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn relative_eq(&self, other: &Aabb, epsilon: Real) -> bool {
        let close = |a: Real, b: Real| {
            a == b || (a - b).abs() <= epsilon * a.abs().max(b.abs()).max(1.0)
        };
        (0..3).all(|i| close(self.min[i], other.min[i]) && close(self.max[i], other.max[i]))
    }

    /// Returns a new minimal [`Aabb`] which contains both this [`Aabb`] and `other`.
    /// The result is the convex hull of the both [`Aabb`]s.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let aabb1 = Aabb::with_bounds(Point3::new(-101.0,0.0,0.0), Point3::new(-100.0,1.0,1.0));
    /// let aabb2 = Aabb::with_bounds(Point3::new(100.0,0.0,0.0), Point3::new(101.0,1.0,1.0));
    /// let joint = aabb1.join(&aabb2);
    ///
    /// assert!(joint.contains(&Point3::new(-100.5, 0.5, 0.5)));
    /// assert!(joint.contains(&Point3::new(100.5, 0.5, 0.5)));
    /// assert!(joint.contains(&Point3::new(0.0, 0.5, 0.5)));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn join(&self, other: &Aabb) -> Aabb {
        Aabb::with_bounds(
            Point3::from(self.min.coords.inf(&other.min.coords)),
            Point3::from(self.max.coords.sup(&other.max.coords)),
        )
    }

    /// Mutable version of [`Aabb::join`].
    ///
    /// [`Aabb::join`]: struct.Aabb.html#method.join
    ///
    pub fn join_mut(&mut self, other: &Aabb) {
        *self = self.join(other);
    }

    /// Returns a new minimal [`Aabb`] which contains both
    /// this [`Aabb`] and the [`Point3`] `other`.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let point1 = Point3::new(0.0, 0.0, 0.0);
    /// let point2 = Point3::new(1.0, 1.0, 1.0);
    /// let point3 = Point3::new(2.0, 2.0, 2.0);
    ///
    /// let aabb = Aabb::empty();
    /// assert!(!aabb.contains(&point1));
    ///
    /// let aabb1 = aabb.grow(&point1);
    /// assert!(aabb1.contains(&point1));
    ///
    /// let aabb2 = aabb.grow(&point2);
    /// assert!(aabb2.contains(&point2));
    /// assert!(!aabb2.contains(&point3));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn grow(&self, other: &Point3) -> Aabb {
        Aabb::with_bounds(
            Point3::from(self.min.coords.inf(&other.coords)),
            Point3::from(self.max.coords.sup(&other.coords)),
        )
    }

    /// Mutable version of [`Aabb::grow`].
    ///
    /// [`Aabb::grow`]: struct.Aabb.html#method.grow
    ///
    pub fn grow_mut(&mut self, other: &Point3) {
        *self = self.grow(other);
    }

    /// Checked version of [`Aabb::grow_mut`]. A NaN or infinite coordinate would silently
    /// poison every later min/max, so it is rejected before touching the bounds.
    ///
    /// [`Aabb::grow_mut`]: struct.Aabb.html#method.grow_mut
    ///
    pub fn try_grow(&mut self, other: &Point3) -> Result<()> {
        if !other.coords.iter().all(|c| c.is_finite()) {
            return Err(BvhError::NonFiniteVertex {
                triangle: 0,
                vertex: 0,
            });
        }
        self.grow_mut(other);
        Ok(())
    }

    /// Returns the size of this [`Aabb`] in all three dimensions.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0,-1.0,-1.0), Point3::new(1.0,1.0,1.0));
    /// let size = aabb.size();
    /// assert!(size.x == 2.0 && size.y == 2.0 && size.z == 2.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn size(&self) -> Vector3 {
        self.max - self.min
    }

    /// Returns the center [`Point3`] of the [`Aabb`].
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let min = Point3::new(41.0,41.0,41.0);
    /// let max = Point3::new(43.0,43.0,43.0);
    ///
    /// let aabb = Aabb::with_bounds(min, max);
    /// let center = aabb.center();
    ///
    /// assert!(center.x == 42.0 && center.y == 42.0 && center.z == 42.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns the midpoint of the [`Aabb`] on a single `axis`.
    /// Primitives are ordered by this value before partitioning.
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    #[inline]
    pub fn centroid(&self, axis: Axis) -> Real {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    /// Returns the total surface area of this [`Aabb`], `2 * (dx*dy + dx*dz + dy*dz)`.
    /// Flat boxes have a finite (possibly zero) area.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::Point3;
    ///
    /// let min = Point3::new(-1.0,-1.0,-1.0);
    /// let max = Point3::new(1.0,1.0,1.0);
    ///
    /// let aabb = Aabb::with_bounds(min, max);
    /// let surface_area = aabb.surface_area();
    /// assert!(surface_area == 24.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn surface_area(&self) -> Real {
        debug_assert!(!self.is_empty(), "surface area of an empty Aabb");
        let size = self.size();
        2.0 * (size.x * size.y + size.x * size.z + size.y * size.z)
    }

    /// Returns the axis along which the [`Aabb`] is stretched the most.
    /// Ties resolve to the lowest axis.
    ///
    /// # Examples
    /// ```
    /// use tribvh::aabb::Aabb;
    /// use tribvh::axis::Axis;
    /// use tribvh::Point3;
    ///
    /// let min = Point3::new(-100.0,0.0,0.0);
    /// let max = Point3::new(100.0,0.0,0.0);
    ///
    /// let aabb = Aabb::with_bounds(min, max);
    /// assert_eq!(aabb.largest_axis(), Axis::X);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn largest_axis(&self) -> Axis {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            Axis::X
        } else if size.y >= size.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// Returns the bounds as `[min_x, min_y, min_z, max_x, max_y, max_z]`,
    /// the order used by the flat node records.
    pub fn to_array(&self) -> [Real; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }
}

/// Default instance for [`Aabb`]s. Returns an [`Aabb`] which is [`empty()`].
///
/// [`Aabb`]: struct.Aabb.html
/// [`empty()`]: #method.empty
///
impl Default for Aabb {
    fn default() -> Aabb {
        Aabb::empty()
    }
}

/// Implementation of [`Bounded`] for [`Aabb`].
///
/// [`Bounded`]: trait.Bounded.html
/// [`Aabb`]: struct.Aabb.html
///
impl Bounded for Aabb {
    fn aabb(&self) -> Aabb {
        *self
    }
}

/// Implementation of [`Bounded`] for [`Point3`].
///
/// [`Bounded`]: trait.Bounded.html
/// [`Point3`]: ../type.Point3.html
///
impl Bounded for Point3 {
    fn aabb(&self) -> Aabb {
        Aabb::with_bounds(*self, *self)
    }
}

#[cfg(test)]
mod tests {
    use crate::aabb::{Aabb, Bounded};
    use crate::axis::Axis;
    use crate::error::BvhError;
    use crate::testbase::{tuple_to_point, tuplevec_small_strategy, TupleVec};
    use crate::{Point3, Real, EPSILON};
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    #[test]
    fn test_degenerate_surface_area() {
        // A single point and a flat square.
        let point = Point3::new(1.0, 2.0, 3.0).aabb();
        assert_eq!(point.surface_area(), 0.0);

        let square = Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0));
        assert_float_eq!(square.surface_area(), 2.0, abs <= EPSILON);
        assert!(square.surface_area().is_finite());
    }

    #[test]
    fn test_centroid_and_array() {
        let aabb = Aabb::with_bounds(Point3::new(-1.0, 0.0, 2.0), Point3::new(3.0, 1.0, 2.0));
        assert_eq!(aabb.centroid(Axis::X), 1.0);
        assert_eq!(aabb.centroid(Axis::Y), 0.5);
        assert_eq!(aabb.centroid(Axis::Z), 2.0);
        assert_eq!(aabb.to_array(), [-1.0, 0.0, 2.0, 3.0, 1.0, 2.0]);
        assert_eq!(aabb.largest_axis(), Axis::X);
    }

    #[test]
    fn test_try_grow_rejects_non_finite() {
        let mut aabb = Aabb::empty().grow(&Point3::new(0.0, 0.0, 0.0));
        let before = aabb;
        assert!(aabb.try_grow(&Point3::new(Real::NAN, 0.0, 0.0)).is_err());
        assert!(aabb
            .try_grow(&Point3::new(0.0, Real::INFINITY, 0.0))
            .is_err());
        assert_eq!(aabb, before);

        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, Real::NEG_INFINITY, 0.0),
        ];
        assert_eq!(
            Aabb::from_points(&points),
            Err(BvhError::NonFiniteVertex {
                triangle: 0,
                vertex: 2
            })
        );
    }

    proptest! {
        // Test whether an empty `Aabb` does not contains anything.
        #[test]
        fn test_empty_contains_nothing(tpl: TupleVec) {
            // Define a random Point
            let p = tuple_to_point(&tpl);

            // Create an empty `Aabb`
            let aabb = Aabb::empty();

            // It should not contain anything
            assert!(!aabb.contains(&p));
        }

        // Test whether a default `Aabb` is empty.
        #[test]
        fn test_default_is_empty(tpl: TupleVec) {
            // Define a random Point
            let p = tuple_to_point(&tpl);

            // Create a default `Aabb`
            let aabb: Aabb = Default::default();

            // It should not contain anything
            assert!(!aabb.contains(&p));
            assert!(aabb.is_empty());
        }

        // Test whether an `Aabb` always contains its center.
        #[test]
        fn test_aabb_contains_center(a in tuplevec_small_strategy(), b in tuplevec_small_strategy()) {
            // Define two points which will be the corners of the `Aabb`
            let p1 = tuple_to_point(&a);
            let p2 = tuple_to_point(&b);

            // Span the `Aabb`
            let aabb = Aabb::empty().grow(&p1).join(&p2.aabb());

            // Its center should be inside the `Aabb`
            assert!(aabb.contains(&aabb.center()));
        }

        // Test whether the joint of two point-sets contains all the points.
        #[test]
        fn test_join_two_aabbs(a in proptest::collection::vec(tuplevec_small_strategy(), 5),
                               b in proptest::collection::vec(tuplevec_small_strategy(), 5)) {
            // Create an array of points
            let points = a.iter().chain(b.iter()).map(tuple_to_point).collect::<Vec<Point3>>();

            // Create two `Aabb`s. One spanned the first five points,
            // the other by the last five points
            let aabb1 = points.iter().take(5).fold(Aabb::empty(), |aabb, point| aabb.grow(point));
            let aabb2 = points.iter().skip(5).fold(Aabb::empty(), |aabb, point| aabb.grow(point));

            // The `Aabb`s should contain the points by which they are spanned
            let aabb1_contains_init_five = points.iter()
                .take(5)
                .all(|point| aabb1.contains(point));
            let aabb2_contains_last_five = points.iter()
                .skip(5)
                .all(|point| aabb2.contains(point));

            // Build the joint of the two `Aabb`s
            let aabbu = aabb1.join(&aabb2);

            // The joint should contain all points
            let aabbu_contains_all = points.iter()
                .all(|point| aabbu.contains(point));

            // Return the three properties
            assert!(aabb1_contains_init_five && aabb2_contains_last_five && aabbu_contains_all);
            assert!(aabbu.approx_contains_aabb_eps(&aabb1, EPSILON));
            assert!(aabbu.approx_contains_aabb_eps(&aabb2, EPSILON));
        }

        // Test whether the surface area of an `Aabb` is never negative and grows when it is joined.
        #[test]
        fn test_surface_area_monotonic(a in tuplevec_small_strategy(),
                                       b in tuplevec_small_strategy(),
                                       c in tuplevec_small_strategy()) {
            let inner = Aabb::empty().grow(&tuple_to_point(&a)).grow(&tuple_to_point(&b));
            let outer = inner.grow(&tuple_to_point(&c));

            assert!(inner.surface_area() >= 0.0);
            assert!(outer.surface_area() >= inner.surface_area());
        }

        // Test whether the largest axis is never shorter than the other two.
        #[test]
        fn test_largest_axis(a in tuplevec_small_strategy(), b in tuplevec_small_strategy()) {
            let aabb = Aabb::empty().grow(&tuple_to_point(&a)).grow(&tuple_to_point(&b));
            let size = aabb.size();
            let largest = aabb.largest_axis();

            for axis in largest.others() {
                assert!(size[largest] >= size[axis]);
            }
        }
    }
}
