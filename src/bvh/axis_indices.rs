//! Triangle indices presorted along each axis, and the partition step which keeps the three
//! sorted views in sync without ever sorting again.

use crate::axis::Axis;
use crate::triangle::Triangle;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    /// Thread local for the right-hand entries of a stable partition to reduce allocations during build
    static SCRATCH: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Owns the three permutations of `0..n`, each sorted by triangle centroid along one axis.
///
/// Every subtree of the hierarchy corresponds to the same contiguous range in all three
/// permutations. Inside that range each permutation holds the subtree's triangles, still in
/// the order of its axis.
pub(crate) struct AxisIndices {
    axes: [Vec<usize>; 3],
}

impl AxisIndices {
    /// Sorts the triangle indices once per axis. The sort is stable, so triangles with equal
    /// centroids keep their input order.
    pub(crate) fn presort<M>(triangles: &[Triangle<M>]) -> AxisIndices {
        let sorted = |axis: Axis| {
            let mut indices = (0..triangles.len()).collect::<Vec<usize>>();
            indices.sort_by(|&a, &b| {
                triangles[a]
                    .centroid(axis)
                    .total_cmp(&triangles[b].centroid(axis))
            });
            indices
        };
        AxisIndices {
            axes: [sorted(Axis::X), sorted(Axis::Y), sorted(Axis::Z)],
        }
    }

    /// Returns the sorted permutation for `axis`.
    pub(crate) fn axis(&self, axis: Axis) -> &[usize] {
        &self.axes[axis.index()]
    }

    /// Returns mutable views covering all triangles.
    pub(crate) fn views(&mut self) -> AxisViews<'_> {
        let [x, y, z] = &mut self.axes;
        AxisViews {
            views: [x.as_mut_slice(), y.as_mut_slice(), z.as_mut_slice()],
            offset: 0,
        }
    }
}

/// The triangles of one subtree, seen through each of the three sorted permutations.
pub(crate) struct AxisViews<'a> {
    views: [&'a mut [usize]; 3],
    offset: usize,
}

impl<'a> AxisViews<'a> {
    /// The number of triangles in the view.
    pub(crate) fn len(&self) -> usize {
        self.views[0].len()
    }

    /// The position of the first entry of the view inside the full permutations.
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// The triangles of the view in the order of `axis`.
    pub(crate) fn axis(&self, axis: Axis) -> &[usize] {
        self.views[axis.index()]
    }

    /// Splits the view into the first `count` triangles along `axis` and the rest.
    ///
    /// The winning axis is split by position. The two other permutations are stably
    /// partitioned by membership in the winning axis' left slice, which keeps them sorted.
    pub(crate) fn split(
        self,
        axis: Axis,
        count: usize,
        marks: &SideMarks,
    ) -> (AxisViews<'a>, AxisViews<'a>) {
        let AxisViews { views, offset } = self;
        debug_assert!(count > 0 && count < views[0].len());

        for &index in &views[axis.index()][..count] {
            marks.mark(index);
        }
        for other in axis.others() {
            stable_partition(views[other.index()], count, |index| marks.is_marked(index));
        }
        for &index in &views[axis.index()][..count] {
            marks.unmark(index);
        }

        let [x, y, z] = views;
        let (x_l, x_r) = x.split_at_mut(count);
        let (y_l, y_r) = y.split_at_mut(count);
        let (z_l, z_r) = z.split_at_mut(count);
        (
            AxisViews {
                views: [x_l, y_l, z_l],
                offset,
            },
            AxisViews {
                views: [x_r, y_r, z_r],
                offset: offset + count,
            },
        )
    }
}

/// Moves all entries for which `is_left` holds to the front of `slice`, keeping the relative
/// order on both sides.
fn stable_partition(slice: &mut [usize], left_count: usize, is_left: impl Fn(usize) -> bool) {
    SCRATCH.with(|scratch| {
        let right = &mut *scratch.borrow_mut();
        right.clear();

        let mut write = 0;
        for read in 0..slice.len() {
            let index = slice[read];
            if is_left(index) {
                slice[write] = index;
                write += 1;
            } else {
                right.push(index);
            }
        }
        debug_assert_eq!(
            write, left_count,
            "Sorted views disagree about the members of a split"
        );
        slice[write..].copy_from_slice(right);
    })
}

/// One flag per triangle, set while the triangle sits on the left side of the split being
/// partitioned.
///
/// Sibling subtrees own disjoint sets of triangles, so concurrent builds of different subtrees
/// never touch the same flag.
pub(crate) struct SideMarks {
    marks: Vec<AtomicBool>,
}

impl SideMarks {
    pub(crate) fn new(len: usize) -> SideMarks {
        SideMarks {
            marks: (0..len).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    #[inline]
    fn mark(&self, index: usize) {
        self.marks[index].store(true, Ordering::Relaxed);
    }

    #[inline]
    fn unmark(&self, index: usize) {
        self.marks[index].store(false, Ordering::Relaxed);
    }

    #[inline]
    fn is_marked(&self, index: usize) -> bool {
        self.marks[index].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use crate::axis::Axis;
    use crate::bvh::axis_indices::{stable_partition, AxisIndices, SideMarks};
    use crate::testbase::point_triangle;

    #[test]
    fn test_presort_is_stable() {
        let triangles = vec![
            point_triangle(2.0, 0.0, 1.0),
            point_triangle(1.0, 0.0, 1.0),
            point_triangle(2.0, 0.0, 0.0),
            point_triangle(0.0, 0.0, 2.0),
        ];
        let indices = AxisIndices::presort(&triangles);
        assert_eq!(indices.axis(Axis::X), &[3, 1, 0, 2]);
        // All equal on Y: input order is kept.
        assert_eq!(indices.axis(Axis::Y), &[0, 1, 2, 3]);
        assert_eq!(indices.axis(Axis::Z), &[2, 0, 1, 3]);
    }

    #[test]
    fn test_stable_partition() {
        let mut slice = [5, 1, 4, 2, 3, 0];
        stable_partition(&mut slice, 3, |i| i % 2 == 0);
        assert_eq!(slice, [4, 2, 0, 5, 1, 3]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "Sorted views disagree")]
    fn test_stable_partition_checks_left_count() {
        let mut slice = [5, 1, 4, 2, 3, 0];
        stable_partition(&mut slice, 2, |i| i % 2 == 0);
    }

    #[test]
    fn test_split_keeps_views_sorted() {
        let triangles = vec![
            point_triangle(0.0, 3.0, 1.0),
            point_triangle(1.0, 2.0, 0.0),
            point_triangle(2.0, 1.0, 3.0),
            point_triangle(3.0, 0.0, 2.0),
        ];
        let mut indices = AxisIndices::presort(&triangles);
        let marks = SideMarks::new(triangles.len());

        let (left, right) = indices.views().split(Axis::X, 2, &marks);
        assert_eq!(left.len(), 2);
        assert_eq!(right.offset(), 2);
        assert_eq!(left.axis(Axis::X), &[0, 1]);
        assert_eq!(left.axis(Axis::Y), &[1, 0]);
        assert_eq!(left.axis(Axis::Z), &[1, 0]);
        assert_eq!(right.axis(Axis::X), &[2, 3]);
        assert_eq!(right.axis(Axis::Y), &[3, 2]);
        assert_eq!(right.axis(Axis::Z), &[3, 2]);

        // The marks are cleared again for the next split.
        assert!((0..triangles.len()).all(|i| !marks.is_marked(i)));
    }
}
