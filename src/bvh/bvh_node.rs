use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::bvh::axis_indices::{AxisViews, SideMarks};
use crate::config::BuildConfig;
use crate::triangle::Triangle;
use crate::Real;
use log::{trace, warn};
use std::cell::RefCell;
use std::ops::Range;

thread_local! {
    /// Thread local for the suffix surface areas used while evaluating splits to reduce allocations during build
    static BACK_AREAS: RefCell<Vec<Real>> = const { RefCell::new(Vec::new()) };
}

/// The [`BvhNode`] enum that describes a node in a [`Bvh`].
/// It's either a leaf node covering a contiguous run of the [`Bvh`]'s triangle order,
/// or a regular node that has two child nodes.
///
/// Both variants store the range of the triangle order their subtree covers. The arena is laid
/// out in pre-order, so the left child of an inner node always directly follows it.
///
/// [`Bvh`]: struct.Bvh.html
/// [`BvhNode`]: enum.BvhNode.html
///
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BvhNode {
    /// Leaf node.
    Leaf {
        /// The node's parent, `None` for the root.
        parent_index: Option<usize>,

        /// Distance from the root.
        depth: u32,

        /// The joint [`Aabb`] of the triangles in this leaf.
        aabb: Aabb,

        /// The axis the triangles of this leaf are ordered by.
        split_axis: Axis,

        /// Position of the first triangle in the [`Bvh`]'s triangle order.
        start: usize,

        /// Number of triangles in this leaf.
        len: usize,
    },
    /// Inner node.
    Node {
        /// The node's parent, `None` for the root.
        parent_index: Option<usize>,

        /// Distance from the root.
        depth: u32,

        /// The joint [`Aabb`] of all triangles in this subtree.
        aabb: Aabb,

        /// The axis along which the triangles were split.
        split_axis: Axis,

        /// Number of triangles sent to the left child, the `k` of a split after the `k`-th
        /// triangle along `split_axis`.
        split_index: usize,

        /// Position of the first triangle of this subtree in the [`Bvh`]'s triangle order.
        start: usize,

        /// Number of triangles in this subtree.
        len: usize,

        /// Index of the left subtree's root node.
        child_l_index: usize,

        /// Index of the right subtree's root node.
        child_r_index: usize,
    },
}

impl BvhNode {
    /// Returns the index of the parent node, `None` for the root.
    pub fn parent(&self) -> Option<usize> {
        match *self {
            BvhNode::Node { parent_index, .. } | BvhNode::Leaf { parent_index, .. } => {
                parent_index
            }
        }
    }

    /// Returns the distance from the root.
    pub fn depth(&self) -> u32 {
        match *self {
            BvhNode::Node { depth, .. } | BvhNode::Leaf { depth, .. } => depth,
        }
    }

    /// Returns the [`Aabb`] of all triangles in this subtree.
    ///
    /// [`Aabb`]: ../aabb/struct.Aabb.html
    ///
    pub fn aabb(&self) -> Aabb {
        match *self {
            BvhNode::Node { aabb, .. } | BvhNode::Leaf { aabb, .. } => aabb,
        }
    }

    /// Returns the split axis of an inner node, or the ordering axis of a leaf.
    pub fn split_axis(&self) -> Axis {
        match *self {
            BvhNode::Node { split_axis, .. } | BvhNode::Leaf { split_axis, .. } => split_axis,
        }
    }

    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self, BvhNode::Leaf { .. })
    }

    /// Returns the index of the left child of an inner node.
    pub fn child_l(&self) -> Option<usize> {
        match *self {
            BvhNode::Node { child_l_index, .. } => Some(child_l_index),
            BvhNode::Leaf { .. } => None,
        }
    }

    /// Returns the index of the right child of an inner node.
    pub fn child_r(&self) -> Option<usize> {
        match *self {
            BvhNode::Node { child_r_index, .. } => Some(child_r_index),
            BvhNode::Leaf { .. } => None,
        }
    }

    /// Returns the range of the [`Bvh`]'s triangle order covered by this subtree.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn triangle_range(&self) -> Range<usize> {
        match *self {
            BvhNode::Node { start, len, .. } | BvhNode::Leaf { start, len, .. } => {
                start..start + len
            }
        }
    }

    /// Number of triangles in this subtree.
    pub fn triangle_count(&self) -> usize {
        match *self {
            BvhNode::Node { len, .. } | BvhNode::Leaf { len, .. } => len,
        }
    }

    fn set_child_l(&mut self, index: usize) {
        if let BvhNode::Node { child_l_index, .. } = self {
            *child_l_index = index;
        }
    }

    fn set_child_r(&mut self, index: usize) {
        if let BvhNode::Node { child_r_index, .. } = self {
            *child_r_index = index;
        }
    }

    /// Moves a node built at a local index into a larger arena, `offset` slots further.
    #[cfg(feature = "rayon")]
    fn shift(&mut self, offset: usize) {
        match self {
            BvhNode::Node {
                parent_index,
                child_l_index,
                child_r_index,
                ..
            } => {
                *parent_index = parent_index.map(|p| p + offset);
                *child_l_index += offset;
                *child_r_index += offset;
            }
            BvhNode::Leaf { parent_index, .. } => {
                *parent_index = parent_index.map(|p| p + offset);
            }
        }
    }

    /// Decides what the node described by `args` becomes.
    ///
    /// Returns the node (with unset child indices when it is an inner node), and the
    /// arguments for building both children, whose parent is `node_index`.
    pub(crate) fn prep_build<'a, M>(
        context: &BuildContext<'_, M>,
        args: BvhNodeBuildArgs<'a>,
        node_index: usize,
    ) -> (BvhNode, Option<(BvhNodeBuildArgs<'a>, BvhNodeBuildArgs<'a>)>) {
        let BvhNodeBuildArgs {
            views,
            parent_index,
            depth,
        } = args;
        let start = views.offset();
        let len = views.len();
        let aabb = joint_aabb(context.triangles, views.axis(Axis::X));

        // A single triangle cannot be split.
        if len < 2 {
            let leaf = BvhNode::Leaf {
                parent_index,
                depth,
                aabb,
                split_axis: Axis::X,
                start,
                len,
            };
            return (leaf, None);
        }

        let split = SplitCandidate::evaluate(
            context.triangles,
            &views,
            &aabb,
            context.config.traversal_cost,
        );
        if len <= context.config.leaf_size {
            let leaf = BvhNode::Leaf {
                parent_index,
                depth,
                aabb,
                split_axis: split.axis,
                start,
                len,
            };
            return (leaf, None);
        }

        if split.fallback {
            warn!(
                "Degenerate bounds {} for {} triangles, splitting at the median of axis {}",
                aabb, len, split.axis
            );
        } else {
            trace!(
                "Splitting {} triangles at depth {} after {} along axis {} (cost {})",
                len,
                depth,
                split.split_index,
                split.axis,
                split.cost
            );
        }

        let (left, right) = views.split(split.axis, split.split_index, context.marks);
        let node = BvhNode::Node {
            parent_index,
            depth,
            aabb,
            split_axis: split.axis,
            split_index: split.split_index,
            start,
            len,
            child_l_index: 0,
            child_r_index: 0,
        };
        (
            node,
            Some((
                BvhNodeBuildArgs::new(left, Some(node_index), depth + 1),
                BvhNodeBuildArgs::new(right, Some(node_index), depth + 1),
            )),
        )
    }

    /// Builds the subtree described by `args` into a fresh arena in pre-order.
    ///
    /// Works off an explicit stack of pending nodes, so the depth of the tree is not bounded
    /// by the call stack. The right child of every inner node is pushed first so the left
    /// subtree is completed before it.
    pub(crate) fn build<M>(context: &BuildContext<'_, M>, args: BvhNodeBuildArgs) -> Vec<BvhNode> {
        let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * args.views.len() / context.config.leaf_size + 1);
        let mut stack: Vec<(BvhNodeBuildArgs, Option<(usize, Side)>)> = vec![(args, None)];

        while let Some((args, link)) = stack.pop() {
            let node_index = nodes.len();
            match link {
                Some((parent, Side::Left)) => nodes[parent].set_child_l(node_index),
                Some((parent, Side::Right)) => nodes[parent].set_child_r(node_index),
                None => {}
            }

            let (node, children) = BvhNode::prep_build(context, args, node_index);
            nodes.push(node);
            if let Some((left, right)) = children {
                stack.push((right, Some((node_index, Side::Right))));
                stack.push((left, Some((node_index, Side::Left))));
            }
        }
        nodes
    }

    /// Builds the subtree described by `args` in parallel, joining the children of large inner
    /// nodes with [`rayon::join`]. Produces exactly the nodes [`BvhNode::build`] produces.
    ///
    /// The recursion stops after [`PAR_BUILD_MAX_LEVELS`] levels and below badly unbalanced
    /// splits, where the remaining subtrees are built on the explicit stack of
    /// [`BvhNode::build`]. Splits that peel off single triangles would otherwise recurse once
    /// per triangle.
    #[cfg(feature = "rayon")]
    pub(crate) fn build_par<M: Sync>(
        context: &BuildContext<'_, M>,
        args: BvhNodeBuildArgs,
    ) -> Vec<BvhNode> {
        BvhNode::build_par_level(context, args, 0)
    }

    #[cfg(feature = "rayon")]
    fn build_par_level<M: Sync>(
        context: &BuildContext<'_, M>,
        args: BvhNodeBuildArgs,
        level: usize,
    ) -> Vec<BvhNode> {
        let len = args.views.len();
        if len < PAR_BUILD_THRESHOLD || level >= PAR_BUILD_MAX_LEVELS {
            return BvhNode::build(context, args);
        }

        let (mut node, children) = BvhNode::prep_build(context, args, 0);
        let Some((left, right)) = children else {
            return vec![node];
        };
        let smaller = left.views.len().min(right.views.len());
        let (left, right) = if smaller < len / PAR_BUILD_MIN_SHARE {
            (
                BvhNode::build(context, left),
                BvhNode::build(context, right),
            )
        } else {
            rayon::join(
                || BvhNode::build_par_level(context, left, level + 1),
                || BvhNode::build_par_level(context, right, level + 1),
            )
        };

        node.set_child_l(1);
        node.set_child_r(1 + left.len());
        let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
        nodes.push(node);
        append_subtree(&mut nodes, left);
        append_subtree(&mut nodes, right);
        nodes
    }
}

/// Subtrees smaller than this are built on the current thread.
#[cfg(feature = "rayon")]
const PAR_BUILD_THRESHOLD: usize = 1024;

/// Maximum number of nested [`rayon::join`]s in a parallel build.
#[cfg(feature = "rayon")]
const PAR_BUILD_MAX_LEVELS: usize = 64;

/// A split whose smaller side holds less than `1 / PAR_BUILD_MIN_SHARE` of the triangles
/// builds both sides on the current thread.
#[cfg(feature = "rayon")]
const PAR_BUILD_MIN_SHARE: usize = 8;

/// Appends a subtree built with local indices whose root is a child of `nodes[0]`.
#[cfg(feature = "rayon")]
fn append_subtree(nodes: &mut Vec<BvhNode>, subtree: Vec<BvhNode>) {
    let offset = nodes.len();
    for (i, mut node) in subtree.into_iter().enumerate() {
        let parent = node.parent();
        node.shift(offset);
        // The subtree root already points at the local root of `nodes`.
        if i == 0 {
            match &mut node {
                BvhNode::Node { parent_index, .. } | BvhNode::Leaf { parent_index, .. } => {
                    *parent_index = parent;
                }
            }
        }
        nodes.push(node);
    }
}

#[derive(Debug, Copy, Clone)]
enum Side {
    Left,
    Right,
}

/// Returns the joint [`Aabb`] of the triangles at `indices`.
fn joint_aabb<M>(triangles: &[Triangle<M>], indices: &[usize]) -> Aabb {
    let mut aabb = Aabb::empty();
    for &index in indices {
        aabb.join_mut(&triangles[index].aabb());
    }
    aabb
}

/// The outcome of evaluating the surface area heuristic for one node.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SplitCandidate {
    /// The axis the split runs along.
    pub axis: Axis,

    /// The number of triangles, in the order of `axis`, that go to the left child.
    pub split_index: usize,

    /// The estimated cost of the split. Infinite for the fallback split.
    pub cost: Real,

    /// True if the node's bounds have no usable surface area and the split is the median of
    /// the longest axis instead.
    pub fallback: bool,
}

impl SplitCandidate {
    /// Evaluates every split position on every axis and returns the cheapest.
    ///
    /// Splitting after the `i`-th of `n` triangles (zero based) costs
    /// `K + area(front) / area(parent) * (i + 1) + area(back) / area(parent) * (n - 1 - i)`,
    /// where `front` bounds the first `i + 1` triangles along the axis and `back` the rest.
    /// Axes are tried in the order X, Y, Z and positions in increasing order, and the first
    /// minimum wins.
    ///
    /// If `parent` has zero or non-finite surface area the costs are meaningless, and the
    /// median of the longest axis of `parent` is returned instead.
    pub(crate) fn evaluate<M>(
        triangles: &[Triangle<M>],
        views: &AxisViews,
        parent: &Aabb,
        traversal_cost: Real,
    ) -> SplitCandidate {
        let n = views.len();
        debug_assert!(n >= 2, "cannot split fewer than two triangles");

        let fallback = SplitCandidate {
            axis: parent.largest_axis(),
            split_index: n / 2,
            cost: Real::INFINITY,
            fallback: true,
        };
        let parent_area = parent.surface_area();
        if !(parent_area > 0.0 && parent_area.is_finite()) {
            return fallback;
        }

        BACK_AREAS.with(|areas| {
            let back_areas = &mut *areas.borrow_mut();
            let mut best: Option<SplitCandidate> = None;

            for axis in Axis::ALL {
                let order = views.axis(axis);

                // back_areas[j] bounds the last j + 1 triangles.
                back_areas.clear();
                let mut back = Aabb::empty();
                for &index in order[1..].iter().rev() {
                    back.join_mut(&triangles[index].aabb());
                    back_areas.push(back.surface_area());
                }

                let mut front = Aabb::empty();
                for (i, &index) in order[..n - 1].iter().enumerate() {
                    front.join_mut(&triangles[index].aabb());
                    let cost = traversal_cost
                        + front.surface_area() / parent_area * (i + 1) as Real
                        + back_areas[n - 2 - i] / parent_area * (n - 1 - i) as Real;
                    if cost.is_finite() && best.map_or(true, |best| cost < best.cost) {
                        best = Some(SplitCandidate {
                            axis,
                            split_index: i + 1,
                            cost,
                            fallback: false,
                        });
                    }
                }
            }
            best.unwrap_or(fallback)
        })
    }
}

/// Shared, read-only state of one build.
pub(crate) struct BuildContext<'a, M> {
    pub(crate) triangles: &'a [Triangle<M>],
    pub(crate) marks: &'a SideMarks,
    pub(crate) config: &'a BuildConfig,
}

/// Holds the arguments for building one node.
pub(crate) struct BvhNodeBuildArgs<'a> {
    views: AxisViews<'a>,
    parent_index: Option<usize>,
    depth: u32,
}

impl<'a> BvhNodeBuildArgs<'a> {
    pub(crate) fn new(views: AxisViews<'a>, parent_index: Option<usize>, depth: u32) -> Self {
        BvhNodeBuildArgs {
            views,
            parent_index,
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::axis::Axis;
    use crate::bvh::axis_indices::{AxisIndices, SideMarks};
    use crate::bvh::bvh_node::{
        joint_aabb, BuildContext, BvhNode, BvhNodeBuildArgs, SplitCandidate,
    };
    use crate::config::BuildConfig;
    use crate::testbase::{octant_triangles, point_triangle, random_triangles, tiny_triangle};
    use crate::Point3;
    use float_eq::assert_float_eq;

    #[test]
    fn test_sah_splits_separated_clusters() {
        // Two clusters far apart on Y, interleaved on X.
        let triangles = vec![
            tiny_triangle(Point3::new(0.0, 0.0, 0.0), 0.1),
            tiny_triangle(Point3::new(1.0, 10.0, 0.0), 0.1),
            tiny_triangle(Point3::new(2.0, 0.0, 0.0), 0.1),
            tiny_triangle(Point3::new(3.0, 10.0, 0.0), 0.1),
        ];
        let mut indices = AxisIndices::presort(&triangles);
        let views = indices.views();
        let parent = joint_aabb(&triangles, views.axis(Axis::X));

        let split = SplitCandidate::evaluate(&triangles, &views, &parent, 1.0);
        assert!(!split.fallback);
        assert_eq!(split.axis, Axis::Y);
        assert_eq!(split.split_index, 2);
        assert!(split.cost > 1.0 && split.cost < 3.0);
    }

    #[test]
    fn test_sah_cost_of_octants() {
        let triangles = octant_triangles();
        let mut indices = AxisIndices::presort(&triangles);
        let views = indices.views();
        let parent = joint_aabb(&triangles, views.axis(Axis::X));

        let split = SplitCandidate::evaluate(&triangles, &views, &parent, 1.0);
        // The triangles are flat in Z, so halving along Z leaves two flat slabs.
        assert_eq!(split.axis, Axis::Z);
        assert_eq!(split.split_index, 4);

        let side = 1.02;
        let parent_area = 2.0 * (side * side + 2.0 * side * 1.0);
        let half_area = 2.0 * side * side;
        let expected = 1.0 + 2.0 * 4.0 * half_area / parent_area;
        assert_float_eq!(split.cost, expected, rmax <= 1e-4);
    }

    #[test]
    fn test_zero_area_falls_back_to_median() {
        let triangles = vec![point_triangle(1.0, 1.0, 1.0); 5];
        let mut indices = AxisIndices::presort(&triangles);
        let views = indices.views();
        let parent = joint_aabb(&triangles, views.axis(Axis::X));

        let split = SplitCandidate::evaluate(&triangles, &views, &parent, 1.0);
        assert!(split.fallback);
        assert_eq!(split.axis, Axis::X);
        assert_eq!(split.split_index, 2);
    }

    #[test]
    fn test_collinear_points_fall_back_along_longest_axis() {
        let triangles = (0..4)
            .map(|i| point_triangle(0.0, 0.0, i as crate::Real))
            .collect::<Vec<_>>();
        let mut indices = AxisIndices::presort(&triangles);
        let views = indices.views();
        let parent = joint_aabb(&triangles, views.axis(Axis::X));

        let split = SplitCandidate::evaluate(&triangles, &views, &parent, 1.0);
        assert!(split.fallback);
        assert_eq!(split.axis, Axis::Z);
        assert_eq!(split.split_index, 2);
    }

    #[test]
    fn test_build_links_children_in_pre_order() {
        let triangles = random_triangles(100, 7);
        let config = BuildConfig::default().with_leaf_size(2);
        let mut indices = AxisIndices::presort(&triangles);
        let marks = SideMarks::new(triangles.len());
        let context = BuildContext {
            triangles: &triangles,
            marks: &marks,
            config: &config,
        };
        let nodes = BvhNode::build(&context, BvhNodeBuildArgs::new(indices.views(), None, 0));

        assert_eq!(nodes[0].parent(), None);
        for (index, node) in nodes.iter().enumerate() {
            if let BvhNode::Node {
                child_l_index,
                child_r_index,
                split_index,
                ..
            } = *node
            {
                assert_eq!(child_l_index, index + 1);
                assert_eq!(nodes[child_l_index].parent(), Some(index));
                assert_eq!(nodes[child_r_index].parent(), Some(index));
                assert_eq!(nodes[child_l_index].triangle_count(), split_index);
                assert_eq!(
                    nodes[child_r_index].triangle_range().start,
                    node.triangle_range().start + split_index
                );
            }
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_build_par_matches_build() {
        let triangles = random_triangles(5000, 3);
        let config = BuildConfig::default();
        let marks = SideMarks::new(triangles.len());
        let context = BuildContext {
            triangles: &triangles,
            marks: &marks,
            config: &config,
        };

        let mut indices = AxisIndices::presort(&triangles);
        let sequential = BvhNode::build(&context, BvhNodeBuildArgs::new(indices.views(), None, 0));
        let mut indices = AxisIndices::presort(&triangles);
        let parallel =
            BvhNode::build_par(&context, BvhNodeBuildArgs::new(indices.views(), None, 0));

        assert_eq!(sequential, parallel);
    }
}
