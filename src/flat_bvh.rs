//! This module flattens a [`Bvh`] into the linear record layout consumed by a renderer, and
//! walks that layout without a stack.
//!
//! Every node becomes one [`FlatNode`] in pre-order. Besides its children, each node links to
//! its parent and its sibling, which is what allows [`StacklessIter`] to move through the tree
//! knowing only the current node and the direction it arrived from.
//!
//! [`Bvh`]: ../bvh/struct.Bvh.html
//! [`FlatNode`]: struct.FlatNode.html
//! [`StacklessIter`]: struct.StacklessIter.html
//!

use crate::aabb::Aabb;
use crate::axis::Axis;
use crate::bvh::{Bvh, BvhNode};
use crate::triangle::Triangle;
use crate::Vector3;
use log::info;

/// Number of `f32`s in one node record.
pub const RECORD_SIZE: usize = 12;

/// Value written to a record for a missing parent, sibling, child or leaf start.
pub const NO_INDEX: f32 = -1.0;

/// Number of vertices, and of texels in a three-component texture, per triangle.
pub const VERTICES_PER_TRIANGLE: usize = 3;

/// A node of a [`FlatBvh`].
///
/// Identifiers are positions in [`FlatBvh::nodes`]. They are `None` where the record holds
/// [`NO_INDEX`]: the root has no parent and no sibling, leaves have no children and inner
/// nodes have no triangles.
///
/// [`FlatBvh`]: struct.FlatBvh.html
/// [`FlatBvh::nodes`]: struct.FlatBvh.html#structfield.nodes
/// [`NO_INDEX`]: constant.NO_INDEX.html
///
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatNode {
    /// The parent's identifier.
    pub parent: Option<usize>,

    /// The identifier of the other child of the parent.
    pub sibling: Option<usize>,

    /// The split axis of an inner node, the ordering axis of a leaf.
    pub split_axis: Axis,

    /// The left child's identifier.
    pub child_l: Option<usize>,

    /// The right child's identifier.
    pub child_r: Option<usize>,

    /// Position of the leaf's first triangle in the flat triangle buffers, counted in
    /// triangles. The record stores [`leaf_vertex_start`] instead.
    ///
    /// [`leaf_vertex_start`]: struct.FlatNode.html#method.leaf_vertex_start
    pub leaf_triangle_start: Option<usize>,

    /// Number of triangles in a leaf, 0 for inner nodes. Not part of the record.
    pub leaf_triangle_count: usize,

    /// The bounds of the subtree.
    pub aabb: Aabb,
}

impl FlatNode {
    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        self.leaf_triangle_start.is_some()
    }

    /// Position of the leaf's first vertex in the flat triangle buffers, counted in vertices
    /// of three floats each. This is the leaf start written to the record.
    pub fn leaf_vertex_start(&self) -> Option<usize> {
        self.leaf_triangle_start.map(|start| start * VERTICES_PER_TRIANGLE)
    }

    /// Returns the node record in the layout
    /// `[parent, sibling, split_axis, child_l, child_r, leaf_start,
    /// min_x, min_y, min_z, max_x, max_y, max_z]`, with [`NO_INDEX`] for missing links.
    ///
    /// `leaf_start` is [`leaf_vertex_start`], so a renderer reading the triangle buffer as
    /// three-float texels finds the leaf's first vertex at that texel.
    /// Identifiers are stored as floats and are exact up to 2^24.
    ///
    /// [`NO_INDEX`]: constant.NO_INDEX.html
    /// [`leaf_vertex_start`]: struct.FlatNode.html#method.leaf_vertex_start
    ///
    pub fn to_record(&self) -> [f32; RECORD_SIZE] {
        let id = |index: Option<usize>| index.map_or(NO_INDEX, |index| index as f32);
        let bounds = self.aabb.to_array();
        [
            id(self.parent),
            id(self.sibling),
            self.split_axis.index() as f32,
            id(self.child_l),
            id(self.child_r),
            id(self.leaf_vertex_start()),
            bounds[0] as f32,
            bounds[1] as f32,
            bounds[2] as f32,
            bounds[3] as f32,
            bounds[4] as f32,
            bounds[5] as f32,
        ]
    }
}

/// A flattened [`Bvh`] together with its triangles in the order the leaves reference them.
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
///
#[derive(Debug, Clone)]
pub struct FlatBvh<'a, M> {
    /// The nodes in pre-order. The root is at index 0.
    pub nodes: Vec<FlatNode>,
    triangles: Vec<&'a Triangle<M>>,
    triangle_order: Vec<usize>,
}

impl<'a, M> FlatBvh<'a, M> {
    /// The triangles in the order of the flat triangle buffers.
    pub fn triangles(&self) -> &[&'a Triangle<M>] {
        &self.triangles
    }

    /// For every entry of the flat triangle buffers, the index of the triangle in the input.
    pub fn triangle_order(&self) -> &[usize] {
        &self.triangle_order
    }

    /// All node records concatenated, [`RECORD_SIZE`] floats per node.
    ///
    /// [`RECORD_SIZE`]: constant.RECORD_SIZE.html
    ///
    pub fn node_buffer(&self) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(self.nodes.len() * RECORD_SIZE);
        for node in &self.nodes {
            buffer.extend_from_slice(&node.to_record());
        }
        buffer
    }

    /// Vertex positions, 9 floats per triangle.
    pub fn triangle_buffer(&self) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(self.triangles.len() * 9);
        for triangle in &self.triangles {
            for vertex in triangle.vertices() {
                buffer.extend(vertex.coords.iter().map(|&c| c as f32));
            }
        }
        buffer
    }

    /// Shading normals, 9 floats per triangle.
    pub fn normal_buffer(&self) -> Vec<f32> {
        self.vector_buffer(Triangle::normals)
    }

    /// Tangents, 9 floats per triangle.
    pub fn tangent_buffer(&self) -> Vec<f32> {
        self.vector_buffer(Triangle::tangents)
    }

    /// Bitangents, 9 floats per triangle.
    pub fn bitangent_buffer(&self) -> Vec<f32> {
        self.vector_buffer(Triangle::bitangents)
    }

    fn vector_buffer(&self, attribute: impl Fn(&Triangle<M>) -> &[Vector3; 3]) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(self.triangles.len() * 9);
        for triangle in &self.triangles {
            for vector in attribute(triangle) {
                buffer.extend(vector.iter().map(|&c| c as f32));
            }
        }
        buffer
    }

    /// Texture coordinates, 6 floats per triangle.
    pub fn uv_buffer(&self) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(self.triangles.len() * 6);
        for triangle in &self.triangles {
            for uv in triangle.uvs() {
                buffer.push(uv[0] as f32);
                buffer.push(uv[1] as f32);
            }
        }
        buffer
    }

    /// The source mesh indices of every triangle, if known.
    pub fn mesh_indices(&self) -> Vec<Option<[usize; 3]>> {
        self.triangles.iter().map(|t| t.indices()).collect()
    }

    /// The material of every triangle.
    pub fn materials(&self) -> Vec<&'a M> {
        self.triangles.iter().map(|t| t.material()).collect()
    }

    /// Creates a [`StacklessIter`] over the leaves entered by `enter`, visiting near children
    /// first with respect to `direction`.
    ///
    /// [`StacklessIter`]: struct.StacklessIter.html
    ///
    pub fn stackless_iter<F>(&self, direction: Vector3, enter: F) -> StacklessIter<'_, F>
    where
        F: FnMut(usize, &FlatNode) -> bool,
    {
        StacklessIter::new(&self.nodes, direction, enter)
    }

    /// Logs a textual representation of the flat nodes.
    pub fn pretty_print(&self) {
        for (id, node) in self.nodes.iter().enumerate() {
            info!(
                "{}\tparent {:?}\tsibling {:?}\tchildren {:?} {:?}\tleaf {:?}+{}",
                id,
                node.parent,
                node.sibling,
                node.child_l,
                node.child_r,
                node.leaf_triangle_start,
                node.leaf_triangle_count
            );
        }
    }
}

impl<M> Bvh<M> {
    /// Flattens the tree into [`FlatNode`]s by a pre-order walk, assigning every node the
    /// position it is emitted at. Leaves reference the triangles in the order they are
    /// reached, which is the order of [`flatten`]'s triangle buffers.
    ///
    /// [`FlatNode`]: ../flat_bvh/struct.FlatNode.html
    /// [`flatten`]: struct.Bvh.html#method.flatten
    ///
    pub fn serialize_tree(&self) -> Vec<FlatNode> {
        self.serialize().0
    }

    /// Flattens the tree and collects its triangles in leaf order.
    ///
    /// # Examples
    /// ```
    /// use tribvh::bvh::Bvh;
    /// use tribvh::flat_bvh::RECORD_SIZE;
    /// use tribvh::triangle::Triangle;
    /// use tribvh::Point3;
    ///
    /// let triangles = (0..8)
    ///     .map(|i| {
    ///         let x = i as tribvh::Real * 2.0;
    ///         let a = Point3::new(x, 0.0, 0.0);
    ///         let b = Point3::new(x + 1.0, 0.0, 0.0);
    ///         let c = Point3::new(x, 1.0, 0.0);
    ///         Triangle::new([a, b, c], i).unwrap()
    ///     })
    ///     .collect::<Vec<_>>();
    ///
    /// let bvh = Bvh::build(triangles, 1).unwrap();
    /// let flat = bvh.flatten();
    ///
    /// let record = flat.nodes[0].to_record();
    /// assert_eq!(record[0], -1.0); // The root has no parent,
    /// assert_eq!(record[1], -1.0); // no sibling,
    /// assert_eq!(record[3], 1.0); // and its left child follows it.
    /// assert_eq!(flat.node_buffer().len(), flat.nodes.len() * RECORD_SIZE);
    /// assert_eq!(flat.materials().len(), 8);
    /// ```
    pub fn flatten(&self) -> FlatBvh<'_, M> {
        let (nodes, triangle_order) = self.serialize();
        let triangles = triangle_order
            .iter()
            .map(|&index| &self.triangles()[index])
            .collect();
        FlatBvh {
            nodes,
            triangles,
            triangle_order,
        }
    }

    fn serialize(&self) -> (Vec<FlatNode>, Vec<usize>) {
        let nodes = self.nodes();
        let mut flat: Vec<FlatNode> = Vec::with_capacity(nodes.len());
        let mut triangle_order = Vec::with_capacity(self.triangles().len());
        let mut ids = vec![0; nodes.len()];

        // Right children are pushed first so left subtrees are emitted before them.
        let mut stack = vec![0];
        while let Some(node_index) = stack.pop() {
            let node = &nodes[node_index];
            let id = flat.len();
            ids[node_index] = id;
            let parent = node.parent().map(|parent_index| ids[parent_index]);

            let (leaf_triangle_start, leaf_triangle_count) = match self.leaf_triangles(node_index)
            {
                Some(leaf) => {
                    let start = triangle_order.len();
                    triangle_order.extend_from_slice(leaf);
                    (Some(start), leaf.len())
                }
                None => (None, 0),
            };
            flat.push(FlatNode {
                parent,
                sibling: None,
                split_axis: node.split_axis(),
                child_l: None,
                child_r: None,
                leaf_triangle_start,
                leaf_triangle_count,
                aabb: node.aabb(),
            });

            if let Some(parent) = parent {
                match flat[parent].child_l {
                    None => flat[parent].child_l = Some(id),
                    Some(left) => {
                        flat[parent].child_r = Some(id);
                        flat[left].sibling = Some(id);
                        flat[id].sibling = Some(left);
                    }
                }
            }

            if let BvhNode::Node {
                child_l_index,
                child_r_index,
                ..
            } = *node
            {
                stack.push(child_r_index);
                stack.push(child_l_index);
            }
        }
        (flat, triangle_order)
    }
}

/// The direction from which a [`StacklessIter`] arrived at its current node.
///
/// [`StacklessIter`]: struct.StacklessIter.html
///
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TraversalState {
    /// Descended from the parent into its near child.
    FromParent,
    /// Moved over from the near sibling into the far child.
    FromSibling,
    /// Returned after finishing a child subtree.
    FromChild,
}

/// Walks a flat node layout using only the current node and a [`TraversalState`], the way a
/// renderer without a stack traverses it.
///
/// At every inner node the child on the positive side of `direction` along the node's split
/// axis is visited first. A node's subtree is skipped when `enter` returns false for it.
/// Yields the identifiers of the leaves that were entered.
///
/// # Examples
/// ```
/// use tribvh::bvh::Bvh;
/// use tribvh::triangle::Triangle;
/// use tribvh::{Point3, Vector3};
///
/// let triangles = (0..4)
///     .map(|i| {
///         let x = i as tribvh::Real * 2.0;
///         let a = Point3::new(x, 0.0, 0.0);
///         let b = Point3::new(x + 1.0, 0.0, 0.0);
///         let c = Point3::new(x, 1.0, 0.0);
///         Triangle::new([a, b, c], ()).unwrap()
///     })
///     .collect::<Vec<_>>();
/// let bvh = Bvh::build(triangles, 1).unwrap();
/// let flat = bvh.flatten();
///
/// // Only enter nodes reaching below x = 3.
/// let leaves = flat
///     .stackless_iter(Vector3::x(), |_, node| node.aabb.min.x < 3.0)
///     .collect::<Vec<_>>();
/// assert_eq!(leaves.len(), 2);
/// ```
///
/// [`TraversalState`]: enum.TraversalState.html
///
pub struct StacklessIter<'a, F> {
    nodes: &'a [FlatNode],
    direction: Vector3,
    enter: F,
    current: usize,
    state: TraversalState,
    started: bool,
    done: bool,
}

impl<'a, F> StacklessIter<'a, F>
where
    F: FnMut(usize, &FlatNode) -> bool,
{
    /// Creates a new iterator starting at the root, `nodes[0]`.
    pub fn new(nodes: &'a [FlatNode], direction: Vector3, enter: F) -> Self {
        StacklessIter {
            nodes,
            direction,
            enter,
            current: 0,
            state: TraversalState::FromParent,
            started: false,
            done: nodes.is_empty(),
        }
    }

    /// Returns the near and the far child of an inner node.
    fn ordered_children(&self, index: usize) -> Option<(usize, usize)> {
        let node = &self.nodes[index];
        let (left, right) = (node.child_l?, node.child_r?);
        if self.direction[node.split_axis] > 0.0 {
            Some((left, right))
        } else {
            Some((right, left))
        }
    }

    fn move_to(&mut self, target: Option<usize>, state: TraversalState) {
        match target {
            Some(index) => {
                self.current = index;
                self.state = state;
            }
            None => self.done = true,
        }
    }

    /// Leaves the current node after its subtree was entered or skipped.
    fn leave(&mut self, arrived: TraversalState) {
        let node = self.nodes[self.current];
        match arrived {
            TraversalState::FromParent => self.move_to(node.sibling, TraversalState::FromSibling),
            _ => self.move_to(node.parent, TraversalState::FromChild),
        }
    }
}

impl<F> Iterator for StacklessIter<'_, F>
where
    F: FnMut(usize, &FlatNode) -> bool,
{
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let nodes = self.nodes;
        if !self.started {
            self.started = true;
            if !self.done {
                let root = &nodes[0];
                if !(self.enter)(0, root) {
                    self.done = true;
                } else if root.is_leaf() {
                    self.done = true;
                    return Some(0);
                } else {
                    let near = self.ordered_children(0).map(|(near, _)| near);
                    self.move_to(near, TraversalState::FromParent);
                }
            }
        }

        while !self.done {
            let current = self.current;
            let node = &nodes[current];
            match self.state {
                TraversalState::FromChild => {
                    let Some(parent) = node.parent else {
                        self.done = true;
                        break;
                    };
                    let near = self.ordered_children(parent).map(|(near, _)| near);
                    if near == Some(current) {
                        self.move_to(node.sibling, TraversalState::FromSibling);
                    } else {
                        self.move_to(Some(parent), TraversalState::FromChild);
                    }
                }
                arrived => {
                    if !(self.enter)(current, node) {
                        self.leave(arrived);
                    } else if node.is_leaf() {
                        self.leave(arrived);
                        return Some(current);
                    } else {
                        let near = self.ordered_children(current).map(|(near, _)| near);
                        self.move_to(near, TraversalState::FromParent);
                    }
                }
            }
        }
        None
    }
}
