//! This module defines [`Bvh`] and functions for building and inspecting it.
//!
//! [`Bvh`]: struct.Bvh.html
//!

use crate::aabb::{Aabb, Bounded};
use crate::bvh::axis_indices::{AxisIndices, SideMarks};
use crate::bvh::bvh_node::{BuildContext, BvhNode, BvhNodeBuildArgs};
use crate::config::BuildConfig;
use crate::error::{BvhError, Result};
use crate::triangle::Triangle;
use crate::EPSILON;
use log::{debug, info};

/// The [`Bvh`] data structure. Contains the list of [`BvhNode`]s in pre-order, the triangles
/// it was built over, and the order in which its leaves reference those triangles.
///
/// [`Bvh`]: struct.Bvh.html
/// [`BvhNode`]: enum.BvhNode.html
///
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bvh<M = ()> {
    nodes: Vec<BvhNode>,
    triangles: Vec<Triangle<M>>,
    triangle_order: Vec<usize>,
    config: BuildConfig,
    depth: u32,
}

impl<M> Bvh<M> {
    /// Creates a new [`Bvh`] over `triangles` with at most `leaf_size` triangles per leaf and
    /// the default traversal cost.
    ///
    /// # Examples
    /// ```
    /// use tribvh::bvh::Bvh;
    /// use tribvh::triangle::Triangle;
    /// use tribvh::Point3;
    ///
    /// let a = Point3::new(0.0, 0.0, 0.0);
    /// let b = Point3::new(1.0, 0.0, 0.0);
    /// let c = Point3::new(1.0, 1.0, 0.0);
    /// let d = Point3::new(0.0, 1.0, 0.0);
    /// let square = vec![
    ///     Triangle::new([a, b, c], ()).unwrap(),
    ///     Triangle::new([a, c, d], ()).unwrap(),
    /// ];
    ///
    /// let bvh = Bvh::build(square, 4).unwrap();
    /// assert!(bvh.root().is_leaf());
    /// assert_eq!(bvh.depth(), 0);
    /// ```
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn build(triangles: Vec<Triangle<M>>, leaf_size: usize) -> Result<Bvh<M>> {
        Bvh::build_with_config(triangles, BuildConfig::default().with_leaf_size(leaf_size))
    }

    /// Creates a new [`Bvh`] over `triangles` with the parameters in `config`.
    ///
    /// Fails if `config` is invalid, if `triangles` is empty or if a triangle has a
    /// non-finite vertex.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn build_with_config(triangles: Vec<Triangle<M>>, config: BuildConfig) -> Result<Bvh<M>> {
        Bvh::assemble(triangles, config, |context, args| BvhNode::build(context, args))
    }

    /// Validates the input, presorts the triangle indices, runs `builder` for the root and
    /// derives the final triangle order from the leaves.
    fn assemble(
        triangles: Vec<Triangle<M>>,
        config: BuildConfig,
        builder: impl FnOnce(&BuildContext<'_, M>, BvhNodeBuildArgs<'_>) -> Vec<BvhNode>,
    ) -> Result<Bvh<M>> {
        config.validate()?;
        if triangles.is_empty() {
            return Err(BvhError::EmptyInput);
        }
        for (index, triangle) in triangles.iter().enumerate() {
            Aabb::from_points(triangle.vertices()).map_err(|err| err.at_triangle(index))?;
        }

        let mut indices = AxisIndices::presort(&triangles);
        let marks = SideMarks::new(triangles.len());
        let nodes = {
            let context = BuildContext {
                triangles: &triangles,
                marks: &marks,
                config: &config,
            };
            builder(&context, BvhNodeBuildArgs::new(indices.views(), None, 0))
        };

        // Leaves keep the order of their own axis.
        let mut triangle_order = vec![0; triangles.len()];
        for node in &nodes {
            if let BvhNode::Leaf {
                split_axis,
                start,
                len,
                ..
            } = *node
            {
                let range = start..start + len;
                triangle_order[range.clone()].copy_from_slice(&indices.axis(split_axis)[range]);
            }
        }

        let depth = nodes.iter().map(BvhNode::depth).max().unwrap_or(0);
        debug!(
            "Built BVH over {} triangles: {} nodes, depth {}, leaf size {}",
            triangles.len(),
            nodes.len(),
            depth,
            config.leaf_size
        );

        Ok(Bvh {
            nodes,
            triangles,
            triangle_order,
            config,
            depth,
        })
    }

    /// The nodes in pre-order. The root is at index 0.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// The root node.
    pub fn root(&self) -> &BvhNode {
        &self.nodes[0]
    }

    /// The triangles in input order.
    pub fn triangles(&self) -> &[Triangle<M>] {
        &self.triangles
    }

    /// Consumes the [`Bvh`] and returns the triangles in input order.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn into_triangles(self) -> Vec<Triangle<M>> {
        self.triangles
    }

    /// Indices into [`triangles`] in the order the leaves reference them. The triangles of
    /// every subtree form one contiguous run, see [`BvhNode::triangle_range`].
    ///
    /// [`triangles`]: struct.Bvh.html#method.triangles
    /// [`BvhNode::triangle_range`]: enum.BvhNode.html#method.triangle_range
    ///
    pub fn triangle_order(&self) -> &[usize] {
        &self.triangle_order
    }

    /// Indices of all triangles below the node at `node_index`.
    pub fn node_triangles(&self, node_index: usize) -> &[usize] {
        &self.triangle_order[self.nodes[node_index].triangle_range()]
    }

    /// Indices of the triangles of the leaf at `node_index`, ordered along the leaf's axis.
    /// Returns `None` for inner nodes.
    pub fn leaf_triangles(&self, node_index: usize) -> Option<&[usize]> {
        let node = &self.nodes[node_index];
        if node.is_leaf() {
            Some(&self.triangle_order[node.triangle_range()])
        } else {
            None
        }
    }

    /// The parameters the [`Bvh`] was built with.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The maximum number of triangles per leaf.
    pub fn leaf_size(&self) -> usize {
        self.config.leaf_size
    }

    /// The depth of the deepest node. A tree consisting of a single leaf has depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    /// Logs the [`Bvh`] in a tree-like visualization.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn pretty_print(&self) {
        // Pre-order storage already is the printing order.
        for (node_index, node) in self.nodes.iter().enumerate() {
            let padding = " ".repeat(node.depth() as usize);
            match *node {
                BvhNode::Node {
                    split_axis,
                    split_index,
                    child_l_index,
                    child_r_index,
                    aabb,
                    ..
                } => {
                    info!(
                        "{}node={} parent={:?} split={}@{} children=({}, {}) {}",
                        padding,
                        node_index,
                        node.parent(),
                        split_axis,
                        split_index,
                        child_l_index,
                        child_r_index,
                        aabb
                    );
                }
                BvhNode::Leaf { aabb, .. } => {
                    info!(
                        "{}leaf={} parent={:?} triangles={:?} {}",
                        padding,
                        node_index,
                        node.parent(),
                        self.node_triangles(node_index),
                        aabb
                    );
                }
            }
        }
    }

    /// Walks the tree from the root and reports the first broken invariant: wrong parent
    /// links or depths, child bounds outside the parent, bounds which are not the tight
    /// joint bounds of the node's triangles, leaves over the size limit, child ranges which do
    /// not split the parent's range, nodes unreachable from the root, or a triangle order
    /// which is not a permutation.
    fn check_consistency(&self) -> std::result::Result<(), String> {
        let root = self.nodes.first().ok_or("No nodes")?;
        if root.parent().is_some() {
            return Err("The root has a parent".to_string());
        }
        if root.triangle_range() != (0..self.triangles.len()) {
            return Err(format!(
                "The root covers {:?} instead of all {} triangles",
                root.triangle_range(),
                self.triangles.len()
            ));
        }

        let mut node_count = 0;
        let mut stack = vec![(0, 0)];
        while let Some((node_index, expected_depth)) = stack.pop() {
            node_count += 1;
            if node_count > self.nodes.len() {
                return Err("Cycle in the node links".to_string());
            }

            let node = &self.nodes[node_index];
            if node.depth() != expected_depth {
                return Err(format!(
                    "Wrong depth of node {}. Expected: {}; Actual: {}",
                    node_index,
                    expected_depth,
                    node.depth()
                ));
            }
            if node.triangle_count() == 0 {
                return Err(format!("Node {} has no triangles", node_index));
            }

            let mut tight = Aabb::empty();
            for &index in self.node_triangles(node_index) {
                tight.join_mut(&self.triangles[index].aabb());
            }
            if !node.aabb().relative_eq(&tight, EPSILON) {
                return Err(format!(
                    "Bounds of node {} are not tight.\n\tStored: {}\n\tTriangles: {}",
                    node_index,
                    node.aabb(),
                    tight
                ));
            }

            match *node {
                BvhNode::Node {
                    split_index,
                    start,
                    len,
                    child_l_index,
                    child_r_index,
                    aabb,
                    ..
                } => {
                    let expected = [
                        (child_l_index, start..start + split_index),
                        (child_r_index, start + split_index..start + len),
                    ];
                    for (child_index, range) in expected {
                        let child = self
                            .nodes
                            .get(child_index)
                            .ok_or(format!("Child {} does not exist", child_index))?;
                        if child.parent() != Some(node_index) {
                            return Err(format!(
                                "Wrong parent index of node {}. Expected: {}; Actual: {:?}",
                                child_index,
                                node_index,
                                child.parent()
                            ));
                        }
                        if child.triangle_range() != range {
                            return Err(format!(
                                "Node {} covers {:?} instead of {:?}",
                                child_index,
                                child.triangle_range(),
                                range
                            ));
                        }
                        if !aabb.approx_contains_aabb_eps(&child.aabb(), EPSILON) {
                            return Err(format!(
                                "Child {} lies outside the bounds of node {}.\n\tBounds: {}\n\tChild: {}",
                                child_index,
                                node_index,
                                aabb,
                                child.aabb()
                            ));
                        }
                        stack.push((child_index, expected_depth + 1));
                    }
                }
                BvhNode::Leaf { len, .. } => {
                    if len > self.config.leaf_size {
                        return Err(format!(
                            "Leaf {} holds {} triangles, more than {}",
                            node_index, len, self.config.leaf_size
                        ));
                    }
                }
            }
        }

        if node_count != self.nodes.len() {
            return Err("Detached subtree".to_string());
        }

        let mut seen = vec![false; self.triangles.len()];
        for &index in &self.triangle_order {
            match seen.get_mut(index) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(format!("Triangle {} is referenced twice", index)),
            }
        }
        Ok(())
    }

    /// Checks that the parent links are correct, that there is no detached subtree, that
    /// every triangle is referenced by exactly one leaf, and that the [`Aabb`] hierarchy is
    /// consistent and tight.
    ///
    /// [`Aabb`]: ../aabb/struct.Aabb.html
    ///
    pub fn is_consistent(&self) -> bool {
        self.check_consistency().is_ok()
    }

    /// Assert version of [`is_consistent`].
    ///
    /// [`is_consistent`]: struct.Bvh.html#method.is_consistent
    ///
    pub fn assert_consistent(&self) {
        if let Err(message) = self.check_consistency() {
            self.pretty_print();
            panic!("{}", message);
        }
    }
}

#[cfg(feature = "rayon")]
impl<M: Sync> Bvh<M> {
    /// Creates a new [`Bvh`] like [`build`], building large sibling subtrees in parallel.
    /// The result is identical to the sequential build.
    ///
    /// [`Bvh`]: struct.Bvh.html
    /// [`build`]: struct.Bvh.html#method.build
    ///
    pub fn build_par(triangles: Vec<Triangle<M>>, leaf_size: usize) -> Result<Bvh<M>> {
        Bvh::build_par_with_config(triangles, BuildConfig::default().with_leaf_size(leaf_size))
    }

    /// Parallel version of [`build_with_config`].
    ///
    /// [`build_with_config`]: struct.Bvh.html#method.build_with_config
    ///
    pub fn build_par_with_config(
        triangles: Vec<Triangle<M>>,
        config: BuildConfig,
    ) -> Result<Bvh<M>> {
        Bvh::assemble(triangles, config, |context, args| {
            BvhNode::build_par(context, args)
        })
    }
}
