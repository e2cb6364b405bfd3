//! Ordered collections of nodes with cached geometry.

use crate::geometry::BBox;
use crate::layout::node::{Node, NodeId};
use serde::Serialize;

/// An ordered group of nodes with a cached union box and running average height.
///
/// The group holds its own copies of the nodes; grouping never changes the
/// nodes of the working set it was built from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeGroup {
    nodes: Vec<Node>,
    bbox: Option<BBox>,
    height_sum: f32,
}

impl NodeGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a group from nodes, keeping their order.
    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        let mut group = Self::new();
        for node in nodes {
            group.append(node);
        }
        group
    }

    /// Append a node, growing the cached box.
    pub fn append(&mut self, node: Node) {
        self.bbox = Some(match self.bbox {
            Some(b) => b.merge(&node.bbox),
            None => node.bbox,
        });
        self.height_sum += node.bbox.height();
        self.nodes.push(node);
    }

    /// Append every node of another group.
    pub fn extend(&mut self, other: NodeGroup) {
        for node in other.nodes {
            self.append(node);
        }
    }

    /// The member nodes, in order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Consume the group.
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the group has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Union box of all members (a zero box when empty).
    pub fn bbox(&self) -> BBox {
        self.bbox.unwrap_or_default()
    }

    /// Average member height.
    pub fn avg_height(&self) -> f32 {
        if self.nodes.is_empty() {
            0.0
        } else {
            self.height_sum / self.nodes.len() as f32
        }
    }

    /// Member texts joined without separator.
    pub fn content(&self) -> String {
        self.nodes.iter().map(|n| n.text()).collect()
    }

    /// Member texts joined with `sep`.
    pub fn content_with(&self, sep: &str) -> String {
        self.nodes
            .iter()
            .map(|n| n.text())
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// Member scores concatenated in order.
    pub fn scores(&self) -> Vec<f32> {
        self.nodes
            .iter()
            .flat_map(|n| n.scores().iter().copied())
            .collect()
    }

    /// Member ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.uid)
    }

    /// True when a member has the given id.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.uid == id)
    }

    /// True when any member is the leftover piece of a split.
    pub fn has_cut(&self) -> bool {
        self.nodes.iter().any(|n| n.is_cut)
    }

    /// Sort members left to right.
    pub fn sort_by_x(&mut self) {
        self.nodes.sort_by(|a, b| a.bbox.left.total_cmp(&b.bbox.left));
    }

    /// Sort members top to bottom.
    pub fn sort_by_y(&mut self) {
        self.nodes.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top));
    }

    /// Sorted left to right, by value.
    pub fn sorted_by_x(mut self) -> Self {
        self.sort_by_x();
        self
    }

    /// Remove members matching the predicate; the cached geometry is rebuilt.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Node) -> bool,
    {
        let nodes = std::mem::take(&mut self.nodes);
        *self = NodeGroup::from_nodes(nodes.into_iter().filter(|n| keep(n)));
    }
}
