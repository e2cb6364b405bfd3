//! The owning node container and proposed changes to it.
//!
//! Matchers never mutate the working set directly: they return a
//! [`NodeChanges`] describing nodes to insert and ids to remove, and the caller
//! decides whether to apply it. Competing hypotheses each apply their own
//! changes to their own copy of the arena.

use crate::layout::node::{Node, NodeId};
use std::collections::BTreeMap;

/// Nodes keyed by stable id, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from nodes; a later node replaces an earlier one with the same id.
    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        let mut arena = Self::new();
        for node in nodes {
            arena.insert(node);
        }
        arena
    }

    /// Insert or replace a node.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.uid.clone(), node);
    }

    /// Remove a node by id.
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Look up a node.
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// True when the id is present.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Cloned nodes in id order.
    pub fn to_vec(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    /// Average node height, `0.0` when empty.
    pub fn avg_height(&self) -> f32 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.nodes.values().map(|n| n.bbox.height()).sum::<f32>() / self.nodes.len() as f32
    }

    /// Apply proposed changes: removals first, then insertions.
    pub fn apply(&mut self, changes: &NodeChanges) {
        for id in &changes.removed {
            self.nodes.remove(id);
        }
        for node in &changes.inserted {
            self.insert(node.clone());
        }
    }

    /// A copy with the changes applied.
    pub fn with_changes(&self, changes: &NodeChanges) -> NodeArena {
        let mut copy = self.clone();
        copy.apply(changes);
        copy
    }
}

/// Insertions and removals proposed by a matcher.
#[derive(Debug, Clone, Default)]
pub struct NodeChanges {
    /// Nodes to add (split pieces, merged nodes)
    pub inserted: Vec<Node>,
    /// Ids to drop (originals replaced by their pieces)
    pub removed: Vec<NodeId>,
}

impl NodeChanges {
    /// No changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing is proposed.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    /// Propose replacing `removed` by `inserted`.
    pub fn replace(removed: Vec<NodeId>, inserted: Vec<Node>) -> Self {
        Self { inserted, removed }
    }

    /// Fold another proposal into this one, skipping duplicates.
    ///
    /// Inserted nodes are deduplicated by node equality (text and box).
    pub fn absorb(&mut self, other: &NodeChanges) {
        for id in &other.removed {
            if !self.removed.contains(id) {
                self.removed.push(id.clone());
            }
        }
        for node in &other.inserted {
            if !self.inserted.iter().any(|n| n == node) {
                self.inserted.push(node.clone());
            }
        }
    }

    /// Leftover pieces marked as cut.
    pub fn cut_nodes(&self) -> impl Iterator<Item = &Node> {
        self.inserted.iter().filter(|n| n.is_cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn mock_node(id: &str, text: &str, left: f32) -> Node {
        Node::new(id, text, BBox::new(left, 0.0, left + 10.0, 10.0))
    }

    #[test]
    fn test_arena_iterates_in_id_order() {
        let arena =
            NodeArena::from_nodes(vec![mock_node("b", "2", 10.0), mock_node("a", "1", 0.0)]);
        let texts: Vec<&str> = arena.iter().map(|n| n.text()).collect();
        assert_eq!(texts, vec!["1", "2"]);
        assert_eq!(arena.avg_height(), 10.0);
    }

    #[test]
    fn test_apply_changes() {
        let mut arena = NodeArena::from_nodes(vec![mock_node("a", "ABCxyz", 0.0)]);
        let pieces = arena.get(&NodeId::new("a")).unwrap().split(0, 3).unwrap();
        let changes = NodeChanges::replace(vec![NodeId::new("a")], pieces.into_vec());
        let copy = arena.with_changes(&changes);
        assert_eq!(copy.len(), 2);
        assert!(!copy.contains(&NodeId::new("a")));
        // The original arena is untouched until changes are applied to it
        assert!(arena.contains(&NodeId::new("a")));
        arena.apply(&changes);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_absorb_dedups_by_geometry() {
        let mut a = NodeChanges::replace(vec![NodeId::new("x")], vec![mock_node("p", "xyz", 30.0)]);
        let b = NodeChanges::replace(vec![NodeId::new("x")], vec![mock_node("q", "xyz", 30.0)]);
        a.absorb(&b);
        assert_eq!(a.removed.len(), 1);
        assert_eq!(a.inserted.len(), 1);
    }
}
