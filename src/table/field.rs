//! Column bands and fragment-to-column assignment.

use crate::config::AssignBy;
use crate::geometry::{median, BBox};
use crate::layout::{deskewed_x, find_paragraphs, Node, NodeId};
use crate::table::header::BoundHeader;
use std::collections::HashMap;

/// One header's column: its band in deskewed x and the fragments assigned to it.
#[derive(Debug, Clone)]
pub struct Field {
    pub header: BoundHeader,
    /// Inclusive lower bound of the band
    pub left: f32,
    /// Exclusive upper bound of the band
    pub right: f32,
    pub nodes: Vec<Node>,
}

impl Field {
    /// True when a deskewed x position falls in the band.
    pub fn contains_x(&self, x: f32) -> bool {
        x >= self.left && x < self.right
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }
}

fn deskewed_left(bbox: &BBox, angle: f32) -> f32 {
    deskewed_x(bbox, angle) - bbox.width() / 2.0
}

fn deskewed_right(bbox: &BBox, angle: f32) -> f32 {
    deskewed_x(bbox, angle) + bbox.width() / 2.0
}

/// Build one empty field per header, ordered left to right.
///
/// Each band runs between the midpoints of the gaps to the neighboring
/// headers; the outermost bands are unbounded.
pub fn build_fields(headers: &[BoundHeader], angle: f32) -> Vec<Field> {
    let mut ordered: Vec<&BoundHeader> = headers.iter().collect();
    ordered.sort_by(|a, b| deskewed_x(&a.bbox(), angle).total_cmp(&deskewed_x(&b.bbox(), angle)));

    let mut fields: Vec<Field> = Vec::with_capacity(ordered.len());
    for (i, header) in ordered.iter().enumerate() {
        let left = if i == 0 {
            f32::NEG_INFINITY
        } else {
            boundary(&ordered[i - 1].bbox(), &header.bbox(), angle)
        };
        let right = match ordered.get(i + 1) {
            Some(next) => boundary(&header.bbox(), &next.bbox(), angle),
            None => f32::INFINITY,
        };
        fields.push(Field {
            header: (*header).clone(),
            left,
            right,
            nodes: Vec::new(),
        });
    }
    fields
}

/// Midpoint of the gap between two horizontally consecutive headers; the
/// midpoint of their centers when they overlap.
fn boundary(a: &BBox, b: &BBox, angle: f32) -> f32 {
    let (ar, bl) = (deskewed_right(a, angle), deskewed_left(b, angle));
    if ar <= bl {
        (ar + bl) / 2.0
    } else {
        (deskewed_x(a, angle) + deskewed_x(b, angle)) / 2.0
    }
}

fn field_index(fields: &[Field], x: f32) -> Option<usize> {
    fields.iter().position(|f| f.contains_x(x))
}

/// Assign fragments to the field whose band contains their horizontal
/// center, one by one or as left-aligned paragraphs.
pub fn assign(fields: &mut [Field], nodes: &[Node], angle: f32, by: AssignBy) {
    match by {
        AssignBy::Node => {
            for node in nodes {
                if let Some(i) = field_index(fields, deskewed_x(&node.bbox, angle)) {
                    fields[i].nodes.push(node.clone());
                }
            }
        },
        AssignBy::Paragraph => {
            for paragraph in find_paragraphs(nodes) {
                if let Some(i) = field_index(fields, deskewed_x(&paragraph.bbox(), angle)) {
                    fields[i].nodes.extend(paragraph.into_nodes());
                }
            }
        },
    }
}

/// Reclaim fragments assigned left of a column boundary that the right
/// column's content clearly starts at.
///
/// When at least `min_aligned` fragments of the right column share a left
/// edge, every fragment of the left column starting at or beyond that edge
/// moves right. Returns the number of moved fragments.
pub fn recheck(fields: &mut [Field], angle: f32, min_aligned: usize) -> usize {
    let mut moved = 0;
    for i in 0..fields.len().saturating_sub(1) {
        let right_nodes = &fields[i + 1].nodes;
        if right_nodes.len() < min_aligned {
            continue;
        }
        let lefts: Vec<f32> = right_nodes.iter().map(|n| deskewed_left(&n.bbox, angle)).collect();
        let avg_h =
            right_nodes.iter().map(|n| n.bbox.height()).sum::<f32>() / right_nodes.len() as f32;
        let Some(edge) = median(&lefts) else {
            continue;
        };
        let tol = avg_h / 2.0;
        let aligned = lefts.iter().filter(|l| (*l - edge).abs() < tol).count();
        if aligned < min_aligned {
            continue;
        }

        let (keep, reclaim): (Vec<Node>, Vec<Node>) = std::mem::take(&mut fields[i].nodes)
            .into_iter()
            .partition(|n| deskewed_left(&n.bbox, angle) < edge - tol);
        for node in &reclaim {
            log::trace!(
                "moving '{}' from '{}' to '{}'",
                node.text(),
                fields[i].name(),
                fields[i + 1].name()
            );
        }
        moved += reclaim.len();
        fields[i].nodes = keep;
        fields[i + 1].nodes.extend(reclaim);
    }
    moved
}

/// Map from node id to field index.
pub fn column_of(fields: &[Field]) -> HashMap<NodeId, usize> {
    let mut map = HashMap::new();
    for (i, f) in fields.iter().enumerate() {
        for n in &f.nodes {
            map.insert(n.uid.clone(), i);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{NodeChanges, NodeGroup};
    use crate::matching::MultiRowMatch;

    fn mock_node(id: &str, text: &str, x: f32, y: f32, w: f32) -> Node {
        Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
    }

    fn mock_header(name: &str, x: f32, w: f32) -> BoundHeader {
        BoundHeader {
            name: name.into(),
            header_type: name.to_uppercase(),
            prime_key: false,
            matched: MultiRowMatch {
                lines: vec![NodeGroup::from_nodes([mock_node(name, name, x, 0.0, w)])],
                distance: 0,
                changes: NodeChanges::new(),
                split: false,
            },
            auto: false,
        }
    }

    #[test]
    fn test_bands_use_gap_midpoints() {
        let headers = [mock_header("b", 200.0, 40.0), mock_header("a", 0.0, 40.0)];
        let fields = build_fields(&headers, 0.0);
        assert_eq!(fields[0].name(), "a");
        assert_eq!(fields[0].left, f32::NEG_INFINITY);
        assert_eq!(fields[0].right, 120.0);
        assert_eq!(fields[1].left, 120.0);
        assert_eq!(fields[1].right, f32::INFINITY);
    }

    #[test]
    fn test_assign_by_center() {
        let headers = [mock_header("a", 0.0, 40.0), mock_header("b", 200.0, 40.0)];
        let mut fields = build_fields(&headers, 0.0);
        let nodes = vec![
            mock_node("1", "x", 0.0, 40.0, 30.0),
            mock_node("2", "y", 110.0, 40.0, 30.0),
            mock_node("3", "z", 300.0, 40.0, 30.0),
        ];
        assign(&mut fields, &nodes, 0.0, AssignBy::Node);
        assert_eq!(fields[0].nodes.len(), 1);
        assert_eq!(fields[1].nodes.len(), 2);
    }

    #[test]
    fn test_recheck_moves_boundary_fragment() {
        let headers = [mock_header("a", 0.0, 40.0), mock_header("b", 200.0, 40.0)];
        let mut fields = build_fields(&headers, 0.0);
        // right column content starts at x=100, left of the 120 boundary
        let mut nodes: Vec<Node> = (0..5)
            .map(|i| {
                let y = 40.0 + 30.0 * i as f32;
                mock_node(&format!("r{}", i), "long text", 100.0, y, 100.0)
            })
            .collect();
        nodes.push(mock_node("short", "ab", 100.0, 200.0, 30.0));
        nodes.push(mock_node("left", "cd", 0.0, 200.0, 30.0));
        assign(&mut fields, &nodes, 0.0, AssignBy::Node);
        assert!(fields[0].nodes.iter().any(|n| n.uid.as_str() == "short"));
        let moved = recheck(&mut fields, 0.0, 5);
        assert_eq!(moved, 1);
        assert!(fields[1].nodes.iter().any(|n| n.uid.as_str() == "short"));
        assert!(fields[0].nodes.iter().any(|n| n.uid.as_str() == "left"));
    }
}
