//! Integration tests for fragment grouping.
//!
//! These tests lay out fragments the way a scanned page produces them and
//! check row, paragraph and skew handling.

use table_oxide::geometry::{BBox, Point, RotatedBox};
use table_oxide::layout::{
    deskewed_y, estimate_skew_from_rotated, find_lines, find_paragraphs, find_row_lines, Node,
    NodeArena, NodeChanges,
};

// ============================================================================
// Helper Functions for Creating Mock Data
// ============================================================================

/// Create a 30×20 fragment centered vertically on `cy`.
fn mock_node(id: &str, x: f32, cy: f32) -> Node {
    Node::new(id, id, BBox::new(x, cy - 10.0, x + 30.0, cy + 10.0))
}

/// Create a fragment carrying a rotated box with the given angle.
fn mock_rotated(id: &str, text: &str, x: f32, y: f32, angle: f32) -> Node {
    let w = 12.0 * text.chars().count() as f32;
    let points = [
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + 20.0),
        Point::new(x, y + 20.0),
    ];
    Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
        .with_rotated_box(RotatedBox::new(points, angle))
}

fn ids(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.uid.as_str()).collect()
}

// ============================================================================
// Row Grouping
// ============================================================================

#[test]
fn test_two_rows_in_reading_order() {
    let nodes = vec![
        mock_node("c", 90.0, 101.0),
        mock_node("e", 50.0, 199.0),
        mock_node("a", 10.0, 100.0),
        mock_node("d", 10.0, 200.0),
        mock_node("b", 50.0, 99.0),
    ];
    let rows = find_row_lines(&nodes, 0.5);

    assert_eq!(rows.len(), 2);
    let first = rows[0].clone().sorted_by_x();
    assert_eq!(ids(first.nodes()), vec!["a", "b", "c"]);
    let second = rows[1].clone().sorted_by_x();
    assert_eq!(ids(second.nodes()), vec!["d", "e"]);
}

#[test]
fn test_find_lines_flat_page_sorted_top_down() {
    let nodes = vec![
        mock_node("low", 10.0, 300.0),
        mock_node("mid", 10.0, 200.0),
        mock_node("top", 10.0, 100.0),
    ];
    let rows = find_lines(&nodes, 0.0);
    let order: Vec<String> = rows.iter().map(|r| r.content()).collect();
    assert_eq!(order, vec!["top", "mid", "low"]);
}

#[test]
fn test_find_lines_follows_skew() {
    // each row descends 3 degrees; neighbours differ in y by up to ~10 px
    let angle: f32 = 3.0;
    let slope = angle.to_radians().tan();
    let mut nodes = Vec::new();
    for (r, base) in [100.0f32, 160.0].iter().enumerate() {
        for (c, x) in [0.0f32, 100.0, 200.0].iter().enumerate() {
            nodes.push(mock_node(&format!("r{}c{}", r, c), *x, base + slope * x));
        }
    }
    let rows = find_lines(&nodes, angle);

    assert_eq!(rows.len(), 2);
    for (r, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 3);
        assert!(row.nodes().iter().all(|n| n.uid.as_str().starts_with(&format!("r{}", r))));
    }
}

#[test]
fn test_deskewed_y_levels_a_tilted_row() {
    let angle: f32 = 5.0;
    let slope = angle.to_radians().tan();
    let a = BBox::new(0.0, 90.0, 30.0, 110.0);
    let b = BBox::new(300.0, 90.0 + slope * 300.0, 330.0, 110.0 + slope * 300.0);
    assert!((deskewed_y(&a, angle) - deskewed_y(&b, angle)).abs() < 0.5);
}

// ============================================================================
// Paragraphs and Skew
// ============================================================================

#[test]
fn test_paragraphs_split_on_gap() {
    let nodes = vec![
        mock_node("p1a", 10.0, 100.0),
        mock_node("p1b", 12.0, 122.0),
        mock_node("p2", 10.0, 220.0),
    ];
    let paragraphs = find_paragraphs(&nodes);
    assert_eq!(paragraphs.len(), 2);
    assert_eq!(paragraphs[0].len(), 2);
}

#[test]
fn test_skew_from_rotated_boxes_ignores_short_fragments() {
    let nodes = vec![
        mock_rotated("1", "Description", 0.0, 0.0, 2.0),
        mock_rotated("2", "Unit Price", 200.0, 0.0, 2.5),
        mock_rotated("3", "Qty", 400.0, 0.0, 40.0),
    ];
    assert_eq!(estimate_skew_from_rotated(&nodes, 5), Some(2.25));
    assert_eq!(estimate_skew_from_rotated(&nodes[2..], 5), None);
}

// ============================================================================
// Arena and Proposals
// ============================================================================

#[test]
fn test_changes_apply_to_copy_only() {
    let original = Node::new("1", "数量10", BBox::new(0.0, 0.0, 60.0, 20.0));
    let arena = NodeArena::from_nodes(vec![original.clone(), mock_node("2", 100.0, 10.0)]);
    let pieces = original.split(0, 2).expect("valid span");
    let changes = NodeChanges::replace(vec![original.uid.clone()], pieces.into_vec());

    let working = arena.with_changes(&changes);
    assert_eq!(arena.len(), 2);
    assert_eq!(working.len(), 3);
    let texts: Vec<&str> = working.iter().map(|n| n.text()).collect();
    assert!(texts.contains(&"数量") && texts.contains(&"10"));
}
