//! Integration tests for label matching.
//!
//! Fragments are laid out as a scanned document would produce them: one
//! fragment per recognized word, 12 px per character, 20 px high.

use table_oxide::geometry::BBox;
use table_oxide::layout::{Node, NodeArena};
use table_oxide::matching::{AlignPolicy, BgItem, MatchLimits, MatchMode, MultiRowLabel, Preprocess};

// ============================================================================
// Helper Functions for Creating Mock Data
// ============================================================================

/// Create a fragment at `(x, y)` sized from its text.
fn mock_node(id: &str, text: &str, x: f32, y: f32) -> Node {
    let w = 12.0 * text.chars().count() as f32;
    Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
}

fn mock_arena(nodes: Vec<Node>) -> NodeArena {
    NodeArena::from_nodes(nodes)
}

// ============================================================================
// Single-label matching
// ============================================================================

#[test]
fn test_common_label_finds_single_node() {
    let arena = mock_arena(vec![
        mock_node("1", "金额", 300.0, 0.0),
        mock_node("2", "数量", 200.0, 0.0),
        mock_node("3", "合同号", 0.0, 0.0),
        mock_node("4", "1,200.00", 300.0, 40.0),
    ]);
    let matches = BgItem::new("金额", MatchMode::Common).with_ed_thresh(0).find(&arena);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.uid.as_str(), "1");
    assert_eq!(matches[0].distance, 0);
    assert!(matches[0].changes.is_empty());
}

#[test]
fn test_h_split_glued_label() {
    let arena = mock_arena(vec![mock_node("1", "ABCxyz", 0.0, 0.0)]);
    let matches = BgItem::new("ABC", MatchMode::HSplit)
        .with_ed_thresh(-1)
        .with_max_interval(1)
        .find(&arena);

    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.node.text(), "ABC");
    let rest = m.rest.as_ref().expect("rest piece");
    assert_eq!(rest.text(), "xyz");
    assert!(rest.is_cut);
    assert_eq!(m.node.bbox.right, rest.bbox.left);

    // applying the proposal swaps the original for both pieces
    let working = arena.with_changes(&m.changes);
    assert_eq!(working.len(), 2);
    assert!(!working.iter().any(|n| n.uid.as_str() == "1"));
}

#[test]
fn test_h_split_rejects_label_deep_inside() {
    let arena = mock_arena(vec![mock_node("1", "xyzwABC", 0.0, 0.0)]);
    let matches = BgItem::new("ABC", MatchMode::HSplit).with_ed_thresh(-1).find(&arena);
    assert!(matches.is_empty());
}

#[test]
fn test_h_split_with_preprocess_keeps_original_text() {
    let arena = mock_arena(vec![mock_node("1", "ｎｏ.1234", 0.0, 0.0)]);
    let matches = BgItem::new("no", MatchMode::HSplit)
        .with_ed_thresh(-1)
        .with_preprocess(Preprocess::Halfwidth)
        .find(&arena);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.text(), "ｎｏ");
    assert_eq!(matches[0].rest.as_ref().map(|r| r.text()), Some(".1234"));
}

#[test]
fn test_h_merge_rebuilds_broken_label() {
    let arena = mock_arena(vec![
        mock_node("1", "总", 0.0, 0.0),
        mock_node("2", "金", 14.0, 1.0),
        mock_node("3", "额", 28.0, 0.0),
        mock_node("4", "金", 0.0, 200.0),
    ]);
    let matches = BgItem::new("总金额", MatchMode::HMerge).find(&arena);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node.text(), "总金额");
    assert_eq!(matches[0].node.uid.as_str(), "1+2+3");
    assert_eq!(matches[0].changes.removed.len(), 3);
}

// ============================================================================
// Multi-line labels
// ============================================================================

#[test]
fn test_two_line_label() {
    let arena = mock_arena(vec![
        mock_node("1", "Unit", 0.0, 0.0),
        mock_node("2", "Price", 0.0, 22.0),
        mock_node("3", "Price", 400.0, 0.0),
    ]);
    let label = MultiRowLabel::new(
        vec![
            vec![vec![BgItem::new("Unit", MatchMode::Common)]],
            vec![vec![BgItem::new("Price", MatchMode::Common)]],
        ],
        AlignPolicy::default(),
    );
    let matches = label.find(&arena, &MatchLimits::default());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].lines.len(), 2);
    assert_eq!(matches[0].bbox(), BBox::new(0.0, 0.0, 60.0, 42.0));
}

#[test]
fn test_multi_line_label_missing_row_never_matches() {
    let arena = mock_arena(vec![mock_node("1", "Unit", 0.0, 0.0)]);
    let label = MultiRowLabel::new(
        vec![
            vec![vec![BgItem::new("Unit", MatchMode::Common)]],
            vec![vec![BgItem::new("Price", MatchMode::Common)]],
        ],
        AlignPolicy::default(),
    );
    assert!(label.find(&arena, &MatchLimits::default()).is_empty());
}

#[test]
fn test_same_line_pieces() {
    let arena = mock_arena(vec![
        mock_node("1", "Gross", 0.0, 0.0),
        mock_node("2", "Weight", 66.0, 1.0),
    ]);
    let label = MultiRowLabel::new(
        vec![vec![
            vec![BgItem::new("Gross", MatchMode::Common)],
            vec![BgItem::new("Weight", MatchMode::Common)],
        ]],
        AlignPolicy::default(),
    );
    let matches = label.find(&arena, &MatchLimits::default());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].node_ids().len(), 2);
}
