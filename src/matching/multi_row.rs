//! Labels spanning several physical lines and side-by-side fragments.
//!
//! A [`MultiRowLabel`] is a grid: rows × positions × alternative texts. Each
//! cell is matched with [`BgItem`]; pieces of a row must read left to right on
//! one line, and consecutive rows must be stacked and aligned according to the
//! [`AlignPolicy`].

use crate::geometry::BBox;
use crate::layout::{Node, NodeArena, NodeChanges, NodeGroup, NodeId};
use crate::matching::bg_item::{BgItem, BgMatch};
use crate::matching::Cartesian;
use serde::{Deserialize, Serialize};

/// Vertical tolerance (fraction of height) for pieces of one row.
const SAME_LINE_RATIO: f32 = 0.5;

/// How consecutive rows of a label may line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    Center,
    Left,
    Right,
}

/// Vertical alignment policy between the rows of a multi-line label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignPolicy {
    /// Accepted alignments; any one suffices
    pub modes: Vec<AlignMode>,
    /// Largest vertical gap between rows, as a multiple of the average row height
    pub max_row_gap_ratio: f32,
    /// Largest alignment offset, as a fraction of the narrower row's width
    pub width_ratio: f32,
}

impl Default for AlignPolicy {
    fn default() -> Self {
        Self {
            modes: vec![AlignMode::Center, AlignMode::Left, AlignMode::Right],
            max_row_gap_ratio: 1.0,
            width_ratio: 0.8,
        }
    }
}

impl AlignPolicy {
    /// True when `lower` sits directly under `upper` and lines up with it.
    pub fn accepts(&self, upper: &BBox, lower: &BBox) -> bool {
        if lower.cy() <= upper.cy() {
            return false;
        }
        let avg_h = (upper.height() + lower.height()) / 2.0;
        if lower.top - upper.bottom > self.max_row_gap_ratio * avg_h {
            return false;
        }
        let tolerance = self.width_ratio * upper.width().min(lower.width());
        self.modes.iter().any(|mode| {
            let offset = match mode {
                AlignMode::Center => upper.cx() - lower.cx(),
                AlignMode::Left => upper.left - lower.left,
                AlignMode::Right => upper.right - lower.right,
            };
            offset.abs() <= tolerance
        })
    }
}

/// Caps bounding the combinatorial search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    pub max_candidates_per_cell: usize,
    pub max_row_groups: usize,
    pub max_matches: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            max_candidates_per_cell: 16,
            max_row_groups: 64,
            max_matches: 64,
        }
    }
}

/// One geometric realization of a multi-line label.
#[derive(Debug, Clone)]
pub struct MultiRowMatch {
    /// One group per physical row, top to bottom, pieces left to right
    pub lines: Vec<NodeGroup>,
    /// Summed edit distance over all pieces
    pub distance: usize,
    /// Working-set changes implied by merged or split pieces
    pub changes: NodeChanges,
    /// True when a piece was split off a longer fragment
    pub split: bool,
}

impl MultiRowMatch {
    /// Union box of all lines.
    pub fn bbox(&self) -> BBox {
        let boxes: Vec<BBox> = self
            .lines
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| l.bbox())
            .collect();
        BBox::merge_all(&boxes).unwrap_or_default()
    }

    /// Concatenated text, rows top to bottom.
    pub fn content(&self) -> String {
        self.lines.iter().map(|l| l.content()).collect()
    }

    /// Every node of the match.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.lines.iter().flat_map(|l| l.nodes().iter())
    }

    /// Ids of every node of the match.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.uid.clone()).collect()
    }

    /// True when the match involves split or leftover pieces.
    pub fn has_cut(&self) -> bool {
        self.split || self.nodes().any(|n| n.is_cut)
    }

    /// Average node height.
    pub fn avg_height(&self) -> f32 {
        let (sum, count) = self
            .nodes()
            .fold((0.0, 0usize), |(s, c), n| (s + n.bbox.height(), c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }
}

/// A row of a label realized on the page.
#[derive(Debug, Clone)]
struct RowGroup {
    group: NodeGroup,
    distance: usize,
    changes: NodeChanges,
    split: bool,
}

/// A label laid out as rows × positions × alternatives.
#[derive(Debug, Clone)]
pub struct MultiRowLabel {
    pub rows: Vec<Vec<Vec<BgItem>>>,
    pub align: AlignPolicy,
}

impl MultiRowLabel {
    /// Build a label grid.
    pub fn new(rows: Vec<Vec<Vec<BgItem>>>, align: AlignPolicy) -> Self {
        Self { rows, align }
    }

    /// A one-cell label.
    pub fn single(item: BgItem) -> Self {
        Self::new(vec![vec![vec![item]]], AlignPolicy::default())
    }

    /// Text of the first alternative of every cell, for logging.
    pub fn describe(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|alts| alts.first().map(|a| a.text.as_str()))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" / ")
    }

    /// Find every consistent realization of the label.
    ///
    /// Returns an empty list when any cell has no candidate.
    pub fn find(&self, arena: &NodeArena, limits: &MatchLimits) -> Vec<MultiRowMatch> {
        if self.rows.is_empty() || self.rows.iter().any(|r| r.is_empty()) {
            return Vec::new();
        }

        let mut failed = false;
        let mut cells: Vec<Vec<Vec<BgMatch>>> = Vec::with_capacity(self.rows.len());
        for (r, row) in self.rows.iter().enumerate() {
            let mut row_cells = Vec::with_capacity(row.len());
            for (p, alternatives) in row.iter().enumerate() {
                let candidates =
                    cell_candidates(alternatives, arena, limits.max_candidates_per_cell);
                if candidates.is_empty() {
                    if failed {
                        log::trace!(
                            "label '{}': cell ({}, {}) also empty",
                            self.describe(),
                            r,
                            p
                        );
                    } else {
                        log::debug!(
                            "label '{}': cell ({}, {}) has no candidate",
                            self.describe(),
                            r,
                            p
                        );
                    }
                    failed = true;
                }
                row_cells.push(candidates);
            }
            cells.push(row_cells);
        }
        if failed {
            return Vec::new();
        }

        let mut row_groups: Vec<Vec<RowGroup>> = Vec::with_capacity(cells.len());
        for row_cells in &cells {
            let groups = self.row_groups(row_cells, limits.max_row_groups);
            if groups.is_empty() {
                return Vec::new();
            }
            row_groups.push(groups);
        }

        let sizes: Vec<usize> = row_groups.iter().map(|g| g.len()).collect();
        Cartesian::new(&sizes)
            .filter_map(|pick| self.stack(&row_groups, &pick))
            .take(limits.max_matches)
            .collect()
    }

    /// Valid left-to-right combinations of the candidates of one row.
    fn row_groups(&self, row_cells: &[Vec<BgMatch>], cap: usize) -> Vec<RowGroup> {
        let sizes: Vec<usize> = row_cells.iter().map(|c| c.len()).collect();
        Cartesian::new(&sizes)
            .filter_map(|pick| {
                let pieces: Vec<&BgMatch> = pick
                    .iter()
                    .enumerate()
                    .map(|(i, &k)| &row_cells[i][k])
                    .collect();
                let consistent = pieces.windows(2).all(|w| adjacent_on_line(w[0], w[1]));
                if !consistent {
                    return None;
                }
                let mut changes = NodeChanges::new();
                for piece in &pieces {
                    changes.absorb(&piece.changes);
                }
                Some(RowGroup {
                    group: NodeGroup::from_nodes(pieces.iter().map(|m| m.node.clone())),
                    distance: pieces.iter().map(|m| m.distance).sum(),
                    changes,
                    split: pieces.iter().any(|m| m.rest.is_some()),
                })
            })
            .take(cap)
            .collect()
    }

    /// Combine one row group per row if the rows stack according to the policy.
    fn stack(&self, row_groups: &[Vec<RowGroup>], pick: &[usize]) -> Option<MultiRowMatch> {
        let rows: Vec<&RowGroup> = pick
            .iter()
            .enumerate()
            .map(|(i, &k)| &row_groups[i][k])
            .collect();
        for pair in rows.windows(2) {
            if !self.align.accepts(&pair[0].group.bbox(), &pair[1].group.bbox()) {
                return None;
            }
        }
        let mut seen: Vec<&NodeId> = Vec::new();
        for id in rows.iter().flat_map(|r| r.group.ids()) {
            if seen.contains(&id) {
                return None;
            }
            seen.push(id);
        }

        let mut changes = NodeChanges::new();
        for row in &rows {
            changes.absorb(&row.changes);
        }
        Some(MultiRowMatch {
            lines: rows.iter().map(|r| r.group.clone()).collect(),
            distance: rows.iter().map(|r| r.distance).sum(),
            changes,
            split: rows.iter().any(|r| r.split),
        })
    }
}

/// Union of the matches of every alternative, deduplicated, best distance first.
fn cell_candidates(alternatives: &[BgItem], arena: &NodeArena, cap: usize) -> Vec<BgMatch> {
    let mut candidates: Vec<BgMatch> = Vec::new();
    for item in alternatives {
        for m in item.find(arena) {
            if !candidates.iter().any(|c| c.node == m.node) {
                candidates.push(m);
            }
        }
    }
    candidates.sort_by_key(|m| m.distance);
    if candidates.len() > cap {
        log::warn!(
            "{} candidates for '{}', keeping the first {}",
            candidates.len(),
            alternatives.first().map(|a| a.text.as_str()).unwrap_or_default(),
            cap
        );
        candidates.truncate(cap);
    }
    candidates
}

/// `b` follows `a` on the same line within one character width.
fn adjacent_on_line(a: &BgMatch, b: &BgMatch) -> bool {
    let (ab, bb) = (&a.node.bbox, &b.node.bbox);
    if a.node.uid == b.node.uid || bb.cx() <= ab.cx() {
        return false;
    }
    let char_w = a.node.char_width().max(b.node.char_width());
    ab.is_same_line(bb, SAME_LINE_RATIO) && bb.left - ab.right <= char_w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchMode;

    fn mock_node(id: &str, text: &str, x: f32, y: f32) -> Node {
        let w = 20.0 * text.chars().count() as f32;
        Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
    }

    fn item(text: &str) -> BgItem {
        BgItem::new(text, MatchMode::Common)
    }

    #[test]
    fn test_single_row_two_pieces() {
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "Unit", 0.0, 0.0),
            mock_node("2", "Price", 90.0, 2.0),
            mock_node("3", "Price", 400.0, 0.0),
        ]);
        let label = MultiRowLabel::new(
            vec![vec![vec![item("Unit")], vec![item("Price")]]],
            AlignPolicy::default(),
        );
        let matches = label.find(&arena, &MatchLimits::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content(), "UnitPrice");
    }

    #[test]
    fn test_two_rows_stacked() {
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "Gross", 0.0, 0.0),
            mock_node("2", "Weight", 0.0, 22.0),
            mock_node("3", "Weight", 300.0, 22.0),
        ]);
        let label = MultiRowLabel::new(
            vec![vec![vec![item("Gross")]], vec![vec![item("Weight")]]],
            AlignPolicy::default(),
        );
        let matches = label.find(&arena, &MatchLimits::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].lines.len(), 2);
        assert_eq!(matches[0].bbox(), BBox::new(0.0, 0.0, 120.0, 42.0));
    }

    #[test]
    fn test_missing_cell_fails() {
        let arena = NodeArena::from_nodes(vec![mock_node("1", "Gross", 0.0, 0.0)]);
        let label = MultiRowLabel::new(
            vec![vec![vec![item("Gross")]], vec![vec![item("Weight")]]],
            AlignPolicy::default(),
        );
        assert!(label.find(&arena, &MatchLimits::default()).is_empty());
    }

    #[test]
    fn test_alternatives_are_unioned() {
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "Qty", 0.0, 0.0),
            mock_node("2", "数量", 200.0, 0.0),
        ]);
        let label = MultiRowLabel::new(
            vec![vec![vec![item("Qty"), item("数量")]]],
            AlignPolicy::default(),
        );
        assert_eq!(label.find(&arena, &MatchLimits::default()).len(), 2);
    }

    #[test]
    fn test_align_policy_rejects_far_rows() {
        let policy = AlignPolicy::default();
        let upper = BBox::new(0.0, 0.0, 100.0, 20.0);
        assert!(policy.accepts(&upper, &BBox::new(10.0, 22.0, 90.0, 42.0)));
        assert!(!policy.accepts(&upper, &BBox::new(10.0, 80.0, 90.0, 100.0)));
        assert!(!policy.accepts(&upper, &BBox::new(300.0, 22.0, 380.0, 42.0)));
        assert!(!policy.accepts(&BBox::new(10.0, 22.0, 90.0, 42.0), &upper));
    }
}
