//! Fuzzy matcher for a single label ("background item").
//!
//! A [`BgItem`] locates occurrences of one label string among the nodes of a
//! page under one of three modes:
//!
//! - [`MatchMode::Common`]: normalized equality, or Levenshtein distance up to
//!   a threshold
//! - [`MatchMode::HMerge`]: the label's characters were recognized as several
//!   small fragments on one line; they are merged back into one node
//! - [`MatchMode::HSplit`]: the label is glued to trailing content inside one
//!   fragment; the fragment is split into a key piece and a cut rest piece
//!
//! Matching never mutates the arena. Merges and splits are reported as
//! [`NodeChanges`] on each [`BgMatch`].

use crate::layout::clustering::find_row_lines;
use crate::layout::{Node, NodeArena, NodeChanges};
use crate::matching::text::{edit_distance, lcs_align, normalize, realign, Preprocess};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Vertical tolerance used when clustering single-character fragments into lines.
const MERGE_ROW_RATIO: f32 = 0.3;

/// How far into a fragment (in characters) an h_split label may start.
const MAX_SPLIT_OFFSET: usize = 2;

/// Matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Exact or edit-distance match of the whole fragment
    #[default]
    Common,
    /// Merge a line of small fragments
    HMerge,
    /// Split a label prefix off a longer fragment
    HSplit,
}

/// One occurrence of a label.
#[derive(Debug, Clone)]
pub struct BgMatch {
    /// The node that represents the label (original, merged or key piece)
    pub node: Node,
    /// Edit distance between label and matched text
    pub distance: usize,
    /// Trailing content split off the original fragment, marked as cut
    pub rest: Option<Node>,
    /// Working-set changes this match implies
    pub changes: NodeChanges,
}

impl BgMatch {
    fn plain(node: &Node, distance: usize) -> Self {
        Self {
            node: node.clone(),
            distance,
            rest: None,
            changes: NodeChanges::new(),
        }
    }
}

/// A label matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct BgItem {
    /// Label text
    pub text: String,
    /// Matching strategy
    pub mode: MatchMode,
    /// Maximum edit distance; `-1` means exact only
    pub ed_thresh: i32,
    /// Largest allowed index step between consecutive matched characters (h_split)
    pub max_interval: usize,
    /// Ignore symbols when comparing
    pub strip_symbols: bool,
    /// Ignore whitespace when comparing
    pub strip_spaces: bool,
    /// Transformation applied to fragment text before comparing
    pub preprocess: Option<Preprocess>,
}

impl BgItem {
    /// A matcher with default tolerances: exact match, contiguous h_split,
    /// symbols and whitespace ignored.
    pub fn new(text: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            text: text.into(),
            mode,
            ed_thresh: 0,
            max_interval: 1,
            strip_symbols: true,
            strip_spaces: true,
            preprocess: None,
        }
    }

    /// Set the edit-distance threshold.
    pub fn with_ed_thresh(mut self, ed_thresh: i32) -> Self {
        self.ed_thresh = ed_thresh;
        self
    }

    /// Set the h_split index step tolerance.
    pub fn with_max_interval(mut self, max_interval: usize) -> Self {
        self.max_interval = max_interval.max(1);
        self
    }

    /// Set the fragment preprocessing.
    pub fn with_preprocess(mut self, preprocess: Preprocess) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    fn normalized_label(&self) -> String {
        normalize(&self.text, self.strip_symbols, self.strip_spaces)
    }

    fn prepared(&self, text: &str) -> String {
        let text = match self.preprocess {
            Some(p) => p.apply(text),
            None => text.to_string(),
        };
        normalize(&text, self.strip_symbols, self.strip_spaces)
    }

    /// Distance between the label and a fragment's text under common mode, or
    /// `None` when they do not match. Empty strings never match.
    pub fn common_distance(&self, text: &str) -> Option<usize> {
        let label = self.normalized_label();
        let candidate = self.prepared(text);
        if label.is_empty() || candidate.is_empty() {
            return None;
        }
        if label == candidate {
            return Some(0);
        }
        if self.ed_thresh < 0 {
            return None;
        }
        let d = edit_distance(&label, &candidate);
        (d <= self.ed_thresh as usize).then_some(d)
    }

    /// Find every occurrence of the label in the arena.
    pub fn find(&self, arena: &NodeArena) -> Vec<BgMatch> {
        if self.normalized_label().is_empty() {
            return Vec::new();
        }
        match self.mode {
            MatchMode::Common => self.find_common(arena),
            MatchMode::HMerge => self.find_h_merge(arena),
            MatchMode::HSplit => self.find_h_split(arena),
        }
    }

    fn find_common(&self, arena: &NodeArena) -> Vec<BgMatch> {
        arena
            .iter()
            .filter_map(|node| {
                self.common_distance(node.text())
                    .map(|d| BgMatch::plain(node, d))
            })
            .collect()
    }

    fn find_exact(&self, arena: &NodeArena) -> Vec<BgMatch> {
        arena
            .iter()
            .filter(|node| self.common_distance(node.text()) == Some(0))
            .map(|node| BgMatch::plain(node, 0))
            .collect()
    }

    fn find_h_merge(&self, arena: &NodeArena) -> Vec<BgMatch> {
        let exact = self.find_exact(arena);
        if !exact.is_empty() {
            return exact;
        }

        let label = self.normalized_label();
        let charset: HashSet<char> = label.chars().collect();
        let candidates: Vec<Node> = arena
            .iter()
            .filter(|n| {
                let t = self.prepared(n.text());
                !t.is_empty() && t.chars().all(|c| charset.contains(&c))
            })
            .cloned()
            .collect();
        if candidates.len() < 2 {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for line in find_row_lines(&candidates, MERGE_ROW_RATIO) {
            let line = line.sorted_by_x();
            let kept = trim_outliers(line.nodes());
            let content: String = kept.iter().map(|n| self.prepared(n.text())).collect();
            if content != label {
                log::trace!("h_merge line '{}' != label '{}'", content, label);
                continue;
            }
            if let Some(merged) = Node::merge(&kept) {
                let removed = kept.iter().map(|n| n.uid.clone()).collect();
                let changes = NodeChanges::replace(removed, vec![merged.clone()]);
                matches.push(BgMatch {
                    node: merged,
                    distance: 0,
                    rest: None,
                    changes,
                });
            }
        }
        matches
    }

    fn find_h_split(&self, arena: &NodeArena) -> Vec<BgMatch> {
        let label: Vec<char> = self.normalized_label().chars().collect();
        let mut matches = Vec::new();

        for node in arena.iter() {
            if let Some(d) = self.common_distance(node.text()) {
                if d == 0 {
                    matches.push(BgMatch::plain(node, 0));
                    continue;
                }
            }
            if let Some(m) = self.split_match(node, &label) {
                matches.push(m);
            }
        }
        matches
    }

    /// Try to split the label off the start of `node`.
    fn split_match(&self, node: &Node, label: &[char]) -> Option<BgMatch> {
        let original = node.text();
        let n = node.char_count();
        if n <= label.len() {
            return None;
        }
        let candidate = self.prepared(original);
        let cand_chars: Vec<char> = candidate.chars().collect();
        let pairs = lcs_align(label, &cand_chars);
        if pairs.is_empty() {
            return None;
        }

        let missing = label.len() - pairs.len();
        let acceptable = if self.ed_thresh < 0 {
            missing == 0
        } else {
            missing <= self.ed_thresh as usize
        };
        if !acceptable {
            return None;
        }

        // spacing and offset are judged on the compared text
        let raw: Vec<usize> = pairs.iter().map(|p| p.1).collect();
        if raw.windows(2).any(|w| w[1] - w[0] > self.max_interval) {
            log::trace!("h_split '{}' in '{}': matched chars too far apart", self.text, original);
            return None;
        }
        if *raw.first()? > MAX_SPLIT_OFFSET {
            return None;
        }

        let indices = if candidate == original {
            raw
        } else {
            realign(&raw, original, &candidate).unwrap_or(raw)
        };
        let last = *indices.last()?;
        if last >= n {
            return None;
        }

        let end = last + 1;
        if end == n {
            return Some(BgMatch::plain(node, missing));
        }

        let pieces = node.split(0, end)?;
        let key = pieces.inner;
        let mut rest = pieces.after?;
        rest.is_cut = true;
        let changes = NodeChanges::replace(vec![node.uid.clone()], vec![key.clone(), rest.clone()]);
        Some(BgMatch {
            node: key,
            distance: missing,
            rest: Some(rest),
            changes,
        })
    }
}

/// Keep the longest run of fragments whose gaps to their predecessor do not
/// exceed twice the average gap of the line.
fn trim_outliers(line: &[Node]) -> Vec<&Node> {
    if line.len() < 3 {
        return line.iter().collect();
    }
    let gaps: Vec<f32> = line
        .windows(2)
        .map(|w| (w[1].bbox.left - w[0].bbox.right).max(0.0))
        .collect();
    let avg = gaps.iter().sum::<f32>() / gaps.len() as f32;
    if avg <= 0.0 {
        return line.iter().collect();
    }

    let mut best = (0, 1);
    let mut start = 0;
    for (i, gap) in gaps.iter().enumerate() {
        if *gap > 2.0 * avg {
            start = i + 1;
        }
        let end = i + 2;
        if end - start > best.1 - best.0 {
            best = (start, end);
        }
    }
    line[best.0..best.1].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn mock_node(id: &str, text: &str, x: f32, y: f32) -> Node {
        let w = 12.0 * text.chars().count() as f32;
        Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
    }

    fn arena(nodes: Vec<Node>) -> NodeArena {
        NodeArena::from_nodes(nodes)
    }

    #[test]
    fn test_common_exact() {
        let a = arena(vec![
            mock_node("1", "金额", 0.0, 0.0),
            mock_node("2", "数量", 100.0, 0.0),
        ]);
        let matches = BgItem::new("金额", MatchMode::Common).find(&a);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node.uid.as_str(), "1");
        assert_eq!(matches[0].distance, 0);
    }

    #[test]
    fn test_common_edit_distance() {
        let a = arena(vec![mock_node("1", "Quantlty", 0.0, 0.0)]);
        assert!(BgItem::new("Quantity", MatchMode::Common).find(&a).is_empty());
        let m = BgItem::new("Quantity", MatchMode::Common)
            .with_ed_thresh(1)
            .find(&a);
        assert_eq!(m[0].distance, 1);
        assert!(BgItem::new("Quantity", MatchMode::Common)
            .with_ed_thresh(-1)
            .find(&a)
            .is_empty());
    }

    #[test]
    fn test_empty_label_never_matches() {
        let a = arena(vec![mock_node("1", ":", 0.0, 0.0)]);
        assert!(BgItem::new("", MatchMode::Common).find(&a).is_empty());
        // ":" normalizes to empty text
        assert!(BgItem::new(":", MatchMode::Common).find(&a).is_empty());
    }

    #[test]
    fn test_h_merge_single_chars() {
        let a = arena(vec![
            mock_node("1", "单", 0.0, 0.0),
            mock_node("2", "价", 16.0, 1.0),
            mock_node("3", "价", 0.0, 100.0),
        ]);
        let matches = BgItem::new("单价", MatchMode::HMerge).find(&a);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node.text(), "单价");
        assert_eq!(matches[0].changes.removed.len(), 2);
        assert_eq!(matches[0].changes.inserted.len(), 1);
    }

    #[test]
    fn test_h_merge_prefers_exact() {
        let a = arena(vec![
            mock_node("1", "单价", 0.0, 0.0),
            mock_node("2", "单", 0.0, 100.0),
            mock_node("3", "价", 16.0, 100.0),
        ]);
        let matches = BgItem::new("单价", MatchMode::HMerge).find(&a);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node.uid.as_str(), "1");
        assert!(matches[0].changes.is_empty());
    }

    #[test]
    fn test_h_split_prefix() {
        let a = arena(vec![mock_node("1", "ABCxyz", 0.0, 0.0)]);
        let matches = BgItem::new("ABC", MatchMode::HSplit)
            .with_ed_thresh(-1)
            .find(&a);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.node.text(), "ABC");
        let rest = m.rest.as_ref().unwrap();
        assert_eq!(rest.text(), "xyz");
        assert!(rest.is_cut);
        assert!(!m.node.is_cut);
    }

    #[test]
    fn test_h_split_rejects_late_start() {
        let a = arena(vec![mock_node("1", "xxxxABC1", 0.0, 0.0)]);
        assert!(BgItem::new("ABC", MatchMode::HSplit)
            .with_ed_thresh(-1)
            .find(&a)
            .is_empty());
    }

    #[test]
    fn test_h_split_rejects_scattered_chars() {
        let a = arena(vec![mock_node("1", "AxBxC123", 0.0, 0.0)]);
        let item = BgItem::new("ABC", MatchMode::HSplit).with_ed_thresh(-1);
        assert!(item.find(&a).is_empty());
        let loose = item.with_max_interval(2);
        assert_eq!(loose.find(&a)[0].node.text(), "AxBxC");
    }

    #[test]
    fn test_h_split_with_preprocess_realigns() {
        let a = arena(vec![mock_node("1", "No.:A-1234", 0.0, 0.0)]);
        let item = BgItem::new("No", MatchMode::HSplit)
            .with_ed_thresh(-1)
            .with_preprocess(Preprocess::StripSymbols);
        let matches = item.find(&a);
        assert_eq!(matches[0].node.text(), "No");
        assert_eq!(matches[0].rest.as_ref().unwrap().text(), ".:A-1234");
    }

    #[test]
    fn test_h_split_label_with_inner_space() {
        let a = arena(vec![mock_node("1", "Unit Price 12.50", 0.0, 0.0)]);
        let matches = BgItem::new("Unit Price", MatchMode::HSplit)
            .with_ed_thresh(-1)
            .find(&a);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node.text(), "Unit Price");
        let rest = matches[0].rest.as_ref().unwrap();
        assert_eq!(rest.text(), " 12.50");
        assert!(rest.is_cut);
    }

    #[test]
    fn test_h_split_label_with_inner_symbol() {
        let a = arena(vec![mock_node("1", "P.O. No4711", 0.0, 0.0)]);
        let matches = BgItem::new("P.O. No", MatchMode::HSplit)
            .with_ed_thresh(-1)
            .find(&a);
        assert_eq!(matches[0].node.text(), "P.O. No");
        assert_eq!(matches[0].rest.as_ref().unwrap().text(), "4711");
    }

    #[test]
    fn test_trim_outliers_drops_far_char() {
        let line = vec![
            mock_node("1", "a", 0.0, 0.0),
            mock_node("2", "b", 14.0, 0.0),
            mock_node("3", "c", 28.0, 0.0),
            mock_node("4", "d", 300.0, 0.0),
        ];
        let kept: String = trim_outliers(&line).iter().map(|n| n.text()).collect();
        assert_eq!(kept, "abc");
    }
}
