//! Anchor-label key/value extraction.
//!
//! Each configured field names a label; the value is the content glued to the
//! label (an h_split leftover) or the fragments next to it, optionally
//! narrowed by a regular expression.

use crate::config::{KeyValueDef, TableConfig};
use crate::geometry::BBox;
use crate::layout::{Node, NodeArena};
use crate::matching::MultiRowMatch;
use serde::{Deserialize, Serialize};

/// Where the value sits relative to its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Right,
    Below,
    RightOrBelow,
}

/// One extracted field with per-character confidences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureItem {
    pub field: String,
    pub text: String,
    pub scores: Vec<f32>,
    pub bbox: BBox,
}

impl StructureItem {
    /// Replace the text, keeping scores in step: unchanged length keeps them,
    /// otherwise every character gets the previous mean.
    pub fn set_text(&mut self, text: String) {
        let n = text.chars().count();
        if n != self.scores.len() {
            let mean = if self.scores.is_empty() {
                1.0
            } else {
                self.scores.iter().sum::<f32>() / self.scores.len() as f32
            };
            self.scores = vec![mean; n];
        }
        self.text = text;
    }
}

/// Largest overlap (in label heights) between label and a right-hand value.
const RIGHT_OVERLAP_RATIO: f32 = 0.5;

/// Key/value extraction for one class configuration.
pub struct KvExtractor<'a> {
    config: &'a TableConfig,
}

impl<'a> KvExtractor<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self { config }
    }

    /// Extract every configured field found on the page.
    pub fn extract(&self, arena: &NodeArena) -> Vec<StructureItem> {
        self.config
            .key_values
            .iter()
            .filter_map(|def| {
                let item = self.extract_field(def, arena);
                if item.is_none() {
                    log::debug!("field '{}' not found", def.field);
                }
                item
            })
            .collect()
    }

    /// Extract one field.
    pub fn extract_field(&self, def: &KeyValueDef, arena: &NodeArena) -> Option<StructureItem> {
        let limits = self.config.search.match_limits();
        let label = def
            .label()
            .find(arena, &limits)
            .into_iter()
            .min_by(|a, b| {
                let (ba, bb) = (a.bbox(), b.bbox());
                a.distance
                    .cmp(&b.distance)
                    .then(ba.top.total_cmp(&bb.top))
                    .then(ba.left.total_cmp(&bb.left))
            })?;

        let mut value: Vec<Node> = label.changes.cut_nodes().cloned().collect();
        if value.is_empty() {
            value = match def.direction {
                Direction::Right => right_of(&label, arena, def.max_gap_ratio),
                Direction::Below => below(&label, arena),
                Direction::RightOrBelow => {
                    let right = right_of(&label, arena, def.max_gap_ratio);
                    if right.is_empty() {
                        below(&label, arena)
                    } else {
                        right
                    }
                },
            };
        }
        value.sort_by(|a, b| a.bbox.left.total_cmp(&b.bbox.left));

        let (text, scores) = join_nodes(&value);
        let (text, scores) = match &def.value_regex {
            Some(pattern) => {
                let m = pattern.find(&text)?;
                let start = text[..m.start()].chars().count();
                let len = m.as_str().chars().count();
                (m.as_str().to_string(), scores[start..start + len].to_vec())
            },
            None => (text, scores),
        };
        if text.trim().is_empty() {
            return None;
        }
        let boxes: Vec<BBox> = value.iter().map(|n| n.bbox).collect();
        Some(StructureItem {
            field: def.field.clone(),
            text,
            scores,
            bbox: BBox::merge_all(&boxes)?,
        })
    }
}

fn is_label_node(label: &MultiRowMatch, node: &Node) -> bool {
    label
        .nodes()
        .any(|m| m.uid == node.uid || m.bbox.ioo(&node.bbox) > 0.8 || node.bbox.ioo(&m.bbox) > 0.8)
}

/// Same-line fragments right of the label within the gap limit.
fn right_of(label: &MultiRowMatch, arena: &NodeArena, max_gap_ratio: f32) -> Vec<Node> {
    let lb = label.bbox();
    let h = label.avg_height();
    arena
        .iter()
        .filter(|n| !is_label_node(label, n))
        .filter(|n| n.bbox.cy() >= lb.top && n.bbox.cy() <= lb.bottom)
        .filter(|n| {
            let gap = n.bbox.left - lb.right;
            gap >= -RIGHT_OVERLAP_RATIO * h && gap <= max_gap_ratio * h
        })
        .cloned()
        .collect()
}

/// The nearest fragment below the label that overlaps it horizontally.
fn below(label: &MultiRowMatch, arena: &NodeArena) -> Vec<Node> {
    let lb = label.bbox();
    arena
        .iter()
        .filter(|n| !is_label_node(label, n))
        .filter(|n| n.bbox.top >= lb.bottom - lb.height() * 0.25 && n.bbox.h_overlap(&lb) > 0.0)
        .min_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top))
        .cloned()
        .into_iter()
        .collect()
}

/// Join fragment texts, separating ASCII words with a space; separators score 1.0.
fn join_nodes(nodes: &[Node]) -> (String, Vec<f32>) {
    let mut text = String::new();
    let mut scores = Vec::new();
    for node in nodes {
        let prev = text.chars().last();
        let next = node.text().chars().next();
        let both_alnum = matches!(
            (prev, next),
            (Some(a), Some(b)) if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric()
        );
        if both_alnum {
            text.push(' ');
            scores.push(1.0);
        }
        text.push_str(node.text());
        scores.extend_from_slice(node.scores());
    }
    (text, scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Label, LabelSpec, Pattern};
    use crate::matching::{AlignPolicy, MatchMode};

    fn mock_node(id: &str, text: &str, x: f32, y: f32) -> Node {
        let w = 20.0 * text.chars().count() as f32;
        Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
    }

    fn mock_def(field: &str, label: Label, direction: Direction) -> KeyValueDef {
        KeyValueDef {
            field: field.into(),
            labels: vec![vec![vec![label]]],
            alignment: AlignPolicy::default(),
            direction,
            value_regex: None,
            max_gap_ratio: 15.0,
        }
    }

    #[test]
    fn test_value_right_of_label() {
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "Invoice No", 0.0, 0.0),
            mock_node("2", "INV-001", 240.0, 2.0),
            mock_node("3", "Date", 0.0, 40.0),
        ]);
        let config = TableConfig {
            key_values: vec![mock_def(
                "invoice_no",
                Label::Text("Invoice No".into()),
                Direction::Right,
            )],
            ..Default::default()
        };
        let items = KvExtractor::new(&config).extract(&arena);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "INV-001");
        assert_eq!(items[0].scores.len(), 7);
    }

    #[test]
    fn test_value_from_split_rest() {
        let arena = NodeArena::from_nodes(vec![mock_node("1", "日期2024-01-05", 0.0, 0.0)]);
        let label = Label::Spec(LabelSpec {
            text: "日期".into(),
            mode: MatchMode::HSplit,
            ed_thresh: -1,
            max_interval: 1,
            strip_symbols: true,
            strip_spaces: true,
            preprocess: None,
        });
        let mut def = mock_def("date", label, Direction::Right);
        def.value_regex = Some(Pattern::new(r"\d{4}-\d{2}-\d{2}").unwrap());
        let config = TableConfig {
            key_values: vec![def],
            ..Default::default()
        };
        let items = KvExtractor::new(&config).extract(&arena);
        assert_eq!(items[0].text, "2024-01-05");
    }

    #[test]
    fn test_value_below_and_regex_miss() {
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "Consignee", 0.0, 0.0),
            mock_node("2", "ACME Ltd", 10.0, 25.0),
            mock_node("3", "Far away", 10.0, 300.0),
        ]);
        let mut def = mock_def("consignee", Label::Text("Consignee".into()), Direction::Below);
        let config = TableConfig {
            key_values: vec![def.clone()],
            ..Default::default()
        };
        assert_eq!(KvExtractor::new(&config).extract(&arena)[0].text, "ACME Ltd");

        def.value_regex = Some(Pattern::new(r"^\d+$").unwrap());
        let config = TableConfig {
            key_values: vec![def],
            ..Default::default()
        };
        assert!(KvExtractor::new(&config).extract(&arena).is_empty());
    }
}
