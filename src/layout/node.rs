//! OCR text fragments.
//!
//! A [`Node`] is one recognized text span with its geometry and one confidence
//! score per character. Text and scores are kept in lockstep: every mutation
//! that changes the character count resizes the score list.

use crate::geometry::{BBox, Point, RotatedBox};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_width::UnicodeWidthChar;

/// Stable identity of a node.
///
/// Input nodes keep the id they were given. Pieces produced by splitting are
/// named `"<parent>[start..end]"` and merged nodes `"<a>+<b>+..."`, so ids
/// are deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split_child(&self, start: usize, end: usize) -> NodeId {
        NodeId(format!("{}[{}..{}]", self.0, start, end))
    }

    fn merged<'a, I>(ids: I) -> NodeId
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        let joined: Vec<&str> = ids.into_iter().map(|id| id.as_str()).collect();
        NodeId(joined.join("+"))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

/// One recognized text fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity
    pub uid: NodeId,
    text: String,
    scores: Vec<f32>,
    /// Axis-aligned bounds
    pub bbox: BBox,
    /// Quadrilateral from rotated detection, when available
    pub rbox: Option<RotatedBox>,
    /// Opaque detector category, carried through untouched
    pub label: Option<String>,
    /// Top-to-bottom rank of the row this node was assigned to
    pub row_order: Option<usize>,
    /// Set on the trailing piece left over by a horizontal split
    pub is_cut: bool,
}

/// The up-to-three pieces produced by [`Node::split`].
#[derive(Debug, Clone)]
pub struct SplitPieces {
    /// Characters before the split range
    pub before: Option<Node>,
    /// Characters inside the split range
    pub inner: Node,
    /// Characters after the split range
    pub after: Option<Node>,
}

impl SplitPieces {
    /// Concatenated text of every piece, in order.
    pub fn text(&self) -> String {
        self.iter().map(|n| n.text()).collect()
    }

    /// Iterate the pieces left to right.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.before
            .iter()
            .chain(std::iter::once(&self.inner))
            .chain(self.after.iter())
    }

    /// Consume into a vector, left to right.
    pub fn into_vec(self) -> Vec<Node> {
        let mut out = Vec::with_capacity(3);
        out.extend(self.before);
        out.push(self.inner);
        out.extend(self.after);
        out
    }
}

impl Node {
    /// Create a node with full confidence on every character.
    pub fn new(uid: impl Into<NodeId>, text: impl Into<String>, bbox: BBox) -> Self {
        let text = text.into();
        let n = text.chars().count();
        Self {
            uid: uid.into(),
            text,
            scores: vec![1.0; n],
            bbox,
            rbox: None,
            label: None,
            row_order: None,
            is_cut: false,
        }
    }

    /// Replace the scores, resized to the character count.
    pub fn with_scores(mut self, scores: Vec<f32>) -> Self {
        self.scores = scores;
        self.resize_scores();
        self
    }

    /// Attach a rotated box.
    pub fn with_rotated_box(mut self, rbox: RotatedBox) -> Self {
        self.rbox = Some(rbox);
        self
    }

    /// Attach the detector label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The recognized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Per-character confidences.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Number of characters.
    pub fn char_count(&self) -> usize {
        self.scores.len()
    }

    /// True when the text is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replace the text; scores are truncated or padded with their mean.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.resize_scores();
    }

    /// Mean confidence, `0.0` for empty text.
    pub fn mean_score(&self) -> f32 {
        if self.scores.is_empty() {
            0.0
        } else {
            self.scores.iter().sum::<f32>() / self.scores.len() as f32
        }
    }

    /// Skew angle of the rotated box, if any.
    pub fn angle(&self) -> Option<f32> {
        self.rbox.map(|r| r.angle)
    }

    /// Average width of one display column of this node's text.
    pub fn char_width(&self) -> f32 {
        let w = display_width(&self.text);
        if w == 0 {
            self.bbox.width()
        } else {
            self.bbox.width() / w as f32
        }
    }

    fn resize_scores(&mut self) {
        let n = self.text.chars().count();
        if self.scores.len() != n {
            let fill = if self.scores.is_empty() {
                1.0
            } else {
                self.mean_score()
            };
            self.scores.resize(n, fill);
        }
    }

    /// Split over the half-open character range `[start, end)`.
    ///
    /// The box is partitioned horizontally in proportion to the display width
    /// of each piece (wide CJK characters count double). `self` is left
    /// untouched. Returns `None` for an empty or out-of-range span.
    pub fn split(&self, start: usize, end: usize) -> Option<SplitPieces> {
        let n = self.char_count();
        if start >= end || end > n {
            return None;
        }
        let chars: Vec<char> = self.text.chars().collect();
        let widths: Vec<usize> = chars.iter().map(|c| char_display_width(*c)).collect();
        let total: usize = widths.iter().sum();
        // (numerator, denominator) of the horizontal position of a char boundary
        let cut_at = |idx: usize| -> (f32, f32) {
            if total == 0 {
                (idx as f32, n as f32)
            } else {
                (widths[..idx].iter().sum::<usize>() as f32, total as f32)
            }
        };
        let width = self.bbox.width();
        let x_at = |idx: usize| -> f32 {
            let (num, den) = cut_at(idx);
            self.bbox.left + width * num / den
        };

        let piece = |s: usize, e: usize| -> Node {
            let bbox = BBox::new(x_at(s), self.bbox.top, x_at(e), self.bbox.bottom);
            let (n0, d0) = cut_at(s);
            let (n1, d1) = cut_at(e);
            let (f0, f1) = (n0 / d0, n1 / d1);
            let rbox = self.rbox.map(|r| slice_rotated(&r, f0, f1));
            Node {
                uid: self.uid.split_child(s, e),
                text: chars[s..e].iter().collect(),
                scores: self.scores[s..e].to_vec(),
                bbox,
                rbox,
                label: self.label.clone(),
                row_order: self.row_order,
                is_cut: false,
            }
        };

        Some(SplitPieces {
            before: (start > 0).then(|| piece(0, start)),
            inner: piece(start, end),
            after: (end < n).then(|| piece(end, n)),
        })
    }

    /// Merge nodes in the given order: text and scores are concatenated and
    /// the boxes unioned. Returns `None` for an empty slice.
    pub fn merge(nodes: &[&Node]) -> Option<Node> {
        let first = nodes.first()?;
        if nodes.len() == 1 {
            return Some((*first).clone());
        }
        let text: String = nodes.iter().map(|n| n.text.as_str()).collect();
        let scores: Vec<f32> = nodes.iter().flat_map(|n| n.scores.iter().copied()).collect();
        let bbox = BBox::merge_all(nodes.iter().map(|n| &n.bbox)).unwrap_or(first.bbox);
        Some(Node {
            uid: NodeId::merged(nodes.iter().map(|n| &n.uid)),
            text,
            scores,
            bbox,
            rbox: None,
            label: first.label.clone(),
            row_order: first.row_order,
            is_cut: nodes.iter().any(|n| n.is_cut),
        })
    }
}

/// Two nodes with identical text and geometry are interchangeable.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.bbox == other.bbox
    }
}

/// Display width of one character; zero-width characters count as zero.
pub fn char_display_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// Total display width of a string.
pub fn display_width(text: &str) -> usize {
    text.chars().map(char_display_width).sum()
}

fn lerp(a: Point, b: Point, t: f32) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

fn slice_rotated(r: &RotatedBox, f0: f32, f1: f32) -> RotatedBox {
    let [tl, tr, br, bl] = r.points;
    RotatedBox::new(
        [
            lerp(tl, tr, f0),
            lerp(tl, tr, f1),
            lerp(bl, br, f1),
            lerp(bl, br, f0),
        ],
        r.angle,
    )
}
