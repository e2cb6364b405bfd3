//! Discovery of unlabeled header cells and repair of stacked headers.

use crate::config::{AutoHeaderConfig, OTHER};
use crate::geometry::{mean_angle_between, BBox};
use crate::layout::{deskewed_y, Node, NodeArena, NodeChanges, NodeGroup};
use crate::matching::{AlignPolicy, MultiRowMatch};
use crate::table::header::{BoundHeader, HeaderSelection};
use lazy_static::lazy_static;
use regex::Regex;

/// Alignment tolerance with a known header, as a fraction of header height.
const KNOWN_ALIGN_RATIO: f32 = 0.3;

/// Longest alphanumeric text treated as noise.
const SHORT_TEXT: usize = 2;

lazy_static! {
    /// Runs of asterisks (masked or decorative text)
    static ref RE_STARS: Regex = Regex::new(r"\*{2,}").unwrap();
    /// Plain numbers and amounts
    static ref RE_NUMBER: Regex = Regex::new(r"^[\d\s.,:%()+-]+$").unwrap();
}

/// Find unlabeled header cells on the header line.
///
/// Candidates must agree with the header skew (measured to the leftmost or
/// rightmost member), lie within the header band, pass the content filters and
/// not duplicate a known header. Vertically stacked candidates form one
/// two-line cell.
pub fn discover(
    selection: &HeaderSelection,
    arena: &NodeArena,
    config: &AutoHeaderConfig,
    tolerance: f32,
) -> Vec<BoundHeader> {
    let (Some(first), Some(last)) = (selection.headers.first(), selection.headers.last()) else {
        return Vec::new();
    };
    let (left, right) = (first.bbox(), last.bbox());
    let angle = selection.angle;
    let avg_h = selection.avg_height();
    let (mut band_top, mut band_bottom) = (f32::INFINITY, f32::NEG_INFINITY);
    for header in &selection.headers {
        let b = header.bbox();
        let y = deskewed_y(&b, angle);
        band_top = band_top.min(y - b.height() / 2.0 - avg_h / 2.0);
        band_bottom = band_bottom.max(y + b.height() / 2.0 + avg_h / 2.0);
    }

    let mut candidates: Vec<Node> = arena
        .iter()
        .filter(|n| !selection.covers(n))
        .filter(|n| {
            let y = deskewed_y(&n.bbox, angle);
            y >= band_top && y <= band_bottom
        })
        .filter(|n| {
            (mean_angle_between(&left, &n.bbox) - angle).abs() < tolerance
                || (mean_angle_between(&right, &n.bbox) - angle).abs() < tolerance
        })
        .filter(|n| plausible_header_text(n.text(), config))
        .cloned()
        .collect();
    candidates.sort_by(|a, b| a.bbox.left.total_cmp(&b.bbox.left));

    let cells = stack_candidates(candidates);
    let known: Vec<BBox> = selection.headers.iter().map(|h| h.bbox()).collect();
    let mut out: Vec<BoundHeader> = Vec::new();
    for cell in cells {
        let bbox = cell.bbox();
        if known.iter().any(|k| duplicates_known(&bbox, k, avg_h)) {
            log::trace!("auto header '{}' duplicates a known header", cell.content());
            continue;
        }
        let mut name = cell.content();
        let taken = |n: &str| {
            selection.headers.iter().any(|h| h.name == n) || out.iter().any(|h| h.name == n)
        };
        if taken(&name) {
            let mut k = 2;
            while taken(&format!("{}_{}", name, k)) {
                k += 1;
            }
            name = format!("{}_{}", name, k);
        }
        log::debug!("auto header '{}'", name);
        out.push(BoundHeader {
            name,
            header_type: OTHER.to_string(),
            prime_key: false,
            matched: MultiRowMatch {
                lines: cell.lines,
                distance: 0,
                changes: NodeChanges::new(),
                split: false,
            },
            auto: true,
        });
    }
    out
}

/// Content heuristics for an unlabeled header cell.
pub fn plausible_header_text(text: &str, config: &AutoHeaderConfig) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || RE_STARS.is_match(trimmed) || RE_NUMBER.is_match(trimmed) {
        return false;
    }
    if trimmed.chars().count() <= SHORT_TEXT && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return config.unit_labels.iter().any(|u| u == trimmed);
    }
    !config.amount_patterns.iter().any(|p| p.is_match(trimmed))
}

/// A candidate cell, one group per physical line.
struct Cell {
    lines: Vec<NodeGroup>,
}

impl Cell {
    fn bbox(&self) -> BBox {
        let boxes: Vec<BBox> = self.lines.iter().map(|l| l.bbox()).collect();
        BBox::merge_all(&boxes).unwrap_or_default()
    }

    fn content(&self) -> String {
        self.lines.iter().map(|l| l.content()).collect()
    }
}

/// Merge vertically stacked, aligned candidates into two-line cells.
fn stack_candidates(candidates: Vec<Node>) -> Vec<Cell> {
    let policy = AlignPolicy::default();
    let mut used = vec![false; candidates.len()];
    let mut cells = Vec::new();
    for i in 0..candidates.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut lines = vec![NodeGroup::from_nodes([candidates[i].clone()])];
        for j in (i + 1)..candidates.len() {
            if used[j] {
                continue;
            }
            let (a, b) = (&candidates[i].bbox, &candidates[j].bbox);
            if policy.accepts(a, b) {
                lines.push(NodeGroup::from_nodes([candidates[j].clone()]));
                used[j] = true;
                break;
            }
            if policy.accepts(b, a) {
                lines.insert(0, NodeGroup::from_nodes([candidates[j].clone()]));
                used[j] = true;
                break;
            }
        }
        cells.push(Cell { lines });
    }
    cells
}

/// True when a candidate shares a known header's line and column.
fn duplicates_known(candidate: &BBox, known: &BBox, avg_h: f32) -> bool {
    if candidate.v_overlap(known) <= 0.0 {
        return false;
    }
    let tol = KNOWN_ALIGN_RATIO * avg_h;
    (candidate.left - known.left).abs() < tol
        || (candidate.right - known.right).abs() < tol
        || (candidate.cx() - known.cx()).abs() < tol
}

/// Fold catch-all headers stacked directly above or below another header into
/// it. The configured header keeps its identity; the upper lines come first.
pub fn merge_stacked(headers: Vec<BoundHeader>) -> Vec<BoundHeader> {
    let policy = AlignPolicy::default();
    let mut headers = headers;
    let mut i = 0;
    while i < headers.len() {
        let mut merged = false;
        for j in 0..headers.len() {
            if i == j || !(headers[i].is_other() || headers[j].is_other()) {
                continue;
            }
            let (a, b) = (headers[i].bbox(), headers[j].bbox());
            if !policy.accepts(&a, &b) {
                continue;
            }
            // headers[i] is upper, headers[j] lower
            let lower = headers[j].clone();
            let upper = headers[i].clone();
            let (mut keep, other, other_is_lower) = if upper.is_other() && !lower.is_other() {
                (lower, upper, false)
            } else {
                (upper, lower, true)
            };
            log::debug!("merging stacked headers '{}' and '{}'", keep.name, other.name);
            let mut lines = if other_is_lower {
                keep.matched.lines.clone()
            } else {
                other.matched.lines.clone()
            };
            lines.extend(if other_is_lower {
                other.matched.lines.clone()
            } else {
                keep.matched.lines.clone()
            });
            keep.matched.lines = lines;
            keep.matched.changes.absorb(&other.matched.changes);
            keep.matched.split |= other.matched.split;
            keep.matched.distance += other.matched.distance;

            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            headers.remove(hi);
            headers[lo] = keep;
            merged = true;
            break;
        }
        if !merged {
            i += 1;
        } else {
            i = 0;
        }
    }
    headers
}
