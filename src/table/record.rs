//! Row-to-record assignment and block construction.

use crate::config::Pattern;
use crate::geometry::{interval_iou, BBox};
use crate::layout::{NodeGroup, NodeId};
use crate::table::field::Field;
use crate::table::row::row_band;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// All fragments of one (record, column) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Column name
    pub column: String,
    pub header_type: String,
    /// Record index
    pub record: usize,
    /// One text line per table row, top to bottom
    pub lines: Vec<String>,
    /// Lines joined with newlines
    pub text: String,
    pub bbox: BBox,
    pub node_ids: Vec<NodeId>,
    /// One confidence per character of `text`; separators score 1.0
    pub scores: Vec<f32>,
}

/// One table record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Row order of the key row
    pub key_row: usize,
    /// Row orders belonging to the record, ascending
    pub rows: Vec<usize>,
    /// Column name → block
    pub blocks: IndexMap<String, Block>,
}

/// Attach every row to a key row.
///
/// Rows are scanned top to bottom. A non-key row joins the most recent key row
/// unless its vertical IoU with the next key row exceeds `iou_thresh`; once a
/// row has joined the next key row, the rows after it up to that key row join
/// it too. Rows that would join the virtual key row above the first real one
/// are discarded. Returns one ascending list of row indices per key row.
pub fn assign_records(
    rows: &[NodeGroup],
    keys: &BTreeSet<usize>,
    angle: f32,
    iou_thresh: f32,
) -> Vec<Vec<usize>> {
    let keys: Vec<usize> = keys.iter().copied().filter(|&k| k < rows.len()).collect();
    let mut groups: Vec<Vec<usize>> = keys.iter().map(|&k| vec![k]).collect();
    let bands: Vec<(f32, f32)> = rows.iter().map(|r| row_band(r, angle)).collect();

    // index into `keys` of the most recent key row; None is the leading sentinel
    let mut current: Option<usize> = None;
    let mut jumped: Option<usize> = None;
    for r in 0..rows.len() {
        if let Ok(k) = keys.binary_search(&r) {
            current = Some(k);
            jumped = None;
            continue;
        }
        let next = match current {
            Some(k) if k + 1 < keys.len() => Some(k + 1),
            Some(_) => None,
            None if !keys.is_empty() => Some(0),
            None => None,
        };
        let mut target = current;
        if let Some(n) = next {
            let (top, bottom) = bands[r];
            let (ktop, kbottom) = bands[keys[n]];
            if jumped == Some(n) || interval_iou(top, bottom, ktop, kbottom) > iou_thresh {
                target = Some(n);
                jumped = Some(n);
            }
        }
        match target {
            Some(k) => groups[k].push(r),
            None => log::trace!("row {} above the first key row discarded", r),
        }
    }
    for g in &mut groups {
        g.sort_unstable();
    }
    groups
}

/// Cut the last record at its first total line; drop it when nothing is left.
pub fn trim_total(groups: &mut Vec<Vec<usize>>, rows: &[NodeGroup], patterns: &[Pattern]) {
    let Some(last) = groups.last_mut() else {
        return;
    };
    let hit = last.iter().position(|&r| {
        let text = rows[r].content_with(" ");
        patterns.iter().any(|p| p.is_match(&text))
    });
    if let Some(pos) = hit {
        log::debug!("total line at row {}, trimming {} row(s)", last[pos], last.len() - pos);
        last.truncate(pos);
        if last.is_empty() {
            groups.pop();
        }
    }
}

/// Drop trailing rows of the last record that sit more than `ratio` mean row
/// heights below the previous row.
pub fn trim_tail_gap(groups: &mut [Vec<usize>], rows: &[NodeGroup], angle: f32, ratio: f32) {
    if rows.is_empty() {
        return;
    }
    let bands: Vec<(f32, f32)> = rows.iter().map(|r| row_band(r, angle)).collect();
    let mean_h = bands.iter().map(|(t, b)| b - t).sum::<f32>() / bands.len() as f32;
    let Some(last) = groups.last_mut() else {
        return;
    };
    for i in 1..last.len() {
        let gap = bands[last[i]].0 - bands[last[i - 1]].1;
        if gap > ratio * mean_h {
            log::debug!("tail gap {:.1} before row {}, trimming", gap, last[i]);
            last.truncate(i);
            break;
        }
    }
}

/// Build the blocks of every record.
pub fn build_records(
    groups: &[Vec<usize>],
    rows: &[NodeGroup],
    fields: &[Field],
    excluded: &HashSet<String>,
) -> Vec<Record> {
    groups
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.is_empty())
        .map(|(idx, group)| {
            let mut blocks = IndexMap::new();
            for field in fields {
                if excluded.contains(&field.header.header_type) {
                    continue;
                }
                if let Some(block) = build_block(idx, group, rows, field) {
                    blocks.insert(field.header.name.clone(), block);
                }
            }
            Record {
                key_row: group[0],
                rows: group.clone(),
                blocks,
            }
        })
        .collect()
}

fn needs_space(prev: Option<char>, next: Option<char>) -> bool {
    matches!(
        (prev, next),
        (Some(a), Some(b)) if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric()
    )
}

fn build_block(record: usize, group: &[usize], rows: &[NodeGroup], field: &Field) -> Option<Block> {
    let owned: HashSet<&NodeId> = field.nodes.iter().map(|n| &n.uid).collect();
    let mut lines = Vec::new();
    let mut text = String::new();
    let mut scores = Vec::new();
    let mut node_ids = Vec::new();
    let mut boxes = Vec::new();

    for &r in group {
        let members: Vec<_> = rows[r].nodes().iter().filter(|n| owned.contains(&n.uid)).collect();
        if members.is_empty() {
            continue;
        }
        if !lines.is_empty() {
            text.push('\n');
            scores.push(1.0);
        }
        let mut line = String::new();
        for node in members {
            if needs_space(line.chars().last(), node.text().chars().next()) {
                line.push(' ');
                scores.push(1.0);
            }
            line.push_str(node.text());
            scores.extend_from_slice(node.scores());
            node_ids.push(node.uid.clone());
            boxes.push(node.bbox);
        }
        text.push_str(&line);
        lines.push(line);
    }

    let bbox = BBox::merge_all(&boxes)?;
    Some(Block {
        column: field.header.name.clone(),
        header_type: field.header.header_type.clone(),
        record,
        lines,
        text,
        bbox,
        node_ids,
        scores,
    })
}
