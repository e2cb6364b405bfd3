//! Row assignment below the header.

use crate::layout::{deskewed_y, find_lines, sort_groups_top_down, Node, NodeGroup};

/// Largest gap between the facing edges of the outer rows of a "品" split,
/// as a fraction of their average height.
const PIN_TOUCH_RATIO: f32 = 0.3;

/// Group fragments into rows under the given skew, top to bottom, each row
/// sorted left to right.
pub fn assign_rows(nodes: &[Node], angle: f32) -> Vec<NodeGroup> {
    let mut rows = find_lines(nodes, angle);
    sort_groups_top_down(&mut rows, angle);
    rows.into_iter().map(|r| r.sorted_by_x()).collect()
}

/// Deskewed vertical extent `(top, bottom)` of a row.
pub fn row_band(row: &NodeGroup, angle: f32) -> (f32, f32) {
    row.nodes().iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(top, bottom), n| {
        let y = deskewed_y(&n.bbox, angle);
        let half = n.bbox.height() / 2.0;
        (top.min(y - half), bottom.max(y + half))
    })
}

fn row_center(row: &NodeGroup, angle: f32) -> f32 {
    let (top, bottom) = row_band(row, angle);
    (top + bottom) / 2.0
}

/// Merge "品"-shaped false splits: two nearly touching rows with a shorter row
/// whose center lies between them become one row.
pub fn merge_pin_rows(rows: Vec<NodeGroup>, angle: f32) -> Vec<NodeGroup> {
    let mut rows = rows;
    let mut i = 0;
    while i + 2 < rows.len() {
        let (a, b, c) = (&rows[i], &rows[i + 1], &rows[i + 2]);
        let (_, a_bottom) = row_band(a, angle);
        let (c_top, _) = row_band(c, angle);
        let avg_h = (a.avg_height() + c.avg_height()) / 2.0;
        let b_center = row_center(b, angle);
        let touching = c_top - a_bottom <= PIN_TOUCH_RATIO * avg_h;
        let between = b_center > row_center(a, angle) && b_center < row_center(c, angle);
        let short = b.len() < a.len().min(c.len());
        if touching && between && short {
            log::debug!("merging three-row split at row {}", i);
            let c = rows.remove(i + 2);
            let b = rows.remove(i + 1);
            let mut merged = std::mem::take(&mut rows[i]);
            merged.extend(b);
            merged.extend(c);
            rows[i] = merged.sorted_by_x();
        }
        i += 1;
    }
    rows
}
