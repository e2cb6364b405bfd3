//! Row, line and paragraph grouping of OCR fragments.
//!
//! All groupers are greedy single-pass scans: each node joins a compatible
//! group or opens a new one. They are heuristics, not global optimizers; a node
//! that fits several open groups joins the first one in creation order.
//!
//! - [`find_row_lines`]: axis-aligned rows, closing groups the scan has passed
//! - [`find_lines_with_angle`]: rows under a known skew, best angular fit
//! - [`find_lines_adaptive`]: rows under a known skew, predicted offset fit
//! - [`find_paragraphs`]: left-aligned vertical runs

use crate::geometry::{angle_between, median, variance, BBox, YRef};
use crate::layout::group::NodeGroup;
use crate::layout::node::Node;

/// Default vertical tolerance for row grouping, as a fraction of group height.
pub const ROW_RATIO: f32 = 0.5;

/// Minimum character count for a fragment's own rotation to count toward skew.
pub const MIN_SKEW_CHARS: usize = 5;

/// Skews smaller than this are treated as axis-aligned.
pub const FLAT_ANGLE: f32 = 0.5;

fn sorted_top_down(nodes: &[Node]) -> Vec<&Node> {
    let mut order: Vec<&Node> = nodes.iter().collect();
    order.sort_by(|a, b| {
        a.bbox
            .top
            .total_cmp(&b.bbox.top)
            .then(a.bbox.left.total_cmp(&b.bbox.left))
    });
    order
}

fn sorted_left_right(nodes: &[Node]) -> Vec<&Node> {
    let mut order: Vec<&Node> = nodes.iter().collect();
    order.sort_by(|a, b| {
        a.bbox
            .left
            .total_cmp(&b.bbox.left)
            .then(a.bbox.top.total_cmp(&b.bbox.top))
    });
    order
}

/// Group nodes into axis-aligned rows.
///
/// Nodes are scanned top to bottom. A node joins the first open group whose
/// vertical center is within `ratio` × the group's average height of its own
/// center. A group closes once the scan reaches a node whose top lies more than
/// one average height below the group's bottom.
///
/// Groups are returned in creation order (top to bottom); members keep scan
/// order, so callers wanting reading order should sort each group by x.
///
/// # Examples
///
/// ```
/// use table_oxide::geometry::BBox;
/// use table_oxide::layout::{clustering::find_row_lines, Node};
///
/// let nodes = vec![
///     Node::new("a", "Qty", BBox::new(10.0, 100.0, 40.0, 120.0)),
///     Node::new("b", "Price", BBox::new(50.0, 101.0, 90.0, 121.0)),
///     Node::new("c", "3", BBox::new(10.0, 200.0, 20.0, 220.0)),
/// ];
/// let rows = find_row_lines(&nodes, 0.5);
/// assert_eq!(rows.len(), 2);
/// ```
pub fn find_row_lines(nodes: &[Node], ratio: f32) -> Vec<NodeGroup> {
    let mut groups: Vec<NodeGroup> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for node in sorted_top_down(nodes) {
        open.retain(|&g| {
            let group = &groups[g];
            node.bbox.top <= group.bbox().bottom + group.avg_height()
        });

        let hit = open.iter().copied().find(|&g| {
            let group = &groups[g];
            (node.bbox.cy() - group.bbox().cy()).abs() < ratio * group.avg_height()
        });

        match hit {
            Some(g) => groups[g].append(node.clone()),
            None => {
                groups.push(NodeGroup::from_nodes([node.clone()]));
                open.push(groups.len() - 1);
            },
        }
    }

    groups
}

/// Group nodes into rows under a known skew `angle`, accepting a node into the
/// group where the angle to its nearest horizontally separated member deviates
/// least from `angle`, provided the deviation is below `thresh` degrees.
///
/// Because skew makes "already passed" ambiguous, no group is ever closed:
/// every node is scored against every group.
pub fn find_lines_with_angle(nodes: &[Node], angle: f32, thresh: f32) -> Vec<NodeGroup> {
    let mut groups: Vec<NodeGroup> = Vec::new();

    for node in sorted_left_right(nodes) {
        let mut best: Option<(usize, f32)> = None;
        for (gi, group) in groups.iter().enumerate() {
            let nearest = group
                .nodes()
                .iter()
                .filter(|m| m.bbox.h_overlap(&node.bbox) <= 0.0)
                .min_by(|a, b| {
                    let da = (a.bbox.cx() - node.bbox.cx()).abs();
                    let db = (b.bbox.cx() - node.bbox.cx()).abs();
                    da.total_cmp(&db)
                });
            let Some(member) = nearest else {
                continue;
            };
            let deviation = (angle_between(&member.bbox, &node.bbox, YRef::Center) - angle).abs();
            if deviation < thresh && best.map_or(true, |(_, d)| deviation < d) {
                best = Some((gi, deviation));
            }
        }

        match best {
            Some((g, _)) => groups[g].append(node.clone()),
            None => groups.push(NodeGroup::from_nodes([node.clone()])),
        }
    }

    sort_groups_top_down(&mut groups, angle);
    groups
}

/// Group nodes into rows under a known skew by predicting where each node
/// should sit relative to its horizontally nearest member of a group.
///
/// The expected vertical offset is `tan(angle) × dx`. A node is accepted when
/// the smallest of its center/top/bottom deviations from the prediction is
/// below half the local row height; the group with the smallest deviation wins.
pub fn find_lines_adaptive(nodes: &[Node], angle: f32) -> Vec<NodeGroup> {
    let slope = angle.to_radians().tan();
    let mut groups: Vec<NodeGroup> = Vec::new();

    for node in sorted_left_right(nodes) {
        let mut best: Option<(usize, f32)> = None;
        for (gi, group) in groups.iter().enumerate() {
            let reference = group.nodes().iter().min_by(|a, b| {
                let da = (a.bbox.cx() - node.bbox.cx()).abs();
                let db = (b.bbox.cx() - node.bbox.cx()).abs();
                da.total_cmp(&db)
            });
            let Some(reference) = reference else {
                continue;
            };
            let dy = slope * (node.bbox.cx() - reference.bbox.cx());
            let deviation = YRef::ALL
                .iter()
                .map(|y| (node.bbox.y_at(*y) - (reference.bbox.y_at(*y) + dy)).abs())
                .fold(f32::INFINITY, f32::min);
            let local_height = (node.bbox.height() + reference.bbox.height()) / 2.0;
            if deviation < 0.5 * local_height && best.map_or(true, |(_, d)| deviation < d) {
                best = Some((gi, deviation));
            }
        }

        match best {
            Some((g, _)) => groups[g].append(node.clone()),
            None => groups.push(NodeGroup::from_nodes([node.clone()])),
        }
    }

    sort_groups_top_down(&mut groups, angle);
    groups
}

/// Row grouping that picks the axis-aligned or the skew-aware variant.
pub fn find_lines(nodes: &[Node], angle: f32) -> Vec<NodeGroup> {
    if angle.abs() < FLAT_ANGLE {
        let mut rows = find_row_lines(nodes, ROW_RATIO);
        sort_groups_top_down(&mut rows, 0.0);
        rows
    } else {
        find_lines_adaptive(nodes, angle)
    }
}

/// Group nodes into left-aligned paragraphs.
///
/// Scanning top to bottom, a node joins the first open group whose left edge
/// is within one average height of its own and whose bottom is less than one
/// average height above it. A gap of at least one average height closes a
/// group.
pub fn find_paragraphs(nodes: &[Node]) -> Vec<NodeGroup> {
    let mut groups: Vec<NodeGroup> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for node in sorted_top_down(nodes) {
        open.retain(|&g| {
            let group = &groups[g];
            node.bbox.top - group.bbox().bottom < group.avg_height()
        });

        let hit = open.iter().copied().find(|&g| {
            let group = &groups[g];
            let b = group.bbox();
            (node.bbox.left - b.left).abs() < group.avg_height() && node.bbox.top >= b.top
        });

        match hit {
            Some(g) => groups[g].append(node.clone()),
            None => {
                groups.push(NodeGroup::from_nodes([node.clone()]));
                open.push(groups.len() - 1);
            },
        }
    }

    groups
}

/// Vertical position of a box after removing the skew, measured at x = 0.
pub fn deskewed_y(bbox: &BBox, angle: f32) -> f32 {
    bbox.cy() - angle.to_radians().tan() * bbox.cx()
}

/// Horizontal position of a box after removing the skew, measured at y = 0.
pub fn deskewed_x(bbox: &BBox, angle: f32) -> f32 {
    bbox.cx() + angle.to_radians().tan() * bbox.cy()
}

/// Order groups top to bottom by their mean deskewed center.
pub fn sort_groups_top_down(groups: &mut [NodeGroup], angle: f32) {
    let key = |g: &NodeGroup| -> f32 {
        if g.is_empty() {
            return 0.0;
        }
        g.nodes()
            .iter()
            .map(|n| deskewed_y(&n.bbox, angle))
            .sum::<f32>()
            / g.len() as f32
    };
    groups.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

/// Estimate the skew of a line of boxes (typically header pieces).
///
/// Pairwise angles are computed for bottom and top alignment; the median of
/// the bottom angles is used unless the top angles have strictly lower
/// variance.
pub fn estimate_angle_from_boxes(boxes: &[BBox]) -> Option<f32> {
    if boxes.len() < 2 {
        return None;
    }
    let pairwise = |yref: YRef| -> Vec<f32> {
        let mut out = Vec::new();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                out.push(angle_between(&boxes[i], &boxes[j], yref));
            }
        }
        out
    };
    let bottom = pairwise(YRef::Bottom);
    let top = pairwise(YRef::Top);
    if variance(&top) < variance(&bottom) {
        median(&top)
    } else {
        median(&bottom)
    }
}

/// Median skew over fragments carrying rotation data and at least `min_chars`
/// characters.
pub fn estimate_skew_from_rotated(nodes: &[Node], min_chars: usize) -> Option<f32> {
    let angles: Vec<f32> = nodes
        .iter()
        .filter(|n| n.char_count() >= min_chars)
        .filter_map(|n| n.angle())
        .collect();
    median(&angles)
}
