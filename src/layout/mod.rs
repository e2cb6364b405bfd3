//! Fragment model and geometric grouping.
//!
//! This module provides the data model the table engine works on:
//! - [`Node`]: one OCR text fragment, splittable and mergeable
//! - [`NodeGroup`]: an ordered group of nodes with cached geometry
//! - [`NodeArena`]: the owning working set, changed only through [`NodeChanges`]
//! - [`clustering`]: row, skewed-line and paragraph grouping

pub mod arena;
pub mod clustering;
pub mod group;
pub mod node;

// Re-export main types
pub use arena::{NodeArena, NodeChanges};
pub use clustering::{
    deskewed_x, deskewed_y, estimate_angle_from_boxes, estimate_skew_from_rotated, find_lines,
    find_lines_adaptive, find_lines_with_angle, find_paragraphs, find_row_lines,
    sort_groups_top_down,
};
pub use group::NodeGroup;
pub use node::{display_width, Node, NodeId, SplitPieces};
