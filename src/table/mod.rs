//! Table reconstruction.
//!
//! [`TableExtractor`] runs the page pipeline:
//!
//! 1. header search and selection ([`header`])
//! 2. optional unlabeled header discovery and stacked-header repair ([`auto_header`])
//! 3. row grouping under the header skew ([`row`])
//! 4. column bands and assignment ([`field`])
//! 5. key-row detection ([`key_row`])
//! 6. row-to-record assignment and blocks ([`record`])
//!
//! A page without a usable header or key row yields
//! [`PageOutcome::Skipped`], never a partial table.

pub mod auto_header;
pub mod field;
pub mod header;
pub mod key_row;
pub mod record;
pub mod row;

pub use field::Field;
pub use header::{BoundHeader, HeaderDetector, HeaderSelection};
pub use key_row::{ContentType, TableGrid};
pub use record::{Block, Record};

use crate::config::TableConfig;
use crate::geometry::BBox;
use crate::layout::clustering::MIN_SKEW_CHARS;
use crate::layout::{deskewed_y, estimate_skew_from_rotated, Node, NodeArena, NodeGroup};
use serde::Serialize;
use std::collections::HashSet;

/// Why a page produced no table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No header combination with a prime key and two collinear members
    HeaderNotFound,
    /// No fragment below the header
    NoRows,
    /// No row satisfied the key-row rules
    NoKeyRows,
    /// Every record was trimmed away
    NoRecords,
}

/// One header cell of the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderItem {
    pub name: String,
    pub header_type: String,
    pub text: String,
    pub bbox: BBox,
    pub auto: bool,
}

/// Summary of the selected header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderSummary {
    pub items: Vec<HeaderItem>,
    pub bbox: BBox,
    pub score: i64,
}

impl HeaderSummary {
    fn from_selection(selection: &HeaderSelection) -> Self {
        Self {
            items: selection
                .headers
                .iter()
                .map(|h| HeaderItem {
                    name: h.name.clone(),
                    header_type: h.header_type.clone(),
                    text: h.content(),
                    bbox: h.bbox(),
                    auto: h.auto,
                })
                .collect(),
            bbox: selection.bbox(),
            score: selection.score(),
        }
    }
}

/// A reconstructed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableResult {
    pub header: HeaderSummary,
    /// Page skew in degrees
    pub angle: f32,
    pub records: Vec<Record>,
}

/// Result of running the table pipeline on one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Table(TableResult),
    Skipped(SkipReason),
}

impl PageOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PageOutcome::Table(_))
    }

    pub fn table(&self) -> Option<&TableResult> {
        match self {
            PageOutcome::Table(t) => Some(t),
            PageOutcome::Skipped(_) => None,
        }
    }
}

/// Table pipeline bound to one class configuration.
pub struct TableExtractor<'a> {
    config: &'a TableConfig,
}

impl<'a> TableExtractor<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline on a page. The arena is not modified.
    pub fn extract(&self, arena: &NodeArena) -> PageOutcome {
        let detector = HeaderDetector::new(self.config);
        let Some(mut selection) = detector.detect(arena) else {
            log::debug!("page skipped: header not found");
            return PageOutcome::Skipped(SkipReason::HeaderNotFound);
        };

        if self.config.auto_header.enabled {
            let found = auto_header::discover(
                &selection,
                arena,
                &self.config.auto_header,
                self.config.search.pair_angle_tolerance,
            );
            let mut headers = selection.headers.clone();
            headers.extend(found);
            selection.set_headers(auto_header::merge_stacked(headers));
        } else {
            selection.set_headers(auto_header::merge_stacked(selection.headers.clone()));
        }

        let nodes: Vec<Node> = arena.to_vec();
        let angle = estimate_skew_from_rotated(&nodes, MIN_SKEW_CHARS).unwrap_or(selection.angle);
        let body = self.body_nodes(&selection, arena, angle);
        if body.is_empty() {
            log::debug!("page skipped: nothing below the header");
            return PageOutcome::Skipped(SkipReason::NoRows);
        }

        let mut rows = row::assign_rows(&body, angle);
        if self.config.options.merge_pin_rows {
            rows = row::merge_pin_rows(rows, angle);
        }
        rows.retain(|r| {
            let text = r.content_with(" ");
            let excluded = self.config.filters.row_exclude.iter().any(|p| p.is_match(&text));
            if excluded {
                log::trace!("row '{}' excluded", text);
            }
            !excluded
        });
        if rows.is_empty() {
            return PageOutcome::Skipped(SkipReason::NoRows);
        }
        for (order, r) in rows.iter_mut().enumerate() {
            *r = NodeGroup::from_nodes(r.nodes().iter().cloned().map(|mut n| {
                n.row_order = Some(order);
                n
            }));
        }

        let row_nodes: Vec<Node> = rows.iter().flat_map(|r| r.nodes().iter().cloned()).collect();
        let mut fields = field::build_fields(&selection.headers, angle);
        field::assign(&mut fields, &row_nodes, angle, self.config.options.assign_by);
        let moved = field::recheck(&mut fields, angle, self.config.options.recheck_min_aligned);
        if moved > 0 {
            log::debug!("column re-check moved {} fragment(s)", moved);
        }

        let grid = TableGrid::new(&rows, &fields);
        let keys = if self.config.key_rows.common.is_empty() {
            self.default_key_rows(&grid)
        } else {
            key_row::detect(&self.config.key_rows, &grid)
        };
        if keys.is_empty() {
            log::debug!("page skipped: no key rows");
            return PageOutcome::Skipped(SkipReason::NoKeyRows);
        }

        let iou_thresh = self.config.options.row_iou_thresh;
        let mut groups = record::assign_records(&rows, &keys, angle, iou_thresh);
        record::trim_total(&mut groups, &rows, &self.config.filters.total_patterns);
        record::trim_tail_gap(&mut groups, &rows, angle, self.config.options.tail_gap_ratio);

        let excluded: HashSet<String> =
            self.config.filters.column_exclude.iter().cloned().collect();
        let records = record::build_records(&groups, &rows, &fields, &excluded);
        if records.is_empty() {
            return PageOutcome::Skipped(SkipReason::NoRecords);
        }
        log::debug!("{} record(s) over {} row(s)", records.len(), rows.len());

        PageOutcome::Table(TableResult {
            header: HeaderSummary::from_selection(&selection),
            angle,
            records,
        })
    }

    /// Fragments of the table body: the working set after the header's merges
    /// and splits, without header fragments, leftover pieces and anything at or
    /// above the header line.
    fn body_nodes(&self, selection: &HeaderSelection, arena: &NodeArena, angle: f32) -> Vec<Node> {
        let working = selection.apply_to(arena);
        let cut: HashSet<_> = selection.changes().cut_nodes().map(|n| n.uid.clone()).collect();
        let header_bottom = selection
            .headers
            .iter()
            .map(|h| {
                let b = h.bbox();
                deskewed_y(&b, angle) + b.height() / 2.0
            })
            .fold(f32::NEG_INFINITY, f32::max);
        working
            .iter()
            .filter(|n| !cut.contains(&n.uid) && !selection.covers(n))
            .filter(|n| deskewed_y(&n.bbox, angle) > header_bottom)
            .cloned()
            .collect()
    }

    /// Without configured rules every row with prime-key content is a key row.
    fn default_key_rows(&self, grid: &TableGrid) -> std::collections::BTreeSet<usize> {
        let prime_columns: Vec<usize> = grid
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| self.config.is_prime_type(&c.header_type))
            .map(|(i, _)| i)
            .collect();
        (0..grid.row_count())
            .filter(|&r| prime_columns.iter().any(|&c| !grid.cell(r, c).trim().is_empty()))
            .collect()
    }
}
