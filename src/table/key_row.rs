//! Key-row detection: which rows start a record.
//!
//! Rules select columns (by header type, header name or a regex over the
//! header text) and accept rows whose cell in any selected column satisfies a
//! content requirement. A row is disqualified when every pattern of one
//! "unexpected" group matches some cell of the row. Common rules are unioned;
//! special rules then narrow the result, but only when they leave something.

use crate::config::{KeyRowRule, KeyRowRules};
use crate::layout::{NodeGroup, NodeId};
use crate::table::field::{column_of, Field};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Structural type of a cell's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Digits with optional separators and signs
    Numeric,
    /// Letters only
    Alpha,
    /// Both digits and letters
    Mixed,
}

impl ContentType {
    /// Classify text; `None` for empty or symbol-only text.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_oxide::table::key_row::ContentType;
    ///
    /// assert_eq!(ContentType::of("1,200.50"), Some(ContentType::Numeric));
    /// assert_eq!(ContentType::of("螺丝"), Some(ContentType::Alpha));
    /// assert_eq!(ContentType::of("M8x20"), Some(ContentType::Mixed));
    /// assert_eq!(ContentType::of("  "), None);
    /// ```
    pub fn of(text: &str) -> Option<ContentType> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = chars.iter().any(|c| c.is_ascii_digit());
        let letters = chars.iter().any(|c| c.is_alphabetic());
        match (digits, letters) {
            (true, true) => Some(ContentType::Mixed),
            (false, true) => Some(ContentType::Alpha),
            (true, false) => {
                let numeric = chars
                    .iter()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+' | '%'));
                Some(if numeric {
                    ContentType::Numeric
                } else {
                    ContentType::Mixed
                })
            },
            (false, false) => None,
        }
    }
}

/// A column as seen by the key-row rules.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub header_type: String,
    pub header_text: String,
}

/// Rows × columns view of the table body.
#[derive(Debug, Clone)]
pub struct TableGrid {
    pub columns: Vec<Column>,
    cells: Vec<Vec<String>>,
}

impl TableGrid {
    /// Build the grid from rows and the fields their fragments were assigned to.
    pub fn new(rows: &[NodeGroup], fields: &[Field]) -> Self {
        let columns: Vec<Column> = fields
            .iter()
            .map(|f| Column {
                name: f.header.name.clone(),
                header_type: f.header.header_type.clone(),
                header_text: f.header.content(),
            })
            .collect();
        let owner: HashMap<NodeId, usize> = column_of(fields);
        let cells = rows
            .iter()
            .map(|row| {
                let mut cells = vec![String::new(); columns.len()];
                for node in row.nodes() {
                    if let Some(&c) = owner.get(&node.uid) {
                        cells[c].push_str(node.text());
                    }
                }
                cells
            })
            .collect();
        Self { columns, cells }
    }

    /// Build a grid directly from cell texts.
    pub fn from_cells(columns: Vec<Column>, cells: Vec<Vec<String>>) -> Self {
        Self { columns, cells }
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    /// Cell text; empty when out of range.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.cells
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Header types present in the grid.
    pub fn header_types(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header_type.as_str())
    }

    fn row_cells(&self, row: usize) -> &[String] {
        self.cells.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }
}

/// True when a cell satisfies the rule's content requirement.
fn content_ok(rule: &KeyRowRule, cell: &str) -> bool {
    let trimmed = cell.trim();
    let regex_ok =
        rule.content_regex.is_empty() || rule.content_regex.iter().any(|p| p.is_match(trimmed));
    let type_ok = match rule.content_type {
        Some(t) => ContentType::of(trimmed) == Some(t),
        None => true,
    };
    if rule.content_regex.is_empty() && rule.content_type.is_none() {
        return !trimmed.is_empty();
    }
    regex_ok && type_ok
}

/// True when every pattern of some unexpected group matches a cell of the row.
fn is_unexpected(rule: &KeyRowRule, cells: &[String]) -> bool {
    rule.unexpected.iter().any(|group| {
        !group.is_empty()
            && group
                .iter()
                .all(|p| cells.iter().any(|c| !c.is_empty() && p.is_match(c)))
    })
}

/// Rows accepted by one rule, or `None` when the rule's header precondition
/// does not hold.
pub fn evaluate_rule(rule: &KeyRowRule, grid: &TableGrid) -> Option<BTreeSet<usize>> {
    let gated = rule
        .require_header_types
        .iter()
        .all(|t| grid.header_types().any(|h| h == t));
    if !gated {
        log::trace!("rule '{}' skipped: required header types missing", rule.name);
        return None;
    }

    let columns: Vec<usize> = grid
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            rule.columns.iter().any(|r| *r == c.header_type || *r == c.name)
                || rule.header_regex.iter().any(|p| p.is_match(&c.header_text))
        })
        .map(|(i, _)| i)
        .collect();

    let mut rows = BTreeSet::new();
    for r in 0..grid.row_count() {
        let matched = columns.iter().any(|&c| content_ok(rule, grid.cell(r, c)));
        if matched && !is_unexpected(rule, grid.row_cells(r)) {
            rows.insert(r);
        }
    }
    log::trace!("rule '{}': {} row(s)", rule.name, rows.len());
    Some(rows)
}

/// Key rows of the grid.
///
/// The union of the common rules is narrowed by each special rule in turn;
/// a special rule that would leave nothing is ignored.
pub fn detect(rules: &KeyRowRules, grid: &TableGrid) -> BTreeSet<usize> {
    let mut keys = BTreeSet::new();
    for rule in &rules.common {
        if let Some(rows) = evaluate_rule(rule, grid) {
            keys.extend(rows);
        }
    }
    for rule in &rules.special {
        let Some(rows) = evaluate_rule(rule, grid) else {
            continue;
        };
        let narrowed: BTreeSet<usize> = keys.intersection(&rows).copied().collect();
        if narrowed.is_empty() {
            log::debug!("special rule '{}' ignored: it leaves no key row", rule.name);
        } else {
            keys = narrowed;
        }
    }
    log::debug!("{} key row(s) of {}", keys.len(), grid.row_count());
    keys
}
