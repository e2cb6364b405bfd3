//! Configuration for table and key/value extraction.
//!
//! One [`TableConfig`] per document class, grouped in a [`DocumentConfig`]
//! loaded from YAML or JSON. Regular expressions are compiled while
//! deserializing and references between sections are checked by
//! [`TableConfig::validate`], so configuration defects surface at load time
//! rather than deep inside page processing.

use crate::error::{Error, Result};
use crate::kv::Direction;
use crate::matching::{AlignPolicy, BgItem, MatchLimits, MatchMode, MultiRowLabel, Preprocess};
use crate::processor::HookRegistry;
use crate::table::key_row::ContentType;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Name of the catch-all header type. Always implicitly defined.
pub const OTHER: &str = "OTHER";

lazy_static! {
    /// Built-in markers of a trailing "total" line
    static ref TOTAL_PATTERNS: Vec<Pattern> = [
        r"(?i)^\s*(grand|sub)?\s*-?\s*total\b",
        r"合\s*计",
        r"总\s*计",
        r"小\s*计",
    ]
    .iter()
    .map(|p| Pattern(Regex::new(p).unwrap()))
    .collect();
}

/// A regular expression compiled at load time.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Pattern)
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// True when the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    /// First match in `text`.
    pub fn find<'t>(&self, text: &'t str) -> Option<regex::Match<'t>> {
        self.0.find(text)
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.0.as_str())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Pattern::new(&value)
    }
}

impl Serialize for Pattern {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Pattern::try_from(text).map_err(serde::de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> usize {
    1
}

/// Full form of one label alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub text: String,
    #[serde(default)]
    pub mode: MatchMode,
    /// Maximum edit distance; `-1` means exact only
    #[serde(default)]
    pub ed_thresh: i32,
    #[serde(default = "default_interval")]
    pub max_interval: usize,
    #[serde(default = "default_true")]
    pub strip_symbols: bool,
    #[serde(default = "default_true")]
    pub strip_spaces: bool,
    #[serde(default)]
    pub preprocess: Option<Preprocess>,
}

/// One label alternative: a bare string is a `common` label with default tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Spec(LabelSpec),
}

impl Label {
    /// The label text.
    pub fn text(&self) -> &str {
        match self {
            Label::Text(t) => t,
            Label::Spec(s) => &s.text,
        }
    }

    /// The matcher for this label.
    pub fn item(&self) -> BgItem {
        match self {
            Label::Text(t) => BgItem::new(t.clone(), MatchMode::Common),
            Label::Spec(s) => BgItem {
                text: s.text.clone(),
                mode: s.mode,
                ed_thresh: s.ed_thresh,
                max_interval: s.max_interval.max(1),
                strip_symbols: s.strip_symbols,
                strip_spaces: s.strip_spaces,
                preprocess: s.preprocess,
            },
        }
    }
}

/// Rows × positions × alternatives.
pub type LabelGrid = Vec<Vec<Vec<Label>>>;

fn grid_to_label(grid: &LabelGrid, align: &AlignPolicy) -> MultiRowLabel {
    let rows = grid
        .iter()
        .map(|row| row.iter().map(|alts| alts.iter().map(Label::item).collect()).collect())
        .collect();
    MultiRowLabel::new(rows, align.clone())
}

fn grid_is_valid(grid: &LabelGrid) -> bool {
    !grid.is_empty()
        && grid.iter().all(|row| {
            !row.is_empty()
                && row
                    .iter()
                    .all(|alts| !alts.is_empty() && alts.iter().all(|l| !l.text().is_empty()))
        })
}

/// One entry of the header type enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderTypeDef {
    pub name: String,
    /// Anchor type: every table header must contain one
    #[serde(default)]
    pub prime_key: bool,
    /// Per-type cap on bound headers; falls back to `search.max_per_type`
    #[serde(default)]
    pub max_candidates: Option<usize>,
}

/// A configured header label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDef {
    /// Column name used in the output
    pub name: String,
    pub header_type: String,
    pub rows: LabelGrid,
    #[serde(default)]
    pub alignment: AlignPolicy,
}

impl HeaderDef {
    /// The multi-line matcher for this header.
    pub fn label(&self) -> MultiRowLabel {
        grid_to_label(&self.rows, &self.alignment)
    }
}

/// A key-row rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRowRule {
    pub name: String,
    /// Header types or header names the rule applies to
    pub columns: Vec<String>,
    /// Additionally select columns whose header text matches any of these
    pub header_regex: Vec<Pattern>,
    /// Cell content must match any of these
    pub content_regex: Vec<Pattern>,
    /// Cell content must be of this structural type
    pub content_type: Option<ContentType>,
    /// A row is disqualified when every pattern of one group matches it
    pub unexpected: Vec<Vec<Pattern>>,
    /// The rule only runs when the header contains all these types
    pub require_header_types: Vec<String>,
}

/// Common and special key-row rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRowRules {
    pub common: Vec<KeyRowRule>,
    pub special: Vec<KeyRowRule>,
}

fn default_total_patterns() -> Vec<Pattern> {
    TOTAL_PATTERNS.clone()
}

/// Row and column filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Rows whose text matches any of these are dropped before key-row detection
    pub row_exclude: Vec<Pattern>,
    /// Header types left out of the output records
    pub column_exclude: Vec<String>,
    /// Markers of a trailing total line
    #[serde(default = "default_total_patterns")]
    pub total_patterns: Vec<Pattern>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            row_exclude: Vec::new(),
            column_exclude: Vec::new(),
            total_patterns: default_total_patterns(),
        }
    }
}

/// Discovery of unlabeled header cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoHeaderConfig {
    pub enabled: bool,
    /// Text that looks like an amount is never a header
    pub amount_patterns: Vec<Pattern>,
    /// Short labels that are accepted despite their length
    pub unit_labels: Vec<String>,
}

impl Default for AutoHeaderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amount_patterns: Vec::new(),
            unit_labels: vec!["L".into(), "W".into(), "H".into()],
        }
    }
}

/// Hard caps on the combinatorial search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    pub max_candidates_per_cell: usize,
    pub max_row_groups: usize,
    pub max_multi_row_matches: usize,
    pub max_per_type: usize,
    pub max_combinations: usize,
    /// Baseline pairs steeper than this (degrees) are treated as accidental
    pub angle_thresh: f32,
    /// Angle agreement (degrees) for folding headers into a baseline
    pub pair_angle_tolerance: f32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_candidates_per_cell: 16,
            max_row_groups: 64,
            max_multi_row_matches: 64,
            max_per_type: 4,
            max_combinations: 4096,
            angle_thresh: 10.0,
            pair_angle_tolerance: 2.0,
        }
    }
}

impl SearchLimits {
    /// Caps for the multi-line matcher.
    pub fn match_limits(&self) -> MatchLimits {
        MatchLimits {
            max_candidates_per_cell: self.max_candidates_per_cell,
            max_row_groups: self.max_row_groups,
            max_matches: self.max_multi_row_matches,
        }
    }
}

/// Column assignment granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignBy {
    #[default]
    Node,
    Paragraph,
}

/// Tuning of field and row assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    pub assign_by: AssignBy,
    /// Merge three-row "品" false splits
    pub merge_pin_rows: bool,
    /// Left-aligned fragments that trigger the column boundary re-check
    pub recheck_min_aligned: usize,
    /// Trailing rows further than this many mean row heights are dropped
    pub tail_gap_ratio: f32,
    /// Vertical IoU above which a row joins the next key row
    pub row_iou_thresh: f32,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            assign_by: AssignBy::Node,
            merge_pin_rows: false,
            recheck_min_aligned: 5,
            tail_gap_ratio: 5.0,
            row_iou_thresh: 0.5,
        }
    }
}

fn default_max_gap_ratio() -> f32 {
    15.0
}

/// An anchor-label key/value field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueDef {
    pub field: String,
    pub labels: LabelGrid,
    #[serde(default)]
    pub alignment: AlignPolicy,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub value_regex: Option<Pattern>,
    /// Largest gap to a value fragment, in label heights
    #[serde(default = "default_max_gap_ratio")]
    pub max_gap_ratio: f32,
}

impl KeyValueDef {
    /// The multi-line matcher for the anchor label.
    pub fn label(&self) -> MultiRowLabel {
        grid_to_label(&self.labels, &self.alignment)
    }
}

/// Extraction configuration of one document class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub header_types: Vec<HeaderTypeDef>,
    pub headers: Vec<HeaderDef>,
    pub key_rows: KeyRowRules,
    pub filters: FilterRules,
    pub auto_header: AutoHeaderConfig,
    pub search: SearchLimits,
    pub options: TableOptions,
    pub key_values: Vec<KeyValueDef>,
    /// Column or field name → hook names applied in order
    pub post_process: IndexMap<String, Vec<String>>,
}

impl TableConfig {
    /// True when the name is a configured type or the catch-all.
    pub fn is_known_type(&self, name: &str) -> bool {
        name == OTHER || self.header_types.iter().any(|t| t.name == name)
    }

    /// True when the type is flagged as prime key.
    pub fn is_prime_type(&self, name: &str) -> bool {
        self.header_types.iter().any(|t| t.name == name && t.prime_key)
    }

    /// Cap on bound headers of a type.
    pub fn max_for_type(&self, name: &str) -> usize {
        self.header_types
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.max_candidates)
            .unwrap_or(self.search.max_per_type)
    }

    /// True when columns of this type are left out of the output.
    pub fn is_excluded_column(&self, header_type: &str) -> bool {
        self.filters.column_exclude.iter().any(|c| c == header_type)
    }

    /// Check cross references with the built-in hooks.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&HookRegistry::with_builtins())
    }

    /// Check cross references against a hook registry.
    pub fn validate_with(&self, hooks: &HookRegistry) -> Result<()> {
        let mut seen = HashSet::new();
        for t in &self.header_types {
            if t.name.is_empty() {
                return Err(Error::InvalidConfig("header type with empty name".into()));
            }
            if !seen.insert(t.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate header type '{}'", t.name)));
            }
        }
        if !self.headers.is_empty() && !self.header_types.iter().any(|t| t.prime_key) {
            return Err(Error::MissingPrimeKey);
        }

        for h in &self.headers {
            if !self.is_known_type(&h.header_type) {
                return Err(Error::UnknownHeaderType {
                    header: h.name.clone(),
                    header_type: h.header_type.clone(),
                });
            }
            if !grid_is_valid(&h.rows) {
                return Err(Error::InvalidConfig(format!(
                    "header '{}' has an empty label grid",
                    h.name
                )));
            }
        }

        let header_names: HashSet<&str> = self.headers.iter().map(|h| h.name.as_str()).collect();
        for rule in self.key_rows.common.iter().chain(&self.key_rows.special) {
            for column in &rule.columns {
                if !self.is_known_type(column) && !header_names.contains(column.as_str()) {
                    return Err(Error::UnknownHeaderType {
                        header: rule.name.clone(),
                        header_type: column.clone(),
                    });
                }
            }
            for t in &rule.require_header_types {
                if !self.is_known_type(t) {
                    return Err(Error::UnknownHeaderType {
                        header: rule.name.clone(),
                        header_type: t.clone(),
                    });
                }
            }
        }

        for column in &self.filters.column_exclude {
            if !self.is_known_type(column) {
                return Err(Error::UnknownHeaderType {
                    header: "filters.column_exclude".into(),
                    header_type: column.clone(),
                });
            }
        }

        for kv in &self.key_values {
            if !grid_is_valid(&kv.labels) {
                return Err(Error::InvalidConfig(format!(
                    "field '{}' has an empty label grid",
                    kv.field
                )));
            }
        }

        for (target, names) in &self.post_process {
            for name in names {
                if !hooks.contains(name) {
                    return Err(Error::InvalidConfig(format!(
                        "unknown hook '{}' bound to '{}'",
                        name, target
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Configuration of every supported document class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub classes: IndexMap<String, TableConfig>,
}

impl DocumentConfig {
    /// Parse YAML and validate.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: DocumentConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON and validate.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DocumentConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.yaml`/`.yml` is read as YAML, anything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        log::debug!("Loading configuration from {}", path.display());
        if is_yaml {
            Self::from_yaml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    /// Validate every class.
    pub fn validate(&self) -> Result<()> {
        for (name, class) in &self.classes {
            class.validate().map_err(|e| {
                log::debug!("class '{}' failed validation: {}", name, e);
                e
            })?;
        }
        Ok(())
    }

    /// Configuration of one class.
    pub fn class(&self, name: &str) -> Option<&TableConfig> {
        self.classes.get(name)
    }

    /// Class names in configuration order.
    pub fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
classes:
  invoice:
    header_types:
      - name: NAME
      - name: QTY
        prime_key: true
    headers:
      - name: name
        header_type: NAME
        rows: [[["品名", "Description"]]]
      - name: qty
        header_type: QTY
        rows: [[[{text: "数量", mode: h_split, ed_thresh: -1}]]]
    key_rows:
      common:
        - name: numeric_qty
          columns: [QTY]
          content_type: numeric
"#;

    #[test]
    fn test_parse_minimal_yaml() {
        let config = DocumentConfig::from_yaml_str(MINIMAL).unwrap();
        let class = config.class("invoice").unwrap();
        assert_eq!(class.headers.len(), 2);
        assert!(class.is_prime_type("QTY"));
        assert!(class.is_known_type(OTHER));
        let item = class.headers[1].rows[0][0][0].item();
        assert_eq!(item.mode, MatchMode::HSplit);
        assert_eq!(item.ed_thresh, -1);
        assert_eq!(item.max_interval, 1);
        assert_eq!(class.search.max_per_type, 4);
        assert_eq!(class.filters.total_patterns.len(), 4);
    }

    #[test]
    fn test_unknown_header_type() {
        let yaml = MINIMAL.replace("header_type: NAME", "header_type: NAMES");
        let err = DocumentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, Error::UnknownHeaderType { .. }));
        assert!(err.is_config_inconsistency());
    }

    #[test]
    fn test_missing_prime_key() {
        let yaml = MINIMAL.replace("prime_key: true", "prime_key: false");
        let err = DocumentConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, Error::MissingPrimeKey));
    }

    #[test]
    fn test_bad_regex_fails_at_load() {
        let yaml = format!("{}          content_regex: ['(']\n", MINIMAL);
        assert!(DocumentConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_unknown_hook() {
        let mut config = DocumentConfig::from_yaml_str(MINIMAL).unwrap();
        let class = config.classes.get_mut("invoice").unwrap();
        class.post_process.insert("qty".into(), vec!["reverse".into()]);
        assert!(matches!(class.validate(), Err(Error::InvalidConfig(_))));
        class.post_process.insert("qty".into(), vec!["trim".into()]);
        assert!(class.validate().is_ok());
    }

    #[test]
    fn test_total_patterns() {
        let filters = FilterRules::default();
        let hit = |t: &str| filters.total_patterns.iter().any(|p| p.is_match(t));
        assert!(hit("Total: 100"));
        assert!(hit("合计"));
        assert!(hit("SUB-TOTAL"));
        assert!(!hit("Totally"));
    }
}
