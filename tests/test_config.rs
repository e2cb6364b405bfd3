//! Integration tests for configuration loading.

use std::io::Write;
use table_oxide::config::{AssignBy, DocumentConfig, Label};
use table_oxide::kv::Direction;
use table_oxide::matching::{AlignMode, MatchMode};
use table_oxide::Error;
use tempfile::NamedTempFile;

// ============================================================================
// Fixtures
// ============================================================================

const INVOICE_YAML: &str = r#"
classes:
  invoice:
    header_types:
      - name: NAME
      - name: QTY
        prime_key: true
        max_candidates: 2
      - name: AMOUNT
    headers:
      - name: name
        header_type: NAME
        rows:
          - [["Description", "品名"]]
      - name: unit_price
        header_type: AMOUNT
        alignment:
          modes: [left]
        rows:
          - [["Unit"]]
          - [["Price"]]
      - name: qty
        header_type: QTY
        rows: [[[{text: "数量", mode: h_split, ed_thresh: -1}]]]
    key_rows:
      common:
        - name: numeric_qty
          columns: [QTY]
          content_type: numeric
          unexpected:
            - ["(?i)total", "^0$"]
    filters:
      column_exclude: [AMOUNT]
    options:
      assign_by: paragraph
      merge_pin_rows: true
    key_values:
      - field: invoice_no
        labels: [[["Invoice No"]]]
        direction: right_or_below
        value_regex: "[A-Z]+-\\d+"
    post_process:
      invoice_no: [trim, upper]
  receipt:
    key_values:
      - field: total
        labels: [[["Total"]]]
"#;

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().expect("temp file");
    file.write_all(content.as_bytes()).expect("write");
    file
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_yaml_file() {
    let file = write_temp(".yaml", INVOICE_YAML);
    let config = DocumentConfig::from_path(file.path()).unwrap();

    assert_eq!(config.class_names(), vec!["invoice".to_string(), "receipt".to_string()]);
    let invoice = config.class("invoice").unwrap();
    assert_eq!(invoice.max_for_type("QTY"), 2);
    assert_eq!(invoice.headers[1].rows.len(), 2);
    assert_eq!(invoice.headers[1].alignment.modes, vec![AlignMode::Left]);
    assert!(matches!(&invoice.headers[0].rows[0][0][1], Label::Text(t) if t == "品名"));
    assert_eq!(invoice.headers[2].label().rows[0][0][0].mode, MatchMode::HSplit);
    assert_eq!(invoice.key_rows.common[0].unexpected[0].len(), 2);
    assert_eq!(invoice.options.assign_by, AssignBy::Paragraph);
    assert!(invoice.is_excluded_column("AMOUNT"));
    assert_eq!(invoice.key_values[0].direction, Direction::RightOrBelow);
    assert_eq!(invoice.post_process["invoice_no"], vec!["trim", "upper"]);

    // a key/value-only class needs no prime key
    assert!(config.class("receipt").unwrap().headers.is_empty());
}

#[test]
fn test_load_json_file() {
    let json = r#"{
        "classes": {
            "bill": {
                "header_types": [{"name": "NO", "prime_key": true}],
                "headers": [
                    {"name": "no", "header_type": "NO", "rows": [[["No."]]]},
                    {"name": "remark", "header_type": "OTHER", "rows": [[["Remark"]]]}
                ]
            }
        }
    }"#;
    let file = write_temp(".json", json);
    let config = DocumentConfig::from_path(file.path()).unwrap();
    let bill = config.class("bill").unwrap();
    assert!(bill.is_prime_type("NO"));
    assert_eq!(bill.headers[1].header_type, "OTHER");
}

#[test]
fn test_yaml_round_trips_through_json() {
    let config = DocumentConfig::from_yaml_str(INVOICE_YAML).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let reloaded = DocumentConfig::from_json_str(&json).unwrap();
    assert_eq!(config, reloaded);
}

// ============================================================================
// Load-time Validation
// ============================================================================

#[test]
fn test_rule_column_must_exist() {
    let yaml = INVOICE_YAML.replace("columns: [QTY]", "columns: [WEIGHT]");
    let err = DocumentConfig::from_yaml_str(&yaml).unwrap_err();
    assert!(
        matches!(err, Error::UnknownHeaderType { ref header_type, .. } if header_type == "WEIGHT")
    );
}

#[test]
fn test_excluded_column_must_exist() {
    let yaml = INVOICE_YAML.replace("column_exclude: [AMOUNT]", "column_exclude: [PRICE]");
    assert!(DocumentConfig::from_yaml_str(&yaml).unwrap_err().is_config_inconsistency());
}

#[test]
fn test_empty_label_grid_rejected() {
    let yaml = INVOICE_YAML.replace("labels: [[[\"Total\"]]]", "labels: []");
    assert!(matches!(DocumentConfig::from_yaml_str(&yaml), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_bad_value_regex_fails_at_load() {
    let yaml = INVOICE_YAML.replace("\"[A-Z]+-\\\\d+\"", "\"[A-Z\"");
    assert!(DocumentConfig::from_yaml_str(&yaml).is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DocumentConfig::from_path(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
