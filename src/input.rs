//! OCR input records.
//!
//! A page arrives as a map from generated ids to raw detections, each an array
//! in one of two shapes:
//!
//! - quad: `[text, x1, y1, x2, y2, x3, y3, x4, y4, rotation_angle, label, conf...]`
//! - ltrb: `[text, left, top, right, bottom, label, conf...]`
//!
//! Confidences are optional; when absent every character scores `1.0`.

use crate::error::{Error, Result};
use crate::geometry::{BBox, Point, RotatedBox};
use crate::layout::{Node, NodeArena};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const QUAD_FIELDS: usize = 11;
const LTRB_FIELDS: usize = 6;

/// Shape of the raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Decide per record from its length
    #[default]
    Auto,
    Quad,
    Ltrb,
}

impl InputFormat {
    /// Resolve `Auto` for a record whose text has `chars` characters.
    ///
    /// Full-length forms (with one confidence per character) are recognized
    /// first; a record without confidences is read as quad when it has 11
    /// fields and as ltrb when it has 6. An 11-field record whose text has
    /// five characters fits both shapes: it is ltrb only when its trailing
    /// fields are all valid confidences.
    pub fn detect(fields: &[Value], chars: usize) -> Option<InputFormat> {
        let len = fields.len();
        let quad_coords = len >= QUAD_FIELDS && fields[1..10].iter().all(Value::is_number);
        let confidences = fields
            .get(LTRB_FIELDS..)
            .map_or(false, |tail| tail.iter().all(is_confidence));

        if len == QUAD_FIELDS + chars && quad_coords {
            Some(InputFormat::Quad)
        } else if len == LTRB_FIELDS + chars && confidences {
            Some(InputFormat::Ltrb)
        } else if len == QUAD_FIELDS && quad_coords {
            Some(InputFormat::Quad)
        } else if len == LTRB_FIELDS {
            Some(InputFormat::Ltrb)
        } else {
            None
        }
    }
}

fn is_confidence(value: &Value) -> bool {
    value.as_f64().map_or(false, |s| (0.0..=1.0).contains(&s))
}

fn invalid(id: &str, reason: impl Into<String>) -> Error {
    Error::InvalidNodeItem {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn number(id: &str, fields: &[Value], i: usize) -> Result<f32> {
    fields
        .get(i)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .ok_or_else(|| invalid(id, format!("field {} is not a number", i)))
}

fn label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse one raw record into a node.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use table_oxide::input::{parse_node_item, InputFormat};
///
/// let node = parse_node_item("7", &json!(["Qty", 10, 20, 40, 40, 0]), InputFormat::Auto).unwrap();
/// assert_eq!(node.text(), "Qty");
/// assert_eq!(node.bbox.width(), 30.0);
/// assert_eq!(node.scores(), &[1.0, 1.0, 1.0]);
/// ```
pub fn parse_node_item(id: &str, value: &Value, format: InputFormat) -> Result<Node> {
    let fields = value.as_array().ok_or_else(|| invalid(id, "record is not an array"))?;
    let text = fields
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(id, "first field is not text"))?;
    let chars = text.chars().count();

    let format = match format {
        InputFormat::Auto => InputFormat::detect(fields, chars).ok_or_else(|| {
            invalid(id, format!("{} fields fit neither shape", fields.len()))
        })?,
        explicit => explicit,
    };
    let conf_start = match format {
        InputFormat::Quad => QUAD_FIELDS,
        _ => LTRB_FIELDS,
    };
    if fields.len() < conf_start {
        return Err(invalid(id, format!("expected at least {} fields", conf_start)));
    }
    let scores = fields[conf_start..]
        .iter()
        .enumerate()
        .map(|(k, v)| {
            v.as_f64()
                .map(|s| s as f32)
                .ok_or_else(|| invalid(id, format!("confidence {} is not a number", k)))
        })
        .collect::<Result<Vec<f32>>>()?;
    if !scores.is_empty() && scores.len() != chars {
        let reason = format!("{} confidences for {} characters", scores.len(), chars);
        return Err(invalid(id, reason));
    }
    if let Some(k) = scores.iter().position(|s| !(0.0..=1.0).contains(s)) {
        return Err(invalid(id, format!("confidence {} is outside [0, 1]", k)));
    }

    let node = match format {
        InputFormat::Quad => {
            let mut points = [Point::default(); 4];
            for (k, p) in points.iter_mut().enumerate() {
                *p = Point::new(number(id, fields, 1 + 2 * k)?, number(id, fields, 2 + 2 * k)?);
            }
            let angle = number(id, fields, 9)?;
            let bbox = BBox::from_points(&points)
                .ok_or_else(|| invalid(id, "degenerate quadrilateral"))?;
            let node = Node::new(id, text, bbox).with_rotated_box(RotatedBox::new(points, angle));
            match label(&fields[10]) {
                Some(l) => node.with_label(l),
                None => node,
            }
        },
        _ => {
            let (l, t, r, b) = (
                number(id, fields, 1)?,
                number(id, fields, 2)?,
                number(id, fields, 3)?,
                number(id, fields, 4)?,
            );
            if l > r || t > b {
                return Err(invalid(id, "box edges out of order"));
            }
            let node = Node::new(id, text, BBox::new(l, t, r, b));
            match label(&fields[5]) {
                Some(lb) => node.with_label(lb),
                None => node,
            }
        },
    };
    Ok(if scores.is_empty() {
        node
    } else {
        node.with_scores(scores)
    })
}

/// One OCR'd page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Document class used to pick the processor
    pub class_name: Option<String>,
    /// Nodes in id order
    pub nodes: Vec<Node>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    format: InputFormat,
    items: serde_json::Map<String, Value>,
}

impl Page {
    /// Parse `{"class_name": ..., "format": ..., "items": {id: [...]}}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawPage = serde_json::from_str(text)?;
        let mut nodes = raw
            .items
            .iter()
            .map(|(id, v)| parse_node_item(id, v, raw.format))
            .collect::<Result<Vec<Node>>>()?;
        nodes.sort_by(|a, b| a.uid.cmp(&b.uid));
        log::debug!("parsed {} node item(s)", nodes.len());
        Ok(Self {
            class_name: raw.class_name,
            nodes,
        })
    }

    /// Build a page from nodes.
    pub fn from_nodes(class_name: Option<String>, nodes: Vec<Node>) -> Self {
        Self { class_name, nodes }
    }

    /// The working set for this page.
    pub fn arena(&self) -> NodeArena {
        NodeArena::from_nodes(self.nodes.iter().cloned())
    }
}
