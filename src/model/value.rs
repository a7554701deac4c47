//! Field value type for records in a normalized page graph.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::GraphKey;

/// Wire marker for a reference object: `{"__ref": "Place:123"}`.
pub const REF_FIELD: &str = "__ref";

/// A single field value inside a graph record.
///
/// Covers what a client-side data cache stores:
/// - Scalars: Bool, Int, Float, String
/// - Containers: List, Map
/// - Pointers: Ref (to another key of the same snapshot)
///
/// Serializes to the same JSON shape the page cache uses, so a `Ref` is
/// written as `{"__ref": "Place:123"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", from = "serde_json::Value")]
pub enum GraphValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    Map(HashMap<String, GraphValue>),
    Ref(GraphKey),
}

// ============================================================================
// Type checking
// ============================================================================

impl GraphValue {
    pub fn is_null(&self) -> bool { matches!(self, GraphValue::Null) }

    /// Attempt to extract as i64.
    ///
    /// Numeric strings are accepted because caches frequently carry counts
    /// as text (`"1,204"`); thousands separators are ignored.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            GraphValue::Int(i) => Some(*i),
            GraphValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            GraphValue::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            GraphValue::Float(f) => Some(*f),
            GraphValue::Int(i) => Some(*i as f64),
            GraphValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[GraphValue]> {
        match self {
            GraphValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, GraphValue>> {
        match self {
            GraphValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ref_key(&self) -> Option<&GraphKey> {
        match self {
            GraphValue::Ref(k) => Some(k),
            _ => None,
        }
    }

    /// Render scalars as text; ids arrive as either strings or integers.
    pub fn to_text(&self) -> Option<String> {
        match self {
            GraphValue::String(s) => Some(s.clone()),
            GraphValue::Int(i) => Some(i.to_string()),
            GraphValue::Float(f) => Some(f.to_string()),
            GraphValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for GraphValue { fn from(v: bool) -> Self { GraphValue::Bool(v) } }
impl From<i32> for GraphValue { fn from(v: i32) -> Self { GraphValue::Int(v as i64) } }
impl From<i64> for GraphValue { fn from(v: i64) -> Self { GraphValue::Int(v) } }
impl From<f64> for GraphValue { fn from(v: f64) -> Self { GraphValue::Float(v) } }
impl From<String> for GraphValue { fn from(v: String) -> Self { GraphValue::String(v) } }
impl From<&str> for GraphValue { fn from(v: &str) -> Self { GraphValue::String(v.to_owned()) } }
impl From<GraphKey> for GraphValue { fn from(v: GraphKey) -> Self { GraphValue::Ref(v) } }
impl<T: Into<GraphValue>> From<Vec<T>> for GraphValue {
    fn from(v: Vec<T>) -> Self { GraphValue::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<GraphValue>> From<Option<T>> for GraphValue {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(GraphValue::Null) }
}

/// Decode the JSON shape produced by evaluating the page cache in-browser.
///
/// An object whose only field is `__ref` with a string value becomes a
/// [`GraphValue::Ref`]; every other object becomes a map.
impl From<serde_json::Value> for GraphValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => GraphValue::Null,
            Json::Bool(b) => GraphValue::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => GraphValue::Int(i),
                None => n.as_f64().map(GraphValue::Float).unwrap_or(GraphValue::Null),
            },
            Json::String(s) => GraphValue::String(s),
            Json::Array(items) => GraphValue::List(items.into_iter().map(Into::into).collect()),
            Json::Object(mut fields) => {
                if fields.len() == 1 {
                    if let Some(Json::String(key)) = fields.remove(REF_FIELD) {
                        return GraphValue::Ref(GraphKey::new(key));
                    }
                }
                GraphValue::Map(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Encode back into the page cache's JSON shape. Non-finite floats become
/// `null`.
impl From<GraphValue> for serde_json::Value {
    fn from(v: GraphValue) -> Self {
        use serde_json::Value as Json;
        match v {
            GraphValue::Null => Json::Null,
            GraphValue::Bool(b) => Json::Bool(b),
            GraphValue::Int(i) => Json::from(i),
            GraphValue::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
            GraphValue::String(s) => Json::String(s),
            GraphValue::List(items) => Json::Array(items.into_iter().map(Into::into).collect()),
            GraphValue::Map(fields) => Json::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect()),
            GraphValue::Ref(key) => {
                let mut fields = serde_json::Map::new();
                fields.insert(REF_FIELD.to_owned(), Json::String(key.as_str().to_owned()));
                Json::Object(fields)
            }
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::Null => write!(f, "null"),
            GraphValue::Bool(b) => write!(f, "{b}"),
            GraphValue::Int(i) => write!(f, "{i}"),
            GraphValue::Float(v) => write!(f, "{v}"),
            GraphValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            GraphValue::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            GraphValue::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            GraphValue::Ref(k) => write!(f, "->{k}"),
        }
    }
}
