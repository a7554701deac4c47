//! Normalized object graph read out of a rendered page.
//!
//! The page's client cache is a flat `key → record` store. Relationships are
//! expressed as references (`{"__ref": "Place:123"}`) rather than nested
//! objects, so reconstructing an entity requires an explicit dereference step.
//!
//! ```text
//! ROOT_QUERY
//!   restaurantList({"input":{"query":"coffee","start":1}})
//!     items: [->Place:11, ->Place:12, ...]
//!     total: 312
//! Place:11 { id: "11", name: "...", visitorReviewScore: 4.5, ... }
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::GraphValue;
use crate::{Error, Result};

/// Key of the distinguished root record holding query results.
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Fields of one record.
pub type FieldMap = HashMap<String, GraphValue>;

// ============================================================================
// GraphKey
// ============================================================================

/// Composite record key, `TypeName:Id` (or a bare name such as `ROOT_QUERY`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphKey(String);

impl GraphKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `:`; the whole key if there is none.
    pub fn typename(&self) -> &str {
        self.0.split_once(':').map(|(t, _)| t).unwrap_or(&self.0)
    }

    /// The part after the first `:`, if any.
    pub fn id(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, id)| id)
    }
}

impl fmt::Display for GraphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GraphKey {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl Borrow<str> for GraphKey {
    fn borrow(&self) -> &str { &self.0 }
}

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of dereferencing a key against one graph snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'g> {
    Resolved(&'g FieldMap),
    Unresolved(&'g GraphKey),
}

impl<'g> Resolution<'g> {
    pub fn record(self) -> Option<&'g FieldMap> {
        match self {
            Resolution::Resolved(r) => Some(r),
            Resolution::Unresolved(_) => None,
        }
    }
}

// ============================================================================
// NormalizedGraph
// ============================================================================

/// One snapshot of the page's normalized cache.
///
/// Serializes as the cache object itself (`{"Place:1": {...}, ...}`);
/// deserializing goes through [`NormalizedGraph::from_json`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedGraph {
    records: HashMap<GraphKey, FieldMap>,
}

impl NormalizedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the JSON object evaluated in the page (`window.__APOLLO_STATE__`).
    ///
    /// Top-level entries that are not objects are ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let entries = match value {
            serde_json::Value::Object(entries) => entries,
            other => {
                return Err(Error::Graph(format!(
                    "expected a JSON object at the cache root, got {}",
                    json_kind(&other)
                )));
            }
        };

        let mut graph = Self::new();
        for (key, record) in entries {
            if let GraphValue::Map(fields) = GraphValue::from(record) {
                graph.insert(GraphKey::new(key), fields);
            }
        }
        Ok(graph)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(raw)?)
    }

    pub fn insert(&mut self, key: GraphKey, fields: FieldMap) {
        self.records.insert(key, fields);
    }

    pub fn with_record(
        mut self,
        key: impl Into<GraphKey>,
        fields: impl IntoIterator<Item = (impl Into<String>, GraphValue)>,
    ) -> Self {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.insert(key.into(), fields);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldMap> {
        self.records.get(key)
    }

    /// Dereference a key. Never fails: a dangling key yields `Unresolved`.
    pub fn resolve<'g>(&'g self, key: &'g GraphKey) -> Resolution<'g> {
        match self.records.get(key) {
            Some(record) => Resolution::Resolved(record),
            None => Resolution::Unresolved(key),
        }
    }

    pub fn root_query(&self) -> Option<&FieldMap> {
        self.get(ROOT_QUERY)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GraphKey> {
        self.records.keys()
    }
}

impl<'de> Deserialize<'de> for NormalizedGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(raw).map_err(D::Error::custom)
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_parts() {
        let k = GraphKey::new("Place:123");
        assert_eq!(k.typename(), "Place");
        assert_eq!(k.id(), Some("123"));

        let root = GraphKey::new(ROOT_QUERY);
        assert_eq!(root.typename(), ROOT_QUERY);
        assert_eq!(root.id(), None);
    }

    #[test]
    fn test_from_json_resolves_refs() {
        let graph = NormalizedGraph::from_json(json!({
            "ROOT_QUERY": { "list(a:1)": { "items": [{"__ref": "Place:1"}] } },
            "Place:1": { "id": "1", "name": "Cafe" },
            "__META": 3
        }))
        .unwrap();

        assert_eq!(graph.len(), 2);
        let mut keys: Vec<&str> = graph.keys().map(GraphKey::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["Place:1", "ROOT_QUERY"]);
        let key = GraphKey::new("Place:1");
        let record = graph.resolve(&key).record().unwrap();
        assert_eq!(record.get("name"), Some(&GraphValue::from("Cafe")));
    }

    #[test]
    fn test_dangling_key_is_unresolved() {
        let graph = NormalizedGraph::new();
        let key = GraphKey::new("Place:404");
        assert_eq!(graph.resolve(&key), Resolution::Unresolved(&key));
    }

    #[test]
    fn test_serde_matches_cache_json() {
        let raw = json!({
            "ROOT_QUERY": { "list(a:1)": { "total": 1, "items": [{"__ref": "Place:1"}] } },
            "Place:1": { "id": "1", "rating": 4.5 }
        });
        let graph: NormalizedGraph = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(graph, NormalizedGraph::from_json(raw.clone()).unwrap());
        assert_eq!(serde_json::to_value(&graph).unwrap(), raw);
    }

    #[test]
    fn test_deserialize_rejects_non_object() {
        assert!(serde_json::from_str::<NormalizedGraph>("[1, 2]").is_err());
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(NormalizedGraph::from_json(json!([1, 2])).is_err());
        assert!(NormalizedGraph::from_json_str("not json").is_err());
    }
}
