//! Graph resolver: page cache → ranked entity list.
//!
//! Pure function of one `NormalizedGraph` snapshot. Nothing here fails: a
//! missing root, a missing list query or a dangling reference degrades to a
//! shorter (possibly empty) list plus a [`ResolutionWarning`].
//!
//! The list query is found by predicate rather than exact key because the
//! key embeds serialized arguments that change per call:
//! `restaurantList({"input":{"query":"coffee","start":16}})`.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::*;

// ============================================================================
// Field mapping
// ============================================================================

/// Source fields per entity attribute, most preferred first.
const ID_FIELDS: &[&str] = &["id"];
const NAME_FIELDS: &[&str] = &["name"];
const CATEGORY_FIELDS: &[&str] = &["category"];
const RATING_FIELDS: &[&str] = &["visitorReviewScore", "rating"];
const REVIEW_COUNT_FIELDS: &[&str] = &["visitorReviewCount", "reviewCount"];
const ADDRESS_FIELDS: &[&str] = &["roadAddress", "address"];

// ============================================================================
// Output types
// ============================================================================

/// Non-fatal problem met while resolving a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolutionWarning {
    MissingRootQuery,
    /// No `ROOT_QUERY` field matched; the keys that were there.
    QueryKeyNotFound { available: Vec<String> },
    /// An `items` entry is not a reference.
    NotAReference { index: usize },
    UnresolvedReference { key: String },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRootQuery => write!(f, "{ROOT_QUERY} not found in page cache"),
            Self::QueryKeyNotFound { available } => {
                write!(f, "list query not found; available keys: {}", available.join(", "))
            }
            Self::NotAReference { index } => write!(f, "item {index} is not a reference"),
            Self::UnresolvedReference { key } => write!(f, "could not resolve reference {key}"),
        }
    }
}

/// One resolved result page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPage {
    /// The `ROOT_QUERY` field the list came from.
    pub query_key: Option<String>,
    pub entities: Vec<RankedEntity>,
    /// Total hits reported by the list query.
    pub total: Option<u64>,
    pub warnings: Vec<ResolutionWarning>,
}

impl ResolvedPage {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&RankedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Predicate matching list query keys that start with `prefix`.
pub fn key_prefix(prefix: &str) -> impl Fn(&str) -> bool + '_ {
    move |key| key.starts_with(prefix)
}

/// Whether the graph already holds a list query matching `predicate`.
pub fn has_list_query<P: Fn(&str) -> bool>(graph: &NormalizedGraph, predicate: P) -> bool {
    graph
        .root_query()
        .is_some_and(|root| root.keys().any(|k| predicate(k.as_str())))
}

/// Resolve the matching list query into ranked entities.
pub fn resolve_list<P: Fn(&str) -> bool>(graph: &NormalizedGraph, predicate: P) -> Vec<RankedEntity> {
    resolve_page(graph, predicate).entities
}

/// Resolve the matching list query, keeping `total` and diagnostics.
pub fn resolve_page<P: Fn(&str) -> bool>(graph: &NormalizedGraph, predicate: P) -> ResolvedPage {
    let mut page = ResolvedPage::default();

    let Some(root) = graph.root_query() else {
        warn!("{ROOT_QUERY} not found in page cache");
        page.warnings.push(ResolutionWarning::MissingRootQuery);
        return page;
    };

    // Lowest matching key wins so the choice is stable across HashMap orders.
    let Some((query_key, list)) = root
        .iter()
        .filter(|(k, _)| predicate(k.as_str()))
        .min_by(|a, b| a.0.cmp(b.0))
    else {
        let mut available: Vec<String> = root.keys().cloned().collect();
        available.sort();
        warn!(available = %available.join(", "), "list query not found in {ROOT_QUERY}");
        page.warnings.push(ResolutionWarning::QueryKeyNotFound { available });
        return page;
    };
    debug!(query_key = %query_key, "found list query");
    page.query_key = Some(query_key.clone());

    let fields = list.as_map();
    page.total = fields
        .and_then(|f| f.get("total"))
        .and_then(GraphValue::as_int)
        .and_then(|t| u64::try_from(t).ok());

    let items = fields
        .and_then(|f| f.get("items"))
        .and_then(GraphValue::as_list)
        .unwrap_or_default();

    for (index, item) in items.iter().enumerate() {
        let Some(key) = item.as_ref_key() else {
            debug!(index, "list item has no reference");
            page.warnings.push(ResolutionWarning::NotAReference { index });
            continue;
        };
        match graph.resolve(key) {
            Resolution::Resolved(record) => {
                let local_rank = page.entities.len() as u32 + 1;
                page.entities.push(to_entity(key, record, local_rank));
            }
            Resolution::Unresolved(key) => {
                debug!(key = %key, "could not resolve reference");
                page.warnings
                    .push(ResolutionWarning::UnresolvedReference { key: key.to_string() });
            }
        }
    }

    debug!(resolved = page.entities.len(), items = items.len(), "parsed list items");
    page
}

fn to_entity(key: &GraphKey, record: &FieldMap, local_rank: u32) -> RankedEntity {
    let id = text(record, ID_FIELDS)
        .or_else(|| key.id().map(str::to_owned))
        .unwrap_or_default();

    RankedEntity {
        id,
        name: text(record, NAME_FIELDS).unwrap_or_default(),
        category: text(record, CATEGORY_FIELDS).unwrap_or_default(),
        rating: first(record, RATING_FIELDS).and_then(GraphValue::as_float).unwrap_or(0.0),
        review_count: first(record, REVIEW_COUNT_FIELDS)
            .and_then(GraphValue::as_int)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0),
        address: text(record, ADDRESS_FIELDS).unwrap_or_default(),
        local_rank,
    }
}

/// First present, non-null, non-empty field among `names`.
fn first<'r>(record: &'r FieldMap, names: &[&str]) -> Option<&'r GraphValue> {
    names
        .iter()
        .filter_map(|n| record.get(*n))
        .find(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.is_empty()))
}

fn text(record: &FieldMap, names: &[&str]) -> Option<String> {
    first(record, names).and_then(GraphValue::to_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> NormalizedGraph {
        NormalizedGraph::from_json(json!({
            "ROOT_QUERY": {
                "__typename": "Query",
                "restaurantList({\"input\":{\"query\":\"coffee\",\"start\":1}})": {
                    "items": [
                        {"__ref": "RestaurantListSummary:11"},
                        {"__ref": "RestaurantListSummary:404"},
                        {"__ref": "RestaurantListSummary:12"}
                    ],
                    "total": 312
                }
            },
            "RestaurantListSummary:11": {
                "id": "11",
                "name": "Bean There",
                "category": "Cafe",
                "visitorReviewScore": 4.61,
                "visitorReviewCount": "1,024",
                "roadAddress": "1 Main St",
                "address": "old address"
            },
            "RestaurantListSummary:12": {
                "name": "Brew Lab",
                "address": "2 Side St"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_resolves_in_order_with_fields() {
        let page = resolve_page(&sample(), key_prefix("restaurantList("));
        assert_eq!(page.total, Some(312));
        assert_eq!(page.entities.len(), 2);

        let first = &page.entities[0];
        assert_eq!(first.id, "11");
        assert_eq!(first.name, "Bean There");
        assert_eq!(first.category, "Cafe");
        assert_eq!(first.rating, 4.61);
        assert_eq!(first.review_count, 1024);
        assert_eq!(first.address, "1 Main St");
        assert_eq!(first.local_rank, 1);
    }

    #[test]
    fn test_unresolved_reference_takes_no_rank() {
        let page = resolve_page(&sample(), key_prefix("restaurantList("));
        let second = &page.entities[1];
        // Missing id falls back to the key's id part; missing fields default.
        assert_eq!(second.id, "12");
        assert_eq!(second.local_rank, 2);
        assert_eq!(second.rating, 0.0);
        assert_eq!(second.review_count, 0);
        assert_eq!(second.category, "");
        assert_eq!(second.address, "2 Side St");
        assert!(page.find("404").is_none());
        assert_eq!(
            page.warnings,
            vec![ResolutionWarning::UnresolvedReference { key: "RestaurantListSummary:404".into() }]
        );
    }

    #[test]
    fn test_missing_root_query() {
        let graph = NormalizedGraph::from_json(json!({"Place:1": {"id": "1"}})).unwrap();
        let page = resolve_page(&graph, key_prefix("restaurantList("));
        assert!(page.is_empty());
        assert_eq!(page.warnings, vec![ResolutionWarning::MissingRootQuery]);
    }

    #[test]
    fn test_missing_query_key_lists_available() {
        let page = resolve_page(&sample(), key_prefix("hospitalList("));
        assert!(page.is_empty());
        match &page.warnings[0] {
            ResolutionWarning::QueryKeyNotFound { available } => {
                assert_eq!(available.len(), 2);
                assert_eq!(available[0], "__typename");
            }
            other => panic!("unexpected warning {other:?}"),
        }
    }

    #[test]
    fn test_non_reference_items_skipped() {
        let graph = NormalizedGraph::from_json(json!({
            "ROOT_QUERY": { "listItems(cursor:1)": { "items": [3, {"__ref": "Item:1"}] } },
            "Item:1": { "id": "1" }
        }))
        .unwrap();
        let list = resolve_list(&graph, key_prefix("listItems("));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].local_rank, 1);
    }

    #[test]
    fn test_has_list_query() {
        assert!(has_list_query(&sample(), key_prefix("restaurantList(")));
        assert!(!has_list_query(&NormalizedGraph::new(), key_prefix("restaurantList(")));
    }

    #[test]
    fn test_numeric_id_rendered_as_text() {
        let graph = NormalizedGraph::from_json(json!({
            "ROOT_QUERY": { "listItems(cursor:1)": { "items": [{"__ref": "Item:9"}] } },
            "Item:9": { "id": 12345 }
        }))
        .unwrap();
        assert_eq!(resolve_list(&graph, key_prefix("listItems("))[0].id, "12345");
    }
}
