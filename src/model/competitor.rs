//! Similar/competing listing scraped from a rendered page.

use serde::{Deserialize, Serialize};

/// Where a competitor record was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitorSource {
    /// "Similar places" block on the listing site's own detail page.
    NaverSimilar,
    /// "Similar restaurants" block on the secondary review site.
    DiningcodeSimilar,
}

impl CompetitorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitorSource::NaverSimilar => "naver_similar",
            CompetitorSource::DiningcodeSimilar => "diningcode_similar",
        }
    }
}

/// A listing found in a page's "similar" section.
///
/// Text fields stay as scraped (`"4.5"`, `"120m"`); empty means not present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorRecord {
    pub place_id: String,
    pub name: String,
    pub category: String,
    pub rating: String,
    pub review_count: String,
    pub distance: String,
    pub url: String,
    pub source: CompetitorSource,
}

/// Both profiles' results for one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorSet {
    pub naver: Vec<CompetitorRecord>,
    pub diningcode: Vec<CompetitorRecord>,
}
