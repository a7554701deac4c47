//! Outcome of one keyword rank search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RankedEntity;

/// Where a target listing ranks for one keyword.
///
/// `rank == None` means the target was not found within the searched pages.
/// That is a successful outcome, distinct from a failed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResult {
    pub keyword: String,
    pub target_id: String,
    pub rank: Option<u64>,
    pub page: Option<u32>,
    pub total_results: Option<u64>,
    pub found_at: DateTime<Utc>,
    /// The matched listing as it appeared on its page.
    pub entity: Option<RankedEntity>,
    /// Number of result pages actually fetched.
    pub pages_searched: u32,
}

impl RankResult {
    pub fn found(
        keyword: impl Into<String>,
        target_id: impl Into<String>,
        rank: u64,
        page: u32,
        total_results: Option<u64>,
        entity: RankedEntity,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            target_id: target_id.into(),
            rank: Some(rank),
            page: Some(page),
            total_results,
            found_at: Utc::now(),
            entity: Some(entity),
            pages_searched: page,
        }
    }

    pub fn not_found(
        keyword: impl Into<String>,
        target_id: impl Into<String>,
        total_results: Option<u64>,
        pages_searched: u32,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            target_id: target_id.into(),
            rank: None,
            page: None,
            total_results,
            found_at: Utc::now(),
            entity: None,
            pages_searched,
        }
    }

    pub fn is_found(&self) -> bool {
        self.rank.is_some()
    }
}
