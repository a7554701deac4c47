//! A ranked listing resolved from one result page.

use serde::{Deserialize, Serialize};

/// One entity in a page of search results.
///
/// `local_rank` is the 1-based position within its page, counted over
/// resolved entries only. It carries no cross-page meaning until
/// [`global_rank`] combines it with the page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntity {
    pub id: String,
    pub name: String,
    pub category: String,
    pub rating: f64,
    pub review_count: u64,
    pub address: String,
    pub local_rank: u32,
}

/// Position across the whole result set: `(page - 1) * page_size + local_rank`.
pub fn global_rank(page: u32, page_size: u32, local_rank: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size) + u64::from(local_rank)
}
