//! Crawler configuration.
//!
//! Every knob has a documented default, so an empty JSON object is a valid
//! configuration. Durations are written as integer milliseconds.
//!
//! | Setting | Default |
//! |---------|---------|
//! | `timeout` | 30 000 ms |
//! | `maxPages` | 10 |
//! | `resultsPerPage` | 15 |
//! | `retry.attempts` / `retry.baseDelay` | 3 / 2 000 ms |
//! | `breaker.failureThreshold` / `breaker.resetTimeout` | 5 / 60 000 ms |
//! | `batch.concurrency` / `batch.pause` | 3 / 2 000 ms |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Top-level configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlerConfig {
    /// Navigation timeout per page load.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Search depth in pages.
    pub max_pages: u32,
    /// Page size used for start offsets and global rank.
    pub results_per_page: u32,
    pub search: SearchConfig,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub batch: BatchConfig,
    pub extractor: ExtractorConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_pages: 10,
            results_per_page: 15,
            search: SearchConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            batch: BatchConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(Error::Config("maxPages must be at least 1".into()));
        }
        if self.results_per_page == 0 {
            return Err(Error::Config("resultsPerPage must be at least 1".into()));
        }
        if self.retry.attempts == 0 {
            return Err(Error::Config("retry.attempts must be at least 1".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(Error::Config("breaker.failureThreshold must be at least 1".into()));
        }
        if self.batch.concurrency == 0 {
            return Err(Error::Config("batch.concurrency must be at least 1".into()));
        }
        if self.search.list_query_prefix.is_empty() {
            return Err(Error::Config("search.listQueryPrefix must not be empty".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Where to search and how to recognise the list query in the page cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Search-result list URL; `query` and `start` are appended.
    pub list_url: String,
    /// Prefix of the `ROOT_QUERY` field holding the result list.
    pub list_query_prefix: String,
    /// Upper bound on waiting for the page cache to populate.
    #[serde(with = "millis")]
    pub settle_timeout: Duration,
    #[serde(with = "millis")]
    pub settle_poll_interval: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            list_url: "https://m.place.naver.com/restaurant/list".into(),
            list_query_prefix: "restaurantList(".into(),
            settle_timeout: Duration::from_secs(2),
            settle_poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "millis")]
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    pub concurrency: usize,
    /// Wait between chunks; not applied after the last one.
    #[serde(with = "millis")]
    pub pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            pause: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractorConfig {
    /// Leading links in the similar section that are promoted slots.
    /// Site-specific; re-check when the layout changes.
    pub ad_slots: usize,
    /// Maximum records returned per profile.
    pub limit: usize,
    /// Detail page URL; `{id}` is replaced by the place id.
    pub detail_url: String,
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ad_slots: 2,
            limit: 10,
            detail_url: "https://m.place.naver.com/restaurant/{id}/home".into(),
            timeout: Duration::from_secs(20),
        }
    }
}

// ============================================================================
// Duration as milliseconds
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
