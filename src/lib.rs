//! # place-rank: Rank-Locating Crawler Core
//!
//! Finds where a target listing ranks for a keyword on a paginated,
//! client-rendered search site, while tolerating a flaky, rate-limited
//! upstream.
//!
//! ## Design Principles
//!
//! 1. **Capability-first**: `PageSession` is the contract between the crawler and
//!    whatever drives the browser. One session per rank search, always closed.
//! 2. **Clean DTOs**: `NormalizedGraph`, `RankedEntity`, `RankResult` cross all boundaries
//! 3. **Resolver owns nothing**: graph → ranked list is a pure function
//! 4. **Fail fast, retry cheap**: every page fetch goes through backoff, and
//!    every attempt through the shared circuit breaker
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use place_rank::{CrawlerConfig, RankCrawler, MemorySite};
//!
//! # async fn example() -> place_rank::Result<()> {
//! let crawler = RankCrawler::new(MemorySite::new(), CrawlerConfig::default())?;
//!
//! let result = crawler.find_rank("coffee shop", "12345").await?;
//! match result.rank {
//!     Some(rank) => println!("rank {rank} on page {:?}", result.page),
//!     None => println!("not in the first {} pages", result.pages_searched),
//! }
//!
//! let report = crawler.find_rank_batch(&["coffee", "latte"], "12345").await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! batch ─► locator page loop ─► backoff ─► breaker ─► PageSession::navigate
//!                    │
//!                    └─► PageSession::evaluate_graph ─► resolver ─► RankResult
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod resilience;
pub mod session;
pub mod resolver;
pub mod locator;
pub mod batch;
pub mod extract;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    GraphValue, GraphKey, NormalizedGraph, Resolution, RankedEntity, RankResult,
    CompetitorRecord, CompetitorSet, CompetitorSource,
};

// ============================================================================
// Re-exports: Configuration, sessions, components
// ============================================================================

pub use config::CrawlerConfig;
pub use session::{PageSession, SessionProvider, MemorySite, MemorySession, SitePage};
pub use resilience::{Backoff, CircuitBreaker, CircuitState, BreakerSnapshot};
pub use resolver::{ResolvedPage, ResolutionWarning};
pub use locator::RankCrawler;
pub use batch::{BatchReport, BatchSummary, KeywordOutcome};
pub use extract::CompetitorCollector;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Page load failed or timed out. Transient: retried by backoff.
    #[error("Navigation error for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The breaker is shedding load; the operation was not invoked.
    #[error("Circuit breaker is OPEN (retry in {retry_in:?})")]
    CircuitOpen { retry_in: std::time::Duration },

    #[error("Gave up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<Error> },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Navigation { url: url.into(), message: message.into() }
    }

    /// Whether repeating the same read is likely to help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Navigation { .. } | Error::Timeout(_) | Error::Session(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
