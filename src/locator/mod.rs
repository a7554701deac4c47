//! Rank locator: page-by-page search for one target listing.
//!
//! ```text
//! Idle ──► Paging{1} ──► Paging{2} ──► … ──► Found{page}
//!                │                     │
//!                └──── empty page ─────┴──► ExhaustedPages ──► (back to Idle)
//! ```
//!
//! Pages are fetched strictly in order: a match on page N ends the search
//! before page N+1 is requested. Each page load runs through
//! `Backoff → CircuitBreaker → PageSession::navigate`, and the session opened
//! for a search is closed on every exit path.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::{CrawlerConfig, SearchConfig};
use crate::model::*;
use crate::resilience::{Backoff, CircuitBreaker};
use crate::resolver::{self, ResolvedPage};
use crate::session::{PageSession, SessionProvider};
use crate::{Error, Result};

// ============================================================================
// Search state machine
// ============================================================================

#[derive(Debug)]
enum SearchState {
    Idle,
    Paging { page: u32 },
    Found { page: u32, entity: RankedEntity },
    ExhaustedPages { pages_searched: u32 },
}

// ============================================================================
// RankCrawler
// ============================================================================

/// Entry point. Owns the session provider and the guards shared by all
/// searches against its upstream.
pub struct RankCrawler<P: SessionProvider> {
    provider: P,
    config: CrawlerConfig,
    breaker: Arc<CircuitBreaker>,
    backoff: Backoff,
}

impl<P: SessionProvider> RankCrawler<P> {
    pub fn new(provider: P, config: CrawlerConfig) -> Result<Self> {
        let breaker = Arc::new(CircuitBreaker::new(&config.breaker));
        Self::with_breaker(provider, config, breaker)
    }

    /// Share one breaker between crawlers that hit the same upstream.
    pub fn with_breaker(provider: P, config: CrawlerConfig, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        config.validate()?;
        let backoff = Backoff::new(config.retry.clone());
        Ok(Self { provider, config, breaker, backoff })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Result-list URL for `keyword` at 1-based `page`.
    pub fn search_url(&self, keyword: &str, page: u32) -> Result<String> {
        search_url(&self.config.search, keyword, start_offset(page, self.config.results_per_page))
    }

    /// Find where `target_id` ranks for `keyword`.
    ///
    /// `Ok` with `rank == None` when the target is not within `max_pages`;
    /// `Err` when a page could not be loaded at all.
    pub async fn find_rank(&self, keyword: &str, target_id: &str) -> Result<RankResult> {
        self.find_rank_cancellable(keyword, target_id, &CancellationToken::new(), None).await
    }

    /// [`find_rank`](Self::find_rank) bounded by `deadline`.
    pub async fn find_rank_until(&self, keyword: &str, target_id: &str, deadline: Instant) -> Result<RankResult> {
        self.find_rank_cancellable(keyword, target_id, &CancellationToken::new(), Some(deadline)).await
    }

    /// Search that stops promptly on `cancel` or `deadline`, closing its
    /// session either way.
    pub async fn find_rank_cancellable(
        &self,
        keyword: &str,
        target_id: &str,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<RankResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Timeout(std::time::Duration::ZERO));
        }

        let mut session = bounded(deadline, self.provider.open()).await?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            out = bounded(deadline, self.search_pages(&mut session, keyword, target_id)) => out,
        };

        session.close().await;
        outcome
    }

    async fn search_pages(
        &self,
        session: &mut P::Session,
        keyword: &str,
        target_id: &str,
    ) -> Result<RankResult> {
        info!(keyword, target_id, "searching rank");
        let max_pages = self.config.max_pages;
        let mut total = None;
        let mut state = SearchState::Idle;

        loop {
            state = match state {
                SearchState::Idle => SearchState::Paging { page: 1 },
                SearchState::Paging { page } if page > max_pages => {
                    SearchState::ExhaustedPages { pages_searched: max_pages }
                }
                SearchState::Paging { page } => {
                    let resolved = self.fetch_page(session, keyword, page).await?;
                    total = resolved.total.or(total);

                    if resolved.is_empty() {
                        info!(keyword, page, "no results on page; end of list");
                        SearchState::ExhaustedPages { pages_searched: page }
                    } else if let Some(entity) = resolved.find(target_id) {
                        SearchState::Found { page, entity: entity.clone() }
                    } else {
                        debug!(keyword, page, results = resolved.entities.len(), "target not on page");
                        SearchState::Paging { page: page + 1 }
                    }
                }
                SearchState::Found { page, entity } => {
                    let rank = global_rank(page, self.config.results_per_page, entity.local_rank);
                    info!(keyword, target_id, rank, page, "target found");
                    return Ok(RankResult::found(keyword, target_id, rank, page, total, entity));
                }
                SearchState::ExhaustedPages { pages_searched } => {
                    info!(
                        keyword,
                        target_id,
                        pages_searched,
                        depth = u64::from(max_pages) * u64::from(self.config.results_per_page),
                        "target not found within search depth"
                    );
                    return Ok(RankResult::not_found(keyword, target_id, total, pages_searched));
                }
            };
        }
    }

    /// One result page through backoff and breaker.
    async fn fetch_page(&self, session: &mut P::Session, keyword: &str, page: u32) -> Result<ResolvedPage> {
        let url = self.search_url(keyword, page)?;
        let url = url.as_str();
        let session = tokio::sync::Mutex::new(session);
        let session = &session;

        let fetched = self
            .backoff
            .run_while(
                |attempt| async move {
                    debug!(url, attempt, "loading result page");
                    let mut session = session.lock().await;
                    self.breaker.execute(|| self.load_page(&mut **session, url)).await
                },
                Error::is_transient,
            )
            .await;

        fetched.map_err(|err| {
            if err.is_transient() {
                Error::ExhaustedRetries { attempts: self.config.retry.attempts, last: Box::new(err) }
            } else {
                err
            }
        })
    }

    async fn load_page(&self, session: &mut P::Session, url: &str) -> Result<ResolvedPage> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, session.navigate(url, timeout))
            .await
            .map_err(|_| Error::navigation(url, format!("timed out after {timeout:?}")))??;

        let graph = self.settle(session).await?;
        Ok(resolver::resolve_page(&graph, resolver::key_prefix(&self.config.search.list_query_prefix)))
    }

    /// Poll the page cache until the list query shows up or the settle
    /// timeout passes; returns the last snapshot read.
    async fn settle(&self, session: &mut P::Session) -> Result<NormalizedGraph> {
        let search = &self.config.search;
        let settle_deadline = Instant::now() + search.settle_timeout;
        let prefix = resolver::key_prefix(&search.list_query_prefix);

        loop {
            let graph = match tokio::time::timeout_at(settle_deadline, session.evaluate_graph()).await {
                Ok(graph) => graph?,
                Err(_) => return Ok(NormalizedGraph::new()),
            };
            if resolver::has_list_query(&graph, &prefix) || Instant::now() >= settle_deadline {
                return Ok(graph);
            }
            let next_poll = (Instant::now() + search.settle_poll_interval).min(settle_deadline);
            tokio::time::sleep_until(next_poll).await;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 1-based start offset of `page`.
pub fn start_offset(page: u32, results_per_page: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(results_per_page) + 1
}

/// Build the result-list URL with an encoded `query` and `start`.
pub fn search_url(search: &SearchConfig, keyword: &str, start: u64) -> Result<String> {
    let start = start.to_string();
    let url = Url::parse_with_params(&search.list_url, &[("query", keyword), ("start", start.as_str())])?;
    Ok(url.into())
}

async fn bounded<T>(deadline: Option<Instant>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match deadline {
        None => fut.await,
        Some(deadline) => {
            let budget = deadline.saturating_duration_since(Instant::now());
            tokio::time::timeout_at(deadline, fut).await.map_err(|_| Error::Timeout(budget))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_offsets() {
        assert_eq!(start_offset(1, 15), 1);
        assert_eq!(start_offset(2, 15), 16);
        assert_eq!(start_offset(10, 15), 136);
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let url = search_url(&SearchConfig::default(), "coffee shop", 16).unwrap();
        assert_eq!(url, "https://m.place.naver.com/restaurant/list?query=coffee+shop&start=16");
    }

    #[test]
    fn test_search_url_rejects_bad_base() {
        let search = SearchConfig { list_url: "not a url".into(), ..SearchConfig::default() };
        assert!(matches!(search_url(&search, "x", 1), Err(Error::Url(_))));
    }
}
