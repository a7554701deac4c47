//! Batch orchestrator: many keywords, one target.
//!
//! Keywords run in sequential chunks of `concurrency`; members of a chunk run
//! concurrently, and the orchestrator waits `pause` between chunks (not after
//! the last). A keyword whose search fails becomes a
//! [`KeywordOutcome::Failed`] record; it never aborts the batch.

use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::locator::RankCrawler;
use crate::model::RankResult;
use crate::session::SessionProvider;
use crate::Error;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one keyword in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeywordOutcome {
    /// The search completed; `rank` may still be `None` (not found).
    Ranked(RankResult),
    Failed { keyword: String, error: String },
}

impl KeywordOutcome {
    pub fn keyword(&self) -> &str {
        match self {
            KeywordOutcome::Ranked(r) => &r.keyword,
            KeywordOutcome::Failed { keyword, .. } => keyword,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, KeywordOutcome::Ranked(_))
    }

    pub fn result(&self) -> Option<&RankResult> {
        match self {
            KeywordOutcome::Ranked(r) => Some(r),
            KeywordOutcome::Failed { .. } => None,
        }
    }

    fn from_search(keyword: &str, outcome: Result<RankResult, Error>) -> Self {
        match outcome {
            Ok(result) => KeywordOutcome::Ranked(result),
            Err(err) => KeywordOutcome::Failed { keyword: keyword.to_owned(), error: err.to_string() },
        }
    }
}

/// Derived counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.found + self.not_found + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} found, {} not found, {} failed", self.found, self.not_found, self.failed)
    }
}

/// All outcomes of a batch, grouped by chunk in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub chunks: Vec<Vec<KeywordOutcome>>,
}

impl BatchReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &KeywordOutcome> {
        self.chunks.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, keyword: &str) -> Option<&KeywordOutcome> {
        self.outcomes().find(|o| o.keyword() == keyword)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for outcome in self.outcomes() {
            match outcome {
                KeywordOutcome::Ranked(r) if r.is_found() => summary.found += 1,
                KeywordOutcome::Ranked(_) => summary.not_found += 1,
                KeywordOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

// ============================================================================
// Orchestration
// ============================================================================

impl<P: SessionProvider> RankCrawler<P> {
    /// Rank `target_id` for every keyword, using the configured concurrency.
    pub async fn find_rank_batch<S: AsRef<str>>(&self, keywords: &[S], target_id: &str) -> BatchReport {
        let concurrency = self.config().batch.concurrency;
        self.find_rank_batch_with(keywords, target_id, concurrency, &CancellationToken::new(), None)
            .await
    }

    /// Batch with explicit concurrency, cancellation and deadline.
    ///
    /// Cancelling `cancel` (or reaching `deadline`) fails the in-flight chunk
    /// members promptly and marks every keyword not yet started as failed.
    pub async fn find_rank_batch_with<S: AsRef<str>>(
        &self,
        keywords: &[S],
        target_id: &str,
        concurrency: usize,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> BatchReport {
        let concurrency = concurrency.max(1);
        let pause = self.config().batch.pause;
        let chunk_count = keywords.len().div_ceil(concurrency);
        info!(keywords = keywords.len(), concurrency, chunks = chunk_count, "starting batch rank search");

        let mut report = BatchReport::default();
        for (index, chunk) in keywords.chunks(concurrency).enumerate() {
            let searches = chunk.iter().map(|keyword| {
                let keyword = keyword.as_ref();
                async move {
                    let outcome = self.find_rank_cancellable(keyword, target_id, cancel, deadline).await;
                    KeywordOutcome::from_search(keyword, outcome)
                }
            });
            report.chunks.push(join_all(searches).await);

            let is_last = index + 1 == chunk_count;
            if !is_last {
                debug!(chunk = index + 1, pause_ms = pause.as_millis() as u64, "chunk complete; pausing");
                if !self.pace(pause, cancel, deadline).await {
                    debug!(chunk = index + 1, "batch stopped early");
                }
            }
        }

        let summary = report.summary();
        info!(
            found = summary.found,
            not_found = summary.not_found,
            failed = summary.failed,
            "batch rank search completed"
        );
        report
    }

    /// Inter-chunk wait; returns false when cut short by cancel or deadline.
    async fn pace(&self, pause: Duration, cancel: &CancellationToken, deadline: Option<Instant>) -> bool {
        let wake = Instant::now() + pause;
        let wake = deadline.map_or(wake, |d| wake.min(d));
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep_until(wake) => deadline.is_none_or(|d| Instant::now() < d),
        }
    }
}
