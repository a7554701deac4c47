//! In-memory page provider.
//!
//! This is the reference implementation of `PageSession`.
//! Pages are registered per URL; anything else navigates to a blank page.
//!
//! ## Scripting
//!
//! - **Failures**: `fail_navigations()` makes navigations to matching URLs fail
//!   a fixed number of times (or always), to exercise retry and breaker paths.
//! - **Late population**: `SitePage::populated_after()` returns an empty cache
//!   for the first N reads after navigation, like a client-rendered page.
//! - **Latency**: `set_latency()` delays every navigation; latency beyond the
//!   caller's timeout fails the navigation.
//!
//! Counters record navigations and session open/close so tests can assert
//! exact fetch counts and guaranteed release.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::model::NormalizedGraph;
use crate::{Error, Result};
use super::{PageSession, SessionProvider};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// ============================================================================
// SitePage
// ============================================================================

/// What a URL renders to.
#[derive(Debug, Clone, Default)]
pub struct SitePage {
    pub graph: NormalizedGraph,
    pub html: String,
    /// Cache reads that come back empty before the graph appears.
    pub empty_reads: u32,
}

impl SitePage {
    pub fn with_graph(graph: NormalizedGraph) -> Self {
        Self { graph, ..Self::default() }
    }

    pub fn with_html(html: impl Into<String>) -> Self {
        Self { html: html.into(), ..Self::default() }
    }

    pub fn populated_after(mut self, empty_reads: u32) -> Self {
        self.empty_reads = empty_reads;
        self
    }
}

// ============================================================================
// MemorySite
// ============================================================================

struct FailureRule {
    url_contains: String,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Scripted upstream. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemorySite {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    pages: RwLock<HashMap<String, SitePage>>,
    failures: Mutex<Vec<FailureRule>>,
    latency: RwLock<Option<Duration>>,
    /// Every navigated URL, in order.
    history: Mutex<Vec<String>>,
    navigations: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_page(&self, url: impl Into<String>, page: SitePage) {
        self.inner.pages.write().insert(url.into(), page);
    }

    /// Fail the next `times` navigations whose URL contains `url_contains`.
    pub fn fail_navigations(&self, url_contains: impl Into<String>, times: u32) {
        self.inner.failures.lock().push(FailureRule {
            url_contains: url_contains.into(),
            remaining: Some(times),
        });
    }

    /// Fail every navigation whose URL contains `url_contains`.
    pub fn fail_always(&self, url_contains: impl Into<String>) {
        self.inner.failures.lock().push(FailureRule {
            url_contains: url_contains.into(),
            remaining: None,
        });
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.write() = Some(latency);
    }

    pub fn navigations(&self) -> u64 {
        self.inner.navigations.load(Ordering::SeqCst)
    }

    /// Navigations whose URL contains `needle`.
    pub fn navigations_matching(&self, needle: &str) -> usize {
        self.inner.history.lock().iter().filter(|u| u.contains(needle)).count()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u64 {
        self.inner.sessions_closed.load(Ordering::SeqCst)
    }

    fn take_failure(&self, url: &str) -> bool {
        let mut rules = self.inner.failures.lock();
        for rule in rules.iter_mut() {
            if !url.contains(&rule.url_contains) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return true,
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl SessionProvider for MemorySite {
    type Session = MemorySession;

    async fn open(&self) -> Result<MemorySession> {
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            site: self.clone(),
            current: None,
            reads: 0,
            closed: false,
        })
    }
}

// ============================================================================
// MemorySession
// ============================================================================

pub struct MemorySession {
    site: MemorySite,
    current: Option<String>,
    /// Cache reads since the last navigation.
    reads: u32,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Session("session already closed".into()));
        }
        Ok(())
    }

    fn current_page(&self) -> Option<SitePage> {
        let url = self.current.as_ref()?;
        self.site.inner.pages.read().get(url).cloned()
    }
}

#[async_trait]
impl PageSession for MemorySession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let inner = &self.site.inner;
        inner.navigations.fetch_add(1, Ordering::SeqCst);
        inner.history.lock().push(url.to_owned());

        let latency = *inner.latency.read();
        if let Some(latency) = latency {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(Error::navigation(url, format!("timed out after {timeout:?}")));
            }
            tokio::time::sleep(latency).await;
        }

        if self.site.take_failure(url) {
            return Err(Error::navigation(url, "net::ERR_CONNECTION_RESET"));
        }

        self.current = Some(url.to_owned());
        self.reads = 0;
        Ok(())
    }

    async fn evaluate_graph(&mut self) -> Result<NormalizedGraph> {
        self.ensure_open()?;
        let Some(page) = self.current_page() else {
            return Ok(NormalizedGraph::new());
        };
        self.reads += 1;
        if self.reads <= page.empty_reads {
            return Ok(NormalizedGraph::new());
        }
        Ok(page.graph)
    }

    async fn content(&mut self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.current_page().map(|p| p.html).unwrap_or_default())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Ok(PNG_SIGNATURE.to_vec())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.site.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GraphValue;

    fn graph() -> NormalizedGraph {
        NormalizedGraph::new().with_record("Place:1", [("name", GraphValue::from("Cafe"))])
    }

    #[tokio::test]
    async fn test_unknown_url_is_blank() {
        let site = MemorySite::new();
        let mut s = site.open().await.unwrap();
        s.navigate("https://example.test/x", Duration::from_secs(1)).await.unwrap();
        assert!(s.evaluate_graph().await.unwrap().is_empty());
        assert_eq!(s.content().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_registered_page() {
        let site = MemorySite::new();
        site.put_page("u1", SitePage::with_graph(graph()));
        let mut s = site.open().await.unwrap();
        s.navigate("u1", Duration::from_secs(1)).await.unwrap();
        assert_eq!(s.evaluate_graph().await.unwrap(), graph());
        assert_eq!(site.navigations(), 1);
    }

    #[tokio::test]
    async fn test_late_population() {
        let site = MemorySite::new();
        site.put_page("u1", SitePage::with_graph(graph()).populated_after(2));
        let mut s = site.open().await.unwrap();
        s.navigate("u1", Duration::from_secs(1)).await.unwrap();
        assert!(s.evaluate_graph().await.unwrap().is_empty());
        assert!(s.evaluate_graph().await.unwrap().is_empty());
        assert!(!s.evaluate_graph().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures_run_out() {
        let site = MemorySite::new();
        site.fail_navigations("u1", 2);
        let mut s = site.open().await.unwrap();
        assert!(s.navigate("u1", Duration::from_secs(1)).await.is_err());
        assert!(s.navigate("u1", Duration::from_secs(1)).await.is_err());
        assert!(s.navigate("u1", Duration::from_secs(1)).await.is_ok());
        assert!(s.navigate("u2", Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_beyond_timeout_fails() {
        let site = MemorySite::new();
        site.set_latency(Duration::from_secs(5));
        let mut s = site.open().await.unwrap();
        let err = s.navigate("u1", Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_screenshot_is_png() {
        let site = MemorySite::new();
        let mut s = site.open().await.unwrap();
        s.navigate("u1", Duration::from_secs(1)).await.unwrap();
        assert!(s.screenshot().await.unwrap().starts_with(&PNG_SIGNATURE));
        s.close().await;
        assert!(s.screenshot().await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let site = MemorySite::new();
        let mut s = site.open().await.unwrap();
        s.close().await;
        s.close().await;
        assert_eq!(site.sessions_opened(), 1);
        assert_eq!(site.sessions_closed(), 1);
        assert!(s.navigate("u1", Duration::from_secs(1)).await.is_err());
    }
}
