//! # Page Session Capability
//!
//! This is THE contract between the crawler and whatever renders pages
//! (a headless browser driver, a recorded fixture, an in-memory site).
//!
//! ## Implementations
//!
//! | Provider | Module | Description |
//! |----------|--------|-------------|
//! | `MemorySite` | `memory` | Scripted pages for testing/embedding |
//!
//! A browser-backed provider implements the same two traits: `open()` creates
//! a tab, `evaluate_graph()` reads `window.__APOLLO_STATE__` and hands the JSON
//! to [`NormalizedGraph::from_json`].

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::model::NormalizedGraph;
use crate::Result;

pub use memory::{MemorySite, MemorySession, SitePage};

/// One browser tab (or equivalent), owned by exactly one rank search.
#[async_trait]
pub trait PageSession: Send {
    /// Load `url`. Fails with `Error::Navigation` on network failure or when
    /// `timeout` elapses.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Read the page's embedded normalized cache as it is right now.
    async fn evaluate_graph(&mut self) -> Result<NormalizedGraph>;

    /// Rendered DOM as HTML.
    async fn content(&mut self) -> Result<String>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Release the session. Idempotent, never fails.
    async fn close(&mut self);
}

/// Opens fresh sessions against one upstream.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    type Session: PageSession;

    async fn open(&self) -> Result<Self::Session>;
}
