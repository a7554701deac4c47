//! Circuit breaker guarding the search upstream.
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive_failures >= failure_threshold
//! Open → HalfOpen:    reset_timeout elapsed since opened_at (next caller is the trial)
//! HalfOpen → Closed:  trial succeeds (consecutive_failures = 0)
//! HalfOpen → Open:    trial fails (opened_at = now)
//! ```
//!
//! One breaker is shared by every rank search against the same upstream, so
//! all transitions happen under one mutex. While a half-open trial is in
//! flight, every other caller is rejected as if the circuit were open.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
        }
    }

    /// Run `op` through the breaker.
    ///
    /// Returns `Error::CircuitOpen` without calling `op` while the circuit is
    /// open (or a half-open trial is already running). Errors from `op` are
    /// returned unchanged after being counted.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.admit()?;
        match op().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                permit.fail();
                Err(err)
            }
        }
    }

    fn admit(&self) -> Result<Permit<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(self.reset_timeout);
                if elapsed < self.reset_timeout {
                    return Err(Error::CircuitOpen { retry_in: self.reset_timeout - elapsed });
                }
                info!("circuit half-open; admitting one trial call");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen if inner.trial_in_flight => {
                Err(Error::CircuitOpen { retry_in: Duration::ZERO })
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            info!("trial call succeeded; circuit closed");
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!("trial call failed; circuit re-opened");
        } else if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                failures = inner.consecutive_failures,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "failure threshold reached; circuit opened"
            );
        }
    }
}

/// Admission ticket for one call.
///
/// A trial permit dropped without an outcome (the call's future was
/// cancelled) counts as a failed trial, so the breaker never stays stuck
/// half-open with no trial running.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self { breaker, trial, settled: false }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.on_failure(true);
        }
    }
}
