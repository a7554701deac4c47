//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Retry executor.
///
/// The wait after failed attempt `n` is `base_delay * 2^(n-1)`, plus jitter in
/// `[0, base_delay / 2)` when enabled, clamped to `max_delay`. The jitter bound
/// keeps waits non-decreasing from one attempt to the next.
pub struct Backoff {
    policy: RetryConfig,
    rng: Mutex<StdRng>,
}

impl Backoff {
    pub fn new(policy: RetryConfig) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests.
    pub fn with_rng(policy: RetryConfig, rng: StdRng) -> Self {
        Self { policy, rng: Mutex::new(rng) }
    }

    /// Un-jittered wait after failed attempt `attempt` (1-based).
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.policy
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay)
    }

    /// Wait after failed attempt `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        let spread = self.policy.base_delay.as_millis() as u64 / 2;
        if !self.policy.jitter || spread == 0 {
            return base;
        }
        let jitter_ms = self.rng.lock().gen_range(0..spread);
        (base + Duration::from_millis(jitter_ms)).min(self.policy.max_delay)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(op, |_| true).await
    }

    /// Like [`run`](Self::run), but errors for which `retryable` is false are
    /// returned immediately without waiting.
    pub async fn run_while<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts || !retryable(&err) => {
                    debug!(attempt, max_attempts, error = %err, "giving up");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
