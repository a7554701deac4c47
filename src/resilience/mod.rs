//! # Failure isolation for upstream calls
//!
//! Two guards wrap every page fetch:
//!
//! | Guard | Module | Role |
//! |-------|--------|------|
//! | `Backoff` | `backoff` | bounded retries with exponential, jittered waits |
//! | `CircuitBreaker` | `breaker` | sheds load once the upstream keeps failing |
//!
//! Composition is backoff outside, breaker inside: every retry attempt passes
//! the breaker's gate again, and `Error::CircuitOpen` is not transient, so an
//! open circuit ends the remaining retries at once.

pub mod backoff;
pub mod breaker;

pub use backoff::Backoff;
pub use breaker::{CircuitBreaker, CircuitState, BreakerSnapshot};
