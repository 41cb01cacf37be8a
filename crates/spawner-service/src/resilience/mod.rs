//! Per-operation resilience: rate limiting in front of circuit breaking

pub mod circuit_breaker;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, Outcome, Permit};
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};

use std::sync::{Mutex, MutexGuard};

/// Lock policy state. State stays consistent across a panicking holder, so a
/// poisoned lock is taken over rather than propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
