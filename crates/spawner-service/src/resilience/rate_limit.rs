//! Token bucket rate limiting
//!
//! One bucket guards one operation kind. A call that finds no token is
//! rejected immediately; nothing queues.

use super::lock;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Bucket size and refill rate
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum tokens held (burst size)
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            refill_per_sec: 1.0,
        }
    }
}

/// Result of a rate limit check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    RateLimited {
        /// Time until the next token is available
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::RateLimited { retry_after } => Some(*retry_after),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity as f64);
        self.last_update = now;
    }

    fn try_consume(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_next_token(&self, config: &RateLimitConfig) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else if config.refill_per_sec <= 0.0 {
            Duration::MAX
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / config.refill_per_sec)
        }
    }
}

/// Shared, internally synchronized token bucket
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// A limiter that starts with a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = Mutex::new(TokenBucket::full(&config));
        Self { config, bucket }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token if available
    pub fn check(&self) -> RateLimitResult {
        let mut bucket = lock(&self.bucket);
        if bucket.try_consume(&self.config, Instant::now()) {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::RateLimited {
                retry_after: bucket.time_until_next_token(&self.config),
            }
        }
    }
}
