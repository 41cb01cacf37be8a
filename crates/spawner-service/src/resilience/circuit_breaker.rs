//! Circuit breaker
//!
//! `Closed -> Open -> HalfOpen -> Closed`. Outcomes are attributed to the
//! generation they were admitted in, so a slow call that finishes after the
//! breaker changed state cannot skew the new state's counts.

use super::lock;
use spawner_cloud::{Result, SpawnerError};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed,
    /// Tripped; requests fail fast without reaching the provider
    Open,
    /// Admitting a limited number of trial requests
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Failure ratio over the counting window that trips the breaker
    pub failure_ratio: Option<f64>,
    /// Requests needed in the window before the ratio is considered
    pub min_requests: u32,
    /// Closed-state counting window; counts never reset when `None`
    pub interval: Option<Duration>,
    /// How long the breaker stays open before admitting trial calls
    pub open_timeout: Duration,
    /// Trial calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_ratio: None,
            min_requests: 10,
            interval: None,
            open_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

/// How a finished call counts toward the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Neither success nor failure; only releases the admission slot
    Ignored,
}

impl Outcome {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_dependency_failure() => Outcome::Failure,
            Err(_) => Outcome::Ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_success(&mut self) {
        self.successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn on_ignored(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// Open: when to go half-open. Closed: when the window resets.
    expiry: Option<Instant>,
}

/// Per-operation circuit breaker shared by concurrent callers
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Admission ticket for one call. Dropping it unrecorded releases the slot.
#[must_use = "record the call outcome on the permit"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    recorded: bool,
}

impl Permit<'_> {
    pub fn record(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.after_request(self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.after_request(self.generation, Outcome::Ignored);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let expiry = config.interval.map(|i| Instant::now() + i);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any timed transition first
    pub fn state(&self) -> CircuitState {
        let mut inner = lock(&self.inner);
        self.current_state(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = lock(&self.inner);
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Admit a call or fail fast with `CircuitOpen`
    pub fn try_acquire(&self) -> Result<Permit<'_>> {
        let mut inner = lock(&self.inner);
        let now = Instant::now();
        self.current_state(&mut inner, now);

        match inner.state {
            CircuitState::Open => {
                return Err(SpawnerError::CircuitOpen(self.name.clone()));
            }
            CircuitState::HalfOpen if inner.counts.requests >= self.config.half_open_max_calls => {
                return Err(SpawnerError::CircuitOpen(format!(
                    "{} (half-open trial in progress)",
                    self.name
                )));
            }
            _ => {}
        }

        inner.counts.requests += 1;
        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            recorded: false,
        })
    }

    /// Run `fut` under the breaker and record its outcome
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let permit = self.try_acquire()?;
        let result = fut.await;
        permit.record(Outcome::of(&result));
        result
    }

    fn after_request(&self, generation: u64, outcome: Outcome) {
        let mut inner = lock(&self.inner);
        let now = Instant::now();
        self.current_state(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match outcome {
            Outcome::Success => self.on_success(&mut inner, now),
            Outcome::Failure => self.on_failure(&mut inner, now),
            Outcome::Ignored => inner.counts.on_ignored(),
        }
    }

    fn on_success(&self, inner: &mut BreakerState, now: Instant) {
        inner.counts.on_success();
        if inner.state == CircuitState::HalfOpen
            && inner.counts.consecutive_successes >= self.config.half_open_max_calls
        {
            self.set_state(inner, CircuitState::Closed, now);
        }
    }

    fn on_failure(&self, inner: &mut BreakerState, now: Instant) {
        inner.counts.on_failure();
        match inner.state {
            CircuitState::Closed if self.ready_to_trip(&inner.counts) => {
                tracing::warn!(
                    breaker = %self.name,
                    consecutive_failures = inner.counts.consecutive_failures,
                    failures = inner.counts.failures,
                    requests = inner.counts.requests,
                    "circuit tripped"
                );
                self.set_state(inner, CircuitState::Open, now);
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "trial call failed, reopening circuit");
                self.set_state(inner, CircuitState::Open, now);
            }
            _ => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.consecutive_failures >= self.config.failure_threshold {
            return true;
        }
        match self.config.failure_ratio {
            Some(ratio) if counts.requests >= self.config.min_requests && counts.requests > 0 => {
                counts.failures as f64 / counts.requests as f64 >= ratio
            }
            _ => false,
        }
    }

    /// Apply timed transitions: open timeout and closed window reset
    fn current_state(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|e| e <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|e| e <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn set_state(&self, inner: &mut BreakerState, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }
        let prev = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        match state {
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, from = %prev, "circuit closed");
            }
            _ => {
                tracing::debug!(breaker = %self.name, from = %prev, to = %state, "circuit state change");
            }
        }
    }

    fn new_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => self.config.interval.map(|i| now + i),
            CircuitState::Open => Some(now + self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> Result<()> {
        Err(SpawnerError::ProviderUnavailable("503".to_string()))
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<()> {
        breaker.call(async { unavailable() }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("create_cluster", CircuitBreakerConfig::default());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.call(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, SpawnerError::CircuitOpen(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("get_cluster", CircuitBreakerConfig::default());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        breaker.call(async { Ok(()) }).await.unwrap();
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("delete_cluster", CircuitBreakerConfig::default());
        for _ in 0..10 {
            let _ = breaker
                .call(async { Err::<(), _>(SpawnerError::ResourceNotFound("demo".into())) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts().requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_closes_on_success() {
        let breaker = CircuitBreaker::new("add_node", CircuitBreakerConfig::default());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.call(async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("add_node", CircuitBreakerConfig::default());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_limited_trials() {
        let breaker = CircuitBreaker::new("get_token", CircuitBreakerConfig::default());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(matches!(
            breaker.try_acquire(),
            Err(SpawnerError::CircuitOpen(_))
        ));

        // Dropping an unrecorded permit frees the slot.
        drop(trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let trial = breaker.try_acquire().unwrap();
        trial.record(Outcome::Success);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_ratio_trips() {
        let breaker = CircuitBreaker::new(
            "get_clusters",
            CircuitBreakerConfig {
                failure_threshold: 100,
                failure_ratio: Some(0.5),
                min_requests: 4,
                ..Default::default()
            },
        );
        breaker.call(async { Ok(()) }).await.unwrap();
        let _ = fail(&breaker).await;
        breaker.call(async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_resets_counts() {
        let breaker = CircuitBreaker::new(
            "cluster_status",
            CircuitBreakerConfig {
                interval: Some(Duration::from_secs(10)),
                ..Default::default()
            },
        );
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.counts(), Counts::default());

        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_outcome_is_dropped() {
        let breaker = CircuitBreaker::new("delete_node", CircuitBreakerConfig::default());
        let slow = breaker.try_acquire().unwrap();
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(60)).await;

        // Admitted while closed; must not close the half-open breaker.
        slow.record(Outcome::Success);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }
}
