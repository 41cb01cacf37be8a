//! Long-running operation bridge
//!
//! Providers answer create/update/delete calls with a handle that reaches a
//! terminal state only after further polling. [`LroBridge::wait`] turns that
//! into a single awaited call: it polls the handle at a bounded cadence and
//! returns once the operation succeeds, fails, or the caller's context is
//! canceled. A canceled wait leaves the provider-side operation running.

use crate::context::CallContext;
use crate::error::{Result, SpawnerError};
use async_trait::async_trait;
use std::time::Duration;

/// Snapshot of a provider operation after one poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Still running; the optional duration is the provider's retry hint
    InProgress(Option<Duration>),
    Succeeded(T),
    Failed(String),
    Canceled(String),
}

/// Provider-native handle to an in-flight operation
#[async_trait]
pub trait LongRunningOperation: Send {
    type Output: Send;

    /// Query the provider once for the current operation state
    async fn poll(&mut self) -> Result<PollStatus<Self::Output>>;
}

#[async_trait]
impl<O> LongRunningOperation for Box<O>
where
    O: LongRunningOperation + ?Sized,
{
    type Output = O::Output;

    async fn poll(&mut self) -> Result<PollStatus<Self::Output>> {
        (**self).poll().await
    }
}

/// Handle for providers that answer synchronously; already terminal
pub struct Completed<T>(Option<T>);

impl<T> Completed<T> {
    pub fn new(value: T) -> Self {
        Self(Some(value))
    }
}

#[async_trait]
impl<T: Send> LongRunningOperation for Completed<T> {
    type Output = T;

    async fn poll(&mut self) -> Result<PollStatus<T>> {
        self.0
            .take()
            .map(PollStatus::Succeeded)
            .ok_or_else(|| {
                SpawnerError::ProviderRejected("operation result already consumed".to_string())
            })
    }
}

/// Lifecycle of one bridged operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Canceled,
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Submitted => write!(f, "submitted"),
            OperationState::Polling => write!(f, "polling"),
            OperationState::Succeeded => write!(f, "succeeded"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Poll cadence for the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between polls when the provider gives no hint
    pub interval: Duration,

    /// Upper bound applied to provider retry hints
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl PollConfig {
    /// Delay before the next poll given the provider's hint
    pub fn delay(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(h) if !h.is_zero() => h.min(self.max_interval),
            _ => self.interval.min(self.max_interval),
        }
    }
}

/// Blocks a call on a provider operation handle until it is terminal
#[derive(Debug, Clone, Default)]
pub struct LroBridge {
    config: PollConfig,
}

impl LroBridge {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Wait for `op` to finish, honoring `ctx` between and during polls.
    ///
    /// `what` names the operation in logs and error messages.
    pub async fn wait<O>(&self, ctx: &CallContext, what: &str, mut op: O) -> Result<O::Output>
    where
        O: LongRunningOperation,
    {
        let mut state = OperationState::Submitted;
        let mut polls: u32 = 0;

        loop {
            if let Err(err) = ctx.check() {
                tracing::info!(operation = what, polls, "abandoning wait: {}", err);
                return Err(err);
            }

            let status = match ctx.run(op.poll()).await {
                Ok(status) => status,
                Err(err) => {
                    if matches!(err, SpawnerError::OperationCanceled(_)) {
                        tracing::info!(operation = what, polls, "abandoning wait: {}", err);
                    }
                    return Err(err);
                }
            };
            polls += 1;

            match status {
                PollStatus::Succeeded(output) => {
                    transition(what, &mut state, OperationState::Succeeded);
                    tracing::info!(operation = what, polls, "operation completed");
                    return Ok(output);
                }
                PollStatus::Failed(detail) => {
                    transition(what, &mut state, OperationState::Failed);
                    tracing::warn!(operation = what, polls, "operation failed: {}", detail);
                    return Err(SpawnerError::ProviderRejected(format!(
                        "{} failed: {}",
                        what, detail
                    )));
                }
                PollStatus::Canceled(detail) => {
                    transition(what, &mut state, OperationState::Canceled);
                    tracing::warn!(operation = what, polls, "operation canceled by provider");
                    return Err(SpawnerError::ProviderRejected(format!(
                        "{}: operation canceled by provider: {}",
                        what, detail
                    )));
                }
                PollStatus::InProgress(hint) => {
                    transition(what, &mut state, OperationState::Polling);
                    let delay = self.config.delay(hint);
                    tracing::debug!(operation = what, polls, ?delay, "operation in progress");

                    tokio::select! {
                        biased;
                        err = ctx.done() => {
                            tracing::info!(operation = what, polls, "abandoning wait: {}", err);
                            return Err(err);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

fn transition(what: &str, state: &mut OperationState, next: OperationState) {
    if *state != next {
        tracing::debug!(operation = what, from = %state, to = %next, "operation state change");
        *state = next;
    }
}
