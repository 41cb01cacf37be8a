//! Cancellable, deadline-bearing execution context for a single call

use crate::error::{Result, SpawnerError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context threaded through every canonical operation.
///
/// Cloning yields a handle to the same cancellation state; `child()` derives
/// a context that is canceled with its parent but can also be canceled alone.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context with no deadline
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_after(timeout)
    }

    /// Tighten the deadline; an earlier existing deadline is kept
    pub fn deadline_after(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns the cancellation error if the context is already done
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(SpawnerError::OperationCanceled(
                "call was canceled".to_string(),
            ));
        }
        if self.is_expired() {
            return Err(SpawnerError::OperationCanceled(
                "call deadline exceeded".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> SpawnerError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {
                        SpawnerError::OperationCanceled("call was canceled".to_string())
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        SpawnerError::OperationCanceled("call deadline exceeded".to_string())
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                SpawnerError::OperationCanceled("call was canceled".to_string())
            }
        }
    }

    /// Race `fut` against cancellation. The future is dropped, aborting any
    /// outstanding request it owns, if the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_before_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let out = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(42)
            })
            .await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_hits_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        let out: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(out, Err(SpawnerError::OperationCanceled(_))));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = CallContext::new();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(child.is_canceled());
        tokio_test::assert_err!(child.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_tightens() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1))
            .deadline_after(Duration::from_secs(30));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(1));
    }
}
