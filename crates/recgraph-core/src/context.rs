//! Cancellation context
//!
//! Every operation that reaches the storage engine takes a `Context`.
//! Cancelling the token or passing the deadline aborts the in-flight call
//! with `RecgraphError::Cancelled` / `RecgraphError::DeadlineExceeded`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{RecgraphError, Result};

/// Cancellation token plus optional deadline
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled on its own
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Child context sharing cancellation with its parent and bounded by `timeout`
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Underlying token, for callers that want to wire it into their own tasks
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast when the context is already done
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(RecgraphError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(RecgraphError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run a future, racing it against cancellation and the deadline
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RecgraphError::Cancelled),
            _ = deadline => Err(RecgraphError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let ctx = Context::background();
        ctx.cancel();
        let err = ctx.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, RecgraphError::Cancelled));
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_call() {
        let ctx = Context::with_timeout(Duration::from_millis(10));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecgraphError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = Context::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(matches!(child.check(), Err(RecgraphError::Cancelled)));
    }
}
