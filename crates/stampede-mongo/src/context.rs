//! Execution Context
//!
//! Deadline-bearing, cancellable context passed by the host into every
//! session operation. Expiry and cancellation abort the in-flight future
//! and surface as `Error::Timeout` / `Error::Cancelled`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use stampede_common::prelude::*;

/// Cancellation and deadline scope for one operation
#[derive(Debug, Clone)]
pub struct ExecContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context that is never cancelled by the caller and has no deadline
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A fresh root context expiring after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// A fresh root context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context cancelled whenever this one is, with the same deadline
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is the earlier of the parent's
    /// and `now + timeout`
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the context is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Drive `fut` to completion unless the context is cancelled or expires
    /// first. An already-cancelled context fails without polling `fut`.
    pub async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(op.to_string()));
        }

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                trace!(op, "Context cancelled");
                Err(Error::Cancelled(op.to_string()))
            }
            _ = expiry => {
                trace!(op, "Context deadline exceeded");
                Err(Error::Timeout(op.to_string()))
            }
            result = fut => result,
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = ExecContext::background();
        let value = ctx.run("op", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_propagates_inner_error() {
        let ctx = ExecContext::background();
        let err = ctx
            .run("op", async { Err::<(), _>(Error::query("rejected")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[tokio::test]
    async fn test_pre_cancelled_does_not_poll() {
        let ctx = ExecContext::background();
        ctx.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let err = ctx
            .run("aggregate", async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled(op) if op == "aggregate"));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_during_run() {
        let ctx = ExecContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = ctx
            .run("op", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(10));
        let err = ctx
            .run("op", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = ExecContext::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_deadline() {
        let parent = ExecContext::with_timeout(Duration::from_millis(100));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let remaining = child.remaining().unwrap();
        assert!(remaining <= Duration::from_millis(100));
        assert!(ExecContext::background().remaining().is_none());
    }

    #[tokio::test]
    async fn test_cancelling_child_leaves_parent() {
        let parent = ExecContext::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
