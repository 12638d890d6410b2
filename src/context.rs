//! Per-request deadline and cancellation.
//!
//! Every lifecycle operation takes a [`RequestContext`]. The coordinator
//! races the unit of work against the context; whichever fires first wins,
//! and a fired context rolls the open transaction back.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;

/// Deadline and cancellation signal supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// A context that never expires and is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// Set an absolute deadline, keeping the earlier one if already set.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Use `token` as the cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the context has already fired.
    pub fn check(&self) -> Result<(), ReviewError> {
        if self.cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ReviewError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context fires first.
    ///
    /// When the context fires, `fut` is dropped before this returns.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ReviewError>
    where
        F: std::future::Future<Output = T>,
    {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReviewError::Cancelled),
            _ = expired => Err(ReviewError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
