//! Pull request lifecycle manager.
//!
//! [`ReviewService`] orchestrates every caller-facing operation: roster
//! management (teams, users, review queues, statistics) and the pull request
//! state machine (`OPEN` → `MERGED`) with reviewer assignment and
//! reassignment. Each operation validates its input up front, then runs as a
//! single unit of work through the [`coordinator`](crate::coordinator), so a
//! failure at any step leaves nothing behind.
//!
//! ## Example
//!
//! ```ignore
//! let service = ReviewService::new(InMemoryReviewStore::new());
//! let ctx = RequestContext::background();
//!
//! service.create_team_with_members(&ctx, "backend", &members).await?;
//! let pr = service.create_pull_request(&ctx, pr_id, "Add retries", author_id).await?;
//! assert_eq!(pr.reviewers.len(), 2);
//! ```

mod pull_requests;
mod roster;

use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::context::RequestContext;
use crate::coordinator::Executor;
use crate::error::ReviewError;
use crate::metrics::{NoOpMetrics, ReviewMetrics};
use crate::policy::ReviewerPolicy;
use crate::store::{Queries, ReviewStore};
use crate::types::{User, UserId};

/// The lifecycle manager.
pub struct ReviewService<S: ReviewStore> {
    store: Arc<S>,
    policy: ReviewerPolicy,
    metrics: Arc<dyn ReviewMetrics>,
}

impl<S: ReviewStore> ReviewService<S> {
    /// Create a service with the default policy and no metrics.
    pub fn new(store: S) -> Self {
        Self::with_parts(Arc::new(store), ReviewerPolicy::default(), Arc::new(NoOpMetrics))
    }

    /// Create a service from explicit parts.
    pub fn with_parts(store: Arc<S>, policy: ReviewerPolicy, metrics: Arc<dyn ReviewMetrics>) -> Self {
        Self { store, policy, metrics }
    }

    /// Replace the reviewer policy.
    pub fn with_policy(mut self, policy: ReviewerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn ReviewMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The reviewer policy in effect.
    pub fn policy(&self) -> ReviewerPolicy {
        self.policy
    }

    /// Run `work` in a fresh transaction, counting failures under `operation`.
    async fn transact<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        work: F,
    ) -> Result<T, ReviewError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut dyn Queries) -> BoxFuture<'t, Result<T, ReviewError>> + Send,
    {
        let result = Executor::Store(self.store.as_ref())
            .exec_tx(ctx, self.metrics.as_ref(), work)
            .await;

        if let Err(err) = &result {
            debug!(operation = operation, error = %err, category = ?err.category(), "Operation failed");
            self.metrics.record_failure(operation, err);
        }
        result
    }
}

impl<S: ReviewStore> Clone for ReviewService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Parse a UUID-backed identity, failing with `InvalidInput` on `field`.
fn parse_id<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ReviewError> {
    raw.trim()
        .parse()
        .map_err(|_| ReviewError::invalid(field, format!("not a valid UUID: {:?}", raw)))
}

/// Trim a required string, failing with `InvalidInput` if nothing is left.
fn required(field: &'static str, raw: &str) -> Result<String, ReviewError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReviewError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn user_ids(users: &[User]) -> Vec<UserId> {
    users.iter().map(|u| u.id).collect()
}
