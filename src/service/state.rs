//! Shared service state.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::context::RequestContext;
use crate::lifecycle::ReviewService;
use crate::metrics::ReviewMetrics;
use crate::policy::ReviewerPolicy;
use crate::store::ReviewStore;

/// Shared service state.
///
/// Holds the lifecycle manager and the per-request deadline applied to
/// every operation.
pub struct ServiceState<S: ReviewStore + 'static> {
    /// The lifecycle manager.
    pub reviews: ReviewService<S>,
    operation_timeout: Option<Duration>,
}

impl<S: ReviewStore + 'static> ServiceState<S> {
    /// Create state around an existing lifecycle manager.
    pub fn new(reviews: ReviewService<S>, operation_timeout: Option<Duration>) -> Self {
        Self { reviews, operation_timeout }
    }

    /// Create state from configuration.
    pub fn from_config(store: S, config: &ServiceConfig, metrics: Arc<dyn ReviewMetrics>) -> Self {
        let reviews = ReviewService::with_parts(
            Arc::new(store),
            ReviewerPolicy::new(config.max_initial_reviewers),
            metrics,
        );
        Self::new(reviews, config.operation_timeout)
    }

    /// A fresh context for one request.
    pub fn request_context(&self) -> RequestContext {
        match self.operation_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }

    /// The per-request deadline, if any.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }
}

impl<S: ReviewStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            reviews: self.reviews.clone(),
            operation_timeout: self.operation_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoOpMetrics;
    use crate::store::InMemoryReviewStore;

    #[test]
    fn test_from_config_applies_policy_and_timeout() {
        let config = ServiceConfig {
            max_initial_reviewers: 1,
            operation_timeout: None,
            ..ServiceConfig::default()
        };
        let state = ServiceState::from_config(InMemoryReviewStore::new(), &config, Arc::new(NoOpMetrics));

        assert_eq!(state.reviews.policy().max_initial_reviewers, 1);
        assert!(state.request_context().deadline().is_none());
    }

    #[test]
    fn test_from_config_caps_reviewer_limit() {
        let config = ServiceConfig {
            max_initial_reviewers: 4,
            ..ServiceConfig::default()
        };
        let state = ServiceState::from_config(InMemoryReviewStore::new(), &config, Arc::new(NoOpMetrics));

        assert_eq!(state.reviews.policy().max_initial_reviewers, 2);
    }

    #[tokio::test]
    async fn test_request_context_carries_deadline() {
        let state = ServiceState::new(
            ReviewService::new(InMemoryReviewStore::new()),
            Some(Duration::from_secs(2)),
        );
        assert!(state.request_context().deadline().is_some());
    }
}
