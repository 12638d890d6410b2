//! Metrics sink injected into the lifecycle manager and coordinator.
//!
//! ## Metrics Emitted
//!
//! - `pr_created_total` - pull requests created
//! - `pr_merged_total` - first-time merges (idempotent repeats excluded)
//! - `reviewer_assigned_total` - reviewers assigned at creation
//! - `reviewer_reassigned_total` - successful reassignments
//! - `tx_committed_total` / `tx_rolled_back_total` - transaction outcomes
//! - `operation_failed_total` - failed operations, labelled by `operation` and `category`

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{ErrorCategory, ReviewError};

/// Pull requests created.
pub const PR_CREATED: &str = "pr_created_total";
/// First-time merges.
pub const PR_MERGED: &str = "pr_merged_total";
/// Reviewers assigned at creation.
pub const REVIEWER_ASSIGNED: &str = "reviewer_assigned_total";
/// Successful reassignments.
pub const REVIEWER_REASSIGNED: &str = "reviewer_reassigned_total";
/// Committed transactions.
pub const TX_COMMITTED: &str = "tx_committed_total";
/// Rolled back transactions.
pub const TX_ROLLED_BACK: &str = "tx_rolled_back_total";
/// Failed operations.
pub const OPERATION_FAILED: &str = "operation_failed_total";

/// Sink for counters.
pub trait ReviewMetrics: Send + Sync {
    /// Increment a counter by `by`.
    fn add(&self, metric_name: &str, labels: &[(&str, &str)], by: u64);

    /// Increment a counter by 1.
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        self.add(metric_name, labels, 1);
    }

    /// Record a failed operation.
    fn record_failure(&self, operation: &str, error: &ReviewError) {
        let category = match error.category() {
            ErrorCategory::AlreadyExists => "already_exists",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::StoreFailure => "store_failure",
        };
        self.increment(OPERATION_FAILED, &[("operation", operation), ("category", category)]);
    }
}

/// No-op metrics implementation.
#[derive(Debug, Default)]
pub struct NoOpMetrics;

impl ReviewMetrics for NoOpMetrics {
    fn add(&self, _metric_name: &str, _labels: &[(&str, &str)], _by: u64) {}
}

/// Metrics emitted as tracing events, aggregated from logs downstream.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl ReviewMetrics for TracingMetrics {
    fn add(&self, metric_name: &str, labels: &[(&str, &str)], by: u64) {
        info!(
            target: "pr_reviewer::metrics",
            metric = metric_name,
            labels = ?labels,
            value = by,
            "counter_metric"
        );
    }
}

/// In-memory metrics for testing.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values keyed by metric name and labels.
    pub counters: Mutex<HashMap<String, u64>>,
}

impl ReviewMetrics for TestMetrics {
    fn add(&self, metric_name: &str, labels: &[(&str, &str)], by: u64) {
        let key = format!("{}:{:?}", metric_name, labels);
        *self.counters.lock().entry(key).or_insert(0) += by;
    }
}

impl TestMetrics {
    /// Total for a metric across all label sets.
    pub fn get_count(&self, metric_name: &str) -> u64 {
        let prefix = format!("{}:", metric_name);
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictKind;

    #[test]
    fn test_counts_sum_across_labels() {
        let metrics = TestMetrics::default();
        metrics.increment(PR_CREATED, &[]);
        metrics.add(REVIEWER_ASSIGNED, &[("team", "a")], 2);
        metrics.add(REVIEWER_ASSIGNED, &[("team", "b")], 1);

        assert_eq!(metrics.get_count(PR_CREATED), 1);
        assert_eq!(metrics.get_count(REVIEWER_ASSIGNED), 3);
        assert_eq!(metrics.get_count(PR_MERGED), 0);
    }

    #[test]
    fn test_record_failure_labels_category() {
        let metrics = TestMetrics::default();
        metrics.record_failure("reassign", &ReviewError::Conflict(ConflictKind::NoCandidate));

        let counters = metrics.counters.lock();
        let key = counters.keys().next().unwrap();
        assert!(key.contains("conflict"));
        assert!(key.contains("reassign"));
    }
}
