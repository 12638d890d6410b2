//! The pull request state machine: create, merge, reassign.

use futures::FutureExt;
use tracing::{debug, info};

use super::{parse_id, required, user_ids, ReviewService};
use crate::context::RequestContext;
use crate::error::{ConflictKind, Entity, ReviewError};
use crate::metrics::{PR_CREATED, PR_MERGED, REVIEWER_ASSIGNED, REVIEWER_REASSIGNED};
use crate::store::ReviewStore;
use crate::types::{PrDetails, PrStatus, PullRequestId, UserId};

impl<S: ReviewStore> ReviewService<S> {
    /// Open a pull request and assign its initial reviewers.
    ///
    /// Reviewers are the first candidates of the author's active teammates,
    /// least loaded first. An empty pool is not an error: the pull request
    /// is created with no reviewers.
    pub async fn create_pull_request(
        &self,
        ctx: &RequestContext,
        pr_id: &str,
        title: &str,
        author_id: &str,
    ) -> Result<PrDetails, ReviewError> {
        let pr_id: PullRequestId = parse_id("pull_request_id", pr_id)?;
        let title = required("pull_request_name", title)?;
        let author_id: UserId = parse_id("author_id", author_id)?;
        let policy = self.policy;

        let details = self
            .transact(ctx, "create_pull_request", move |q| {
                async move {
                    // Probe only; a failed lookup falls through to the insert.
                    if let Ok(Some(_)) = q.get_pull_request(pr_id).await {
                        return Err(ReviewError::already_exists(Entity::PullRequest, pr_id));
                    }

                    let author = q
                        .get_user(author_id)
                        .await?
                        .ok_or_else(|| ReviewError::not_found(Entity::Author, author_id))?;

                    let pr = q
                        .create_pull_request_with_id(pr_id, &title, author.id)
                        .await
                        .map_err(|e| {
                            if e.is_unique_violation() {
                                ReviewError::already_exists(Entity::PullRequest, pr_id)
                            } else {
                                e.into()
                            }
                        })?;

                    let candidates = q.get_candidates_for_initial_review(author.id).await?;
                    let reviewers = policy.initial_reviewers(&candidates);
                    debug!(
                        pr_id = %pr_id,
                        pool = candidates.len(),
                        selected = reviewers.len(),
                        "Initial reviewer pool"
                    );

                    for reviewer in &reviewers {
                        q.add_reviewer_to_pr(pr_id, reviewer.id).await?;
                    }

                    Ok(PrDetails::new(&pr, user_ids(&reviewers)))
                }
                .boxed()
            })
            .await?;

        self.metrics.increment(PR_CREATED, &[]);
        self.metrics
            .add(REVIEWER_ASSIGNED, &[], details.reviewers.len() as u64);
        info!(
            pr_id = %details.id,
            author_id = %details.author_id,
            reviewers = details.reviewers.len(),
            "Pull request created"
        );
        Ok(details)
    }

    /// Merge a pull request.
    ///
    /// Merging is idempotent: an already merged pull request is returned
    /// unchanged, with its original merge time. Reviewers are kept.
    pub async fn merge_pull_request(&self, ctx: &RequestContext, pr_id: &str) -> Result<PrDetails, ReviewError> {
        let pr_id: PullRequestId = parse_id("pull_request_id", pr_id)?;

        let (details, newly_merged) = self
            .transact(ctx, "merge_pull_request", move |q| {
                async move {
                    let pr = q
                        .get_pull_request_for_update(pr_id)
                        .await?
                        .ok_or_else(|| ReviewError::not_found(Entity::PullRequest, pr_id))?;

                    let (pr, newly_merged) = if pr.status.is_terminal() {
                        (pr, false)
                    } else {
                        let merged = q
                            .update_pull_request_status(pr_id, PrStatus::Merged)
                            .await?
                            .ok_or_else(|| ReviewError::not_found(Entity::PullRequest, pr_id))?;
                        (merged, true)
                    };

                    let reviewers = q.get_reviewers_for_pr(pr_id).await?;
                    Ok((PrDetails::new(&pr, user_ids(&reviewers)), newly_merged))
                }
                .boxed()
            })
            .await?;

        if newly_merged {
            self.metrics.increment(PR_MERGED, &[]);
            info!(pr_id = %pr_id, merged_at = ?details.merged_at, "Pull request merged");
        } else {
            debug!(pr_id = %pr_id, "Pull request already merged");
        }
        Ok(details)
    }

    /// Replace one reviewer of an open pull request.
    ///
    /// Preconditions are checked in order: the pull request exists, it is
    /// not merged, the outgoing reviewer is assigned, and a replacement is
    /// available among the author's active teammates who are not already
    /// reviewing. The replacement is appended to the reviewer list and
    /// reported in [`PrDetails::replaced_by`].
    ///
    /// The checks and the remove/add pair share one transaction, with the
    /// pull request row locked before the first read. Two concurrent
    /// reassignments of the same reviewer therefore serialize: the second
    /// sees the first one's result and fails with `NotAssigned`.
    pub async fn reassign_reviewer(
        &self,
        ctx: &RequestContext,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> Result<PrDetails, ReviewError> {
        let pr_id: PullRequestId = parse_id("pull_request_id", pr_id)?;
        let old_reviewer: UserId = parse_id("old_reviewer_id", old_reviewer_id)?;
        let policy = self.policy;

        let details = self
            .transact(ctx, "reassign_reviewer", move |q| {
                async move {
                    let pr = q
                        .get_pull_request_for_update(pr_id)
                        .await?
                        .ok_or_else(|| ReviewError::not_found(Entity::PullRequest, pr_id))?;

                    if pr.status.is_terminal() {
                        return Err(ReviewError::Conflict(ConflictKind::AlreadyMerged));
                    }

                    let current = q.get_reviewers_for_pr(pr_id).await?;
                    if !current.iter().any(|u| u.id == old_reviewer) {
                        return Err(ReviewError::Conflict(ConflictKind::NotAssigned));
                    }

                    let candidates = q.get_candidates_for_reassignment(old_reviewer, pr_id).await?;
                    debug!(pr_id = %pr_id, pool = candidates.len(), "Replacement pool");
                    let replacement = policy
                        .replacement(&candidates)
                        .ok_or(ReviewError::Conflict(ConflictKind::NoCandidate))?;

                    if !q.remove_reviewer_from_pr(pr_id, old_reviewer).await? {
                        return Err(ReviewError::Conflict(ConflictKind::NotAssigned));
                    }
                    q.add_reviewer_to_pr(pr_id, replacement.id).await?;

                    let reviewers = q.get_reviewers_for_pr(pr_id).await?;
                    Ok(PrDetails::new(&pr, user_ids(&reviewers)).with_replaced_by(replacement.id))
                }
                .boxed()
            })
            .await?;

        self.metrics.increment(REVIEWER_REASSIGNED, &[]);
        info!(
            pr_id = %pr_id,
            old_reviewer = %old_reviewer,
            new_reviewer = ?details.replaced_by,
            "Reviewer reassigned"
        );
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::metrics::{TestMetrics, OPERATION_FAILED};
    use crate::policy::ReviewerPolicy;
    use crate::store::InMemoryReviewStore;
    use crate::types::TeamMember;

    fn uid(n: u128) -> String {
        Uuid::from_u128(n).to_string()
    }

    async fn seeded(active: &[u128]) -> (ReviewService<InMemoryReviewStore>, Arc<TestMetrics>) {
        let metrics = Arc::new(TestMetrics::default());
        let service = ReviewService::new(InMemoryReviewStore::new()).with_metrics(metrics.clone());
        let members: Vec<_> = active
            .iter()
            .map(|n| TeamMember::new(uid(*n), format!("user-{n}"), true))
            .collect();
        service
            .create_team_with_members(&RequestContext::background(), "backend", &members)
            .await
            .unwrap();
        (service, metrics)
    }

    #[tokio::test]
    async fn test_create_assigns_two_least_loaded() {
        let (service, metrics) = seeded(&[1, 2, 3, 4]).await;
        let ctx = RequestContext::background();

        let pr = service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();
        assert_eq!(pr.reviewers, vec![UserId::new(Uuid::from_u128(2)), UserId::new(Uuid::from_u128(3))]);
        assert_eq!(pr.status, PrStatus::Open);
        assert!(pr.merged_at.is_none());

        // 2 and 3 now carry one open review each; 4 is least loaded.
        let pr = service.create_pull_request(&ctx, &uid(101), "Second", &uid(1)).await.unwrap();
        assert_eq!(pr.reviewers[0], UserId::new(Uuid::from_u128(4)));

        assert_eq!(metrics.get_count(PR_CREATED), 2);
        assert_eq!(metrics.get_count(REVIEWER_ASSIGNED), 4);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_and_unknown_author() {
        let (service, metrics) = seeded(&[1, 2]).await;
        let ctx = RequestContext::background();
        service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();

        let err = service.create_pull_request(&ctx, &uid(100), "Again", &uid(1)).await.unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyExists { entity: Entity::PullRequest, .. }));

        let err = service.create_pull_request(&ctx, &uid(101), "Ghost", &uid(9)).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { entity: Entity::Author, .. }));

        assert_eq!(metrics.get_count(OPERATION_FAILED), 2);
    }

    #[tokio::test]
    async fn test_create_validates_before_store() {
        let (service, _) = seeded(&[1]).await;
        let ctx = RequestContext::background();

        let err = service.create_pull_request(&ctx, "pr-1001", "T", &uid(1)).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidInput { field: "pull_request_id", .. }));

        let err = service.create_pull_request(&ctx, &uid(100), "  ", &uid(1)).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidInput { field: "pull_request_name", .. }));
    }

    #[tokio::test]
    async fn test_policy_limit_is_respected() {
        let (service, _) = seeded(&[1, 2, 3, 4]).await;
        let service = service.with_policy(ReviewerPolicy::new(1));

        let pr = service
            .create_pull_request(&RequestContext::background(), &uid(100), "One", &uid(1))
            .await
            .unwrap();
        assert_eq!(pr.reviewers.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_limit_still_assigns_two() {
        let (service, _) = seeded(&[1, 2, 3, 4, 5, 6]).await;
        let service = service.with_policy(ReviewerPolicy::new(4));

        let pr = service
            .create_pull_request(&RequestContext::background(), &uid(100), "Wide", &uid(1))
            .await
            .unwrap();
        assert_eq!(pr.reviewers.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let (service, metrics) = seeded(&[1, 2, 3]).await;
        let ctx = RequestContext::background();
        service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();

        let first = service.merge_pull_request(&ctx, &uid(100)).await.unwrap();
        let second = service.merge_pull_request(&ctx, &uid(100)).await.unwrap();

        assert_eq!(first.status, PrStatus::Merged);
        assert!(first.merged_at.is_some());
        assert_eq!(first, second);
        assert_eq!(metrics.get_count(PR_MERGED), 1);

        let err = service.merge_pull_request(&ctx, &uid(999)).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { entity: Entity::PullRequest, .. }));
    }

    #[tokio::test]
    async fn test_reassign_preconditions_in_order() {
        let (service, _) = seeded(&[1, 2, 3]).await;
        let ctx = RequestContext::background();
        service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();

        let err = service.reassign_reviewer(&ctx, &uid(999), &uid(2)).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { entity: Entity::PullRequest, .. }));

        let err = service.reassign_reviewer(&ctx, &uid(100), &uid(1)).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::NotAssigned));

        let err = service.reassign_reviewer(&ctx, &uid(100), &uid(2)).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::NoCandidate));

        service.merge_pull_request(&ctx, &uid(100)).await.unwrap();
        let err = service.reassign_reviewer(&ctx, &uid(100), &uid(1)).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyMerged));
    }

    #[tokio::test]
    async fn test_reassign_replaces_and_appends() {
        let (service, metrics) = seeded(&[1, 2, 3, 4]).await;
        let ctx = RequestContext::background();
        service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();

        let pr = service.reassign_reviewer(&ctx, &uid(100), &uid(2)).await.unwrap();
        let four = UserId::new(Uuid::from_u128(4));
        assert_eq!(pr.replaced_by, Some(four));
        assert_eq!(pr.reviewers, vec![UserId::new(Uuid::from_u128(3)), four]);
        assert_eq!(metrics.get_count(REVIEWER_REASSIGNED), 1);
    }

    #[tokio::test]
    async fn test_inactive_teammates_are_skipped() {
        let (service, _) = seeded(&[1, 2, 3]).await;
        let ctx = RequestContext::background();
        service.set_user_active(&ctx, &uid(2), false).await.unwrap();

        let pr = service.create_pull_request(&ctx, &uid(100), "First", &uid(1)).await.unwrap();
        assert_eq!(pr.reviewers, vec![UserId::new(Uuid::from_u128(3))]);
    }
}
