//! Review storage backends.
//!
//! The storage contract is split in two: [`Queries`] is the row-level CRUD
//! surface over teams, users, pull requests and reviewer assignments, and
//! [`ReviewStore`] hands out transactions ([`StoreTx`]) that expose
//! `Queries`. Every read and write the lifecycle manager performs goes through
//! a transaction opened by the [`coordinator`](crate::coordinator).

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{
    PrAssignmentCount, PrStatus, PullRequest, PullRequestId, Team, TeamId, User,
    UserAssignmentCount, UserId,
};

/// Row-level operations over the four relations.
///
/// Implementations must return candidate and reviewer lists in a
/// deterministic order: reviewers in assignment order, candidates by
/// ascending open-assignment load and then by user id.
#[async_trait]
pub trait Queries: Send {
    /// Create a team. Fails with `UniqueViolation` if the name is taken.
    async fn create_team(&mut self, name: &str) -> Result<Team, StoreError>;

    /// Fetch a team by identity.
    async fn get_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError>;

    /// Fetch a team by its unique name.
    async fn get_team_by_name(&mut self, name: &str) -> Result<Option<Team>, StoreError>;

    /// All members of a team, ordered by user id.
    async fn get_users_by_team(&mut self, team_id: TeamId) -> Result<Vec<User>, StoreError>;

    /// Insert a user, or update name/team/active of an existing one.
    async fn upsert_user(&mut self, user: &User) -> Result<User, StoreError>;

    /// Fetch a user by identity.
    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Toggle the active flag. Returns `false` if the user does not exist.
    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<bool, StoreError>;

    /// Create an `OPEN` pull request with a caller-supplied identity.
    async fn create_pull_request_with_id(
        &mut self,
        id: PullRequestId,
        title: &str,
        author_id: UserId,
    ) -> Result<PullRequest, StoreError>;

    /// Fetch a pull request.
    async fn get_pull_request(&mut self, id: PullRequestId) -> Result<Option<PullRequest>, StoreError>;

    /// Fetch a pull request and lock it until the transaction ends.
    async fn get_pull_request_for_update(
        &mut self,
        id: PullRequestId,
    ) -> Result<Option<PullRequest>, StoreError>;

    /// Move a pull request to `status`, stamping the update time.
    ///
    /// A row already in `status` is returned unchanged, timestamp included.
    async fn update_pull_request_status(
        &mut self,
        id: PullRequestId,
        status: PrStatus,
    ) -> Result<Option<PullRequest>, StoreError>;

    /// Open pull requests the user reviews, oldest first.
    async fn get_open_pull_requests_for_reviewer(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<PullRequest>, StoreError>;

    /// Append a reviewer. Fails with `UniqueViolation` on a duplicate pair.
    async fn add_reviewer_to_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<(), StoreError>;

    /// Remove a reviewer. Returns whether a row was removed.
    async fn remove_reviewer_from_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<bool, StoreError>;

    /// Reviewers of a pull request in assignment order.
    async fn get_reviewers_for_pr(&mut self, pr_id: PullRequestId) -> Result<Vec<User>, StoreError>;

    /// Active teammates of the author, excluding the author.
    async fn get_candidates_for_initial_review(&mut self, author_id: UserId) -> Result<Vec<User>, StoreError>;

    /// Active teammates of the pull request's author, excluding the outgoing
    /// reviewer, the author and everyone already reviewing the pull request.
    async fn get_candidates_for_reassignment(
        &mut self,
        old_reviewer_id: UserId,
        pr_id: PullRequestId,
    ) -> Result<Vec<User>, StoreError>;

    /// Assignment count per user (all statuses), ordered by user id.
    async fn get_assignment_counts_by_user(&mut self) -> Result<Vec<UserAssignmentCount>, StoreError>;

    /// Reviewer count per pull request, ordered by pull request id.
    async fn get_assignment_counts_by_pr(&mut self) -> Result<Vec<PrAssignmentCount>, StoreError>;
}

/// An open transaction.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTx: Queries {
    /// View this transaction as its query surface.
    fn queries(&mut self) -> &mut dyn Queries;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A storage backend that can open transactions.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::{InMemoryReviewStore, FailPoint};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresReviewStore, PostgresConfig};
