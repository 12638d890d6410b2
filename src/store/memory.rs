//! In-memory review store for testing and embedding.
//!
//! Transactions are serializable: `begin` takes an exclusive lock on the
//! tables and works on a private copy, `commit` publishes the copy and
//! `rollback` (or dropping the transaction) throws it away. Concurrent
//! transactions therefore queue behind each other, which is the strictest
//! isolation a relational backend could offer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{Queries, ReviewStore, StoreTx};
use crate::error::StoreError;
use crate::types::{
    Assignment, PrAssignmentCount, PrStatus, PullRequest, PullRequestId, Team, TeamId, User,
    UserAssignmentCount, UserId,
};

/// Operation at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Opening a transaction.
    Begin,
    /// Creating a team.
    CreateTeam,
    /// Upserting a user.
    UpsertUser,
    /// Inserting a pull request.
    CreatePullRequest,
    /// Changing a pull request status.
    UpdateStatus,
    /// Adding a reviewer.
    AddReviewer,
    /// Removing a reviewer.
    RemoveReviewer,
    /// Committing.
    Commit,
    /// Rolling back.
    Rollback,
}

/// One-shot failure triggers shared between the store and its transactions.
#[derive(Debug, Clone, Default)]
struct Faults {
    armed: Arc<Mutex<Vec<FailPoint>>>,
}

impl Faults {
    fn arm(&self, point: FailPoint) {
        self.armed.lock().push(point);
    }

    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut armed = self.armed.lock();
        match armed.iter().position(|p| *p == point) {
            Some(idx) => {
                armed.remove(idx);
                Err(StoreError::Backend(format!("injected failure at {:?}", point)))
            }
            None => Ok(()),
        }
    }
}

/// The four relations.
#[derive(Debug, Clone, Default)]
struct Tables {
    teams: BTreeMap<TeamId, Team>,
    users: BTreeMap<UserId, User>,
    pull_requests: BTreeMap<PullRequestId, PullRequest>,
    /// Reviewer assignments in insertion order.
    reviewers: Vec<Assignment>,
}

impl Tables {
    fn is_assigned(&self, pr_id: PullRequestId, user_id: UserId) -> bool {
        self.reviewers
            .iter()
            .any(|a| a.pull_request_id == pr_id && a.user_id == user_id)
    }

    fn open_load(&self, user_id: UserId) -> usize {
        self.reviewers
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| {
                self.pull_requests
                    .get(&a.pull_request_id)
                    .map(|pr| pr.is_open())
                    .unwrap_or(false)
            })
            .count()
    }

    /// Order candidates by ascending open load, then by id.
    fn rank(&self, mut users: Vec<User>) -> Vec<User> {
        users.sort_by_key(|u| (self.open_load(u.id), u.id));
        users
    }
}

/// In-memory review store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReviewStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Faults,
}

impl InMemoryReviewStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation at `point` fail with a backend error.
    pub fn fail_next(&self, point: FailPoint) {
        self.faults.arm(point);
    }

    /// All committed reviewer assignments, in insertion order.
    pub async fn assignments(&self) -> Vec<Assignment> {
        self.tables.lock().await.reviewers.clone()
    }

    /// Number of committed pull requests.
    pub async fn num_pull_requests(&self) -> usize {
        self.tables.lock().await.pull_requests.len()
    }

    /// Number of committed teams.
    pub async fn num_teams(&self) -> usize {
        self.tables.lock().await.teams.len()
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.faults.trip(FailPoint::Begin)?;
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            work,
            faults: self.faults.clone(),
        }))
    }
}

/// Transaction over an [`InMemoryReviewStore`].
pub struct InMemoryTx {
    /// Exclusive hold on the committed tables.
    guard: OwnedMutexGuard<Tables>,
    /// Private working copy.
    work: Tables,
    faults: Faults,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    fn queries(&mut self) -> &mut dyn Queries {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, work, faults } = *self;
        faults.trip(FailPoint::Commit)?;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.faults.trip(FailPoint::Rollback)
    }
}

#[async_trait]
impl Queries for InMemoryTx {
    async fn create_team(&mut self, name: &str) -> Result<Team, StoreError> {
        self.faults.trip(FailPoint::CreateTeam)?;
        if self.work.teams.values().any(|t| t.name == name) {
            return Err(StoreError::UniqueViolation {
                constraint: "teams_name_key".to_string(),
            });
        }
        let team = Team::new(TeamId::generate(), name);
        self.work.teams.insert(team.id, team.clone());
        Ok(team)
    }

    async fn get_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError> {
        Ok(self.work.teams.get(&id).cloned())
    }

    async fn get_team_by_name(&mut self, name: &str) -> Result<Option<Team>, StoreError> {
        Ok(self.work.teams.values().find(|t| t.name == name).cloned())
    }

    async fn get_users_by_team(&mut self, team_id: TeamId) -> Result<Vec<User>, StoreError> {
        Ok(self.work.users
            .values()
            .filter(|u| u.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<User, StoreError> {
        self.faults.trip(FailPoint::UpsertUser)?;
        if !self.work.teams.contains_key(&user.team_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "users_team_id_fkey".to_string(),
            });
        }
        self.work.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<bool, StoreError> {
        match self.work.users.get_mut(&id) {
            Some(user) => {
                user.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_pull_request_with_id(
        &mut self,
        id: PullRequestId,
        title: &str,
        author_id: UserId,
    ) -> Result<PullRequest, StoreError> {
        self.faults.trip(FailPoint::CreatePullRequest)?;
        if self.work.pull_requests.contains_key(&id) {
            return Err(StoreError::UniqueViolation {
                constraint: "pull_requests_pkey".to_string(),
            });
        }
        if !self.work.users.contains_key(&author_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "pull_requests_author_id_fkey".to_string(),
            });
        }
        let now = Utc::now();
        let pr = PullRequest {
            id,
            title: title.to_string(),
            author_id,
            status: PrStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.work.pull_requests.insert(id, pr.clone());
        Ok(pr)
    }

    async fn get_pull_request(&mut self, id: PullRequestId) -> Result<Option<PullRequest>, StoreError> {
        Ok(self.work.pull_requests.get(&id).cloned())
    }

    async fn get_pull_request_for_update(
        &mut self,
        id: PullRequestId,
    ) -> Result<Option<PullRequest>, StoreError> {
        // The transaction already holds the store-wide lock.
        self.get_pull_request(id).await
    }

    async fn update_pull_request_status(
        &mut self,
        id: PullRequestId,
        status: PrStatus,
    ) -> Result<Option<PullRequest>, StoreError> {
        self.faults.trip(FailPoint::UpdateStatus)?;
        Ok(self.work.pull_requests.get_mut(&id).map(|pr| {
            if pr.status != status {
                pr.status = status;
                pr.updated_at = Utc::now();
            }
            pr.clone()
        }))
    }

    async fn get_open_pull_requests_for_reviewer(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let mut prs: Vec<PullRequest> = self.work.reviewers
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| self.work.pull_requests.get(&a.pull_request_id))
            .filter(|pr| pr.is_open())
            .cloned()
            .collect();
        prs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(prs)
    }

    async fn add_reviewer_to_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<(), StoreError> {
        self.faults.trip(FailPoint::AddReviewer)?;
        if !self.work.pull_requests.contains_key(&pr_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "pr_reviewers_pr_id_fkey".to_string(),
            });
        }
        if !self.work.users.contains_key(&user_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "pr_reviewers_user_id_fkey".to_string(),
            });
        }
        if self.work.is_assigned(pr_id, user_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "pr_reviewers_pr_id_user_id_key".to_string(),
            });
        }
        self.work.reviewers.push(Assignment::new(pr_id, user_id));
        Ok(())
    }

    async fn remove_reviewer_from_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<bool, StoreError> {
        self.faults.trip(FailPoint::RemoveReviewer)?;
        let before = self.work.reviewers.len();
        self.work.reviewers
            .retain(|a| !(a.pull_request_id == pr_id && a.user_id == user_id));
        Ok(self.work.reviewers.len() < before)
    }

    async fn get_reviewers_for_pr(&mut self, pr_id: PullRequestId) -> Result<Vec<User>, StoreError> {
        Ok(self.work.reviewers
            .iter()
            .filter(|a| a.pull_request_id == pr_id)
            .filter_map(|a| self.work.users.get(&a.user_id).cloned())
            .collect())
    }

    async fn get_candidates_for_initial_review(&mut self, author_id: UserId) -> Result<Vec<User>, StoreError> {
        let team_id = match self.work.users.get(&author_id) {
            Some(author) => author.team_id,
            None => return Ok(Vec::new()),
        };
        let pool: Vec<User> = self.work.users
            .values()
            .filter(|u| u.team_id == team_id && u.active && u.id != author_id)
            .cloned()
            .collect();
        Ok(self.work.rank(pool))
    }

    async fn get_candidates_for_reassignment(
        &mut self,
        old_reviewer_id: UserId,
        pr_id: PullRequestId,
    ) -> Result<Vec<User>, StoreError> {
        let Some(pr) = self.work.pull_requests.get(&pr_id) else {
            return Ok(Vec::new());
        };
        let Some(author) = self.work.users.get(&pr.author_id) else {
            return Ok(Vec::new());
        };
        let current: BTreeSet<UserId> = self.work.reviewers
            .iter()
            .filter(|a| a.pull_request_id == pr_id)
            .map(|a| a.user_id)
            .collect();

        let pool: Vec<User> = self.work.users
            .values()
            .filter(|u| {
                u.team_id == author.team_id
                    && u.active
                    && u.id != old_reviewer_id
                    && u.id != author.id
                    && !current.contains(&u.id)
            })
            .cloned()
            .collect();
        Ok(self.work.rank(pool))
    }

    async fn get_assignment_counts_by_user(&mut self) -> Result<Vec<UserAssignmentCount>, StoreError> {
        Ok(self.work.users
            .values()
            .map(|u| UserAssignmentCount {
                user_id: u.id,
                username: u.name.clone(),
                assignments: self.work.reviewers.iter().filter(|a| a.user_id == u.id).count() as i64,
            })
            .collect())
    }

    async fn get_assignment_counts_by_pr(&mut self) -> Result<Vec<PrAssignmentCount>, StoreError> {
        Ok(self.work.pull_requests
            .values()
            .map(|pr| PrAssignmentCount {
                pull_request_id: pr.id,
                title: pr.title.clone(),
                reviewers: self.work.reviewers
                    .iter()
                    .filter(|a| a.pull_request_id == pr.id)
                    .count() as i64,
            })
            .collect())
    }
}
