//! Roster operations: teams, members, review queues and statistics.

use std::collections::BTreeSet;

use futures::FutureExt;
use tracing::info;

use super::{parse_id, required, ReviewService};
use crate::context::RequestContext;
use crate::error::{Entity, ReviewError};
use crate::store::ReviewStore;
use crate::types::{
    AssignmentStats, PrShort, ReviewQueue, TeamDetails, TeamMember, User, UserDetails, UserId,
};

impl<S: ReviewStore> ReviewService<S> {
    /// Create a team and register its members in one transaction.
    ///
    /// Members that already exist are moved into the new team and updated.
    /// Fails with `AlreadyExists` if the team name is taken.
    pub async fn create_team_with_members(
        &self,
        ctx: &RequestContext,
        team_name: &str,
        members: &[TeamMember],
    ) -> Result<TeamDetails, ReviewError> {
        let team_name = required("team_name", team_name)?;
        if members.is_empty() {
            return Err(ReviewError::invalid("members", "must not be empty"));
        }

        let mut seen_ids = BTreeSet::new();
        let mut seen_names = BTreeSet::new();
        let mut parsed = Vec::with_capacity(members.len());
        for member in members {
            let id: UserId = parse_id("user_id", &member.user_id)?;
            if !seen_ids.insert(id) {
                return Err(ReviewError::invalid("user_id", format!("duplicate member {}", id)));
            }
            let name = required("username", &member.username)?;
            if !seen_names.insert(name.clone()) {
                return Err(ReviewError::invalid("username", format!("duplicate username {name:?}")));
            }
            parsed.push((id, name, member.is_active));
        }

        let details = self
            .transact(ctx, "create_team", move |q| {
                async move {
                    let team = q.create_team(&team_name).await.map_err(|e| {
                        if e.is_unique_violation() {
                            ReviewError::already_exists(Entity::Team, &team_name)
                        } else {
                            e.into()
                        }
                    })?;

                    let mut members = Vec::with_capacity(parsed.len());
                    for (id, name, active) in parsed {
                        let user = q.upsert_user(&User::new(id, name, team.id, active)).await?;
                        members.push(TeamMember::from(&user));
                    }

                    Ok(TeamDetails { team_name: team.name, members })
                }
                .boxed()
            })
            .await?;

        info!(
            team = %details.team_name,
            members = details.members.len(),
            "Team created"
        );
        Ok(details)
    }

    /// A team and its members, ordered by user id.
    pub async fn get_team(&self, ctx: &RequestContext, team_name: &str) -> Result<TeamDetails, ReviewError> {
        let team_name = required("team_name", team_name)?;

        self.transact(ctx, "get_team", move |q| {
            async move {
                let team = q
                    .get_team_by_name(&team_name)
                    .await?
                    .ok_or_else(|| ReviewError::not_found(Entity::Team, &team_name))?;
                let users = q.get_users_by_team(team.id).await?;

                Ok(TeamDetails {
                    team_name: team.name,
                    members: users.iter().map(TeamMember::from).collect(),
                })
            }
            .boxed()
        })
        .await
    }

    /// Toggle whether a user can be picked as a reviewer.
    ///
    /// Existing assignments are left alone.
    pub async fn set_user_active(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        active: bool,
    ) -> Result<UserDetails, ReviewError> {
        let user_id: UserId = parse_id("user_id", user_id)?;

        let details = self
            .transact(ctx, "set_user_active", move |q| {
                async move {
                    if !q.set_user_active(user_id, active).await? {
                        return Err(ReviewError::not_found(Entity::User, user_id));
                    }
                    let user = q
                        .get_user(user_id)
                        .await?
                        .ok_or_else(|| ReviewError::not_found(Entity::User, user_id))?;
                    let team = q
                        .get_team(user.team_id)
                        .await?
                        .ok_or_else(|| ReviewError::not_found(Entity::Team, user.team_id))?;

                    Ok(UserDetails { user, team_name: team.name })
                }
                .boxed()
            })
            .await?;

        info!(user_id = %user_id, active = active, "User activity changed");
        Ok(details)
    }

    /// Open pull requests a user is reviewing, oldest first.
    ///
    /// An unknown user has an empty queue.
    pub async fn get_review_queue(&self, ctx: &RequestContext, user_id: &str) -> Result<ReviewQueue, ReviewError> {
        let user_id: UserId = parse_id("user_id", user_id)?;

        self.transact(ctx, "get_review_queue", move |q| {
            async move {
                let mut open = q.get_open_pull_requests_for_reviewer(user_id).await?;
                open.sort_by_key(|pr| (pr.created_at, pr.id));

                Ok(ReviewQueue {
                    user_id,
                    pull_requests: open.iter().map(PrShort::from).collect(),
                })
            }
            .boxed()
        })
        .await
    }

    /// Assignment counts per user and per pull request.
    pub async fn assignment_stats(&self, ctx: &RequestContext) -> Result<AssignmentStats, ReviewError> {
        self.transact(ctx, "assignment_stats", |q| {
            async move {
                Ok(AssignmentStats {
                    by_user: q.get_assignment_counts_by_user().await?,
                    by_pr: q.get_assignment_counts_by_pr().await?,
                })
            }
            .boxed()
        })
        .await
    }
}
