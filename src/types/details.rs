//! Result records handed back to callers of the lifecycle manager.
//!
//! Field names follow the JSON contract of the HTTP surface, so the same
//! structs serialize directly into responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PullRequestId, UserId};
use super::pull_request::{PrStatus, PullRequest};
use super::roster::User;

/// One member of a team as registered or reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// User identity (UUID string on the wire).
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Whether the member is eligible for review.
    pub is_active: bool,
}

impl TeamMember {
    /// Create a member entry.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, is_active: bool) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            is_active,
        }
    }
}

impl From<&User> for TeamMember {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.to_string(),
            username: user.name.clone(),
            is_active: user.active,
        }
    }
}

/// A team with its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDetails {
    /// Team name.
    pub team_name: String,
    /// Members, ordered by user id.
    pub members: Vec<TeamMember>,
}

/// Snapshot of a pull request with its reviewer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrDetails {
    /// Pull request identity.
    #[serde(rename = "pull_request_id")]
    pub id: PullRequestId,
    /// Title.
    #[serde(rename = "pull_request_name")]
    pub title: String,
    /// Author identity.
    pub author_id: UserId,
    /// Current status.
    pub status: PrStatus,
    /// Reviewers in assignment order.
    #[serde(rename = "assigned_reviewers")]
    pub reviewers: Vec<UserId>,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Merge time, present once merged.
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none", default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Reviewer who took over, set only by a reassignment.
    #[serde(skip)]
    pub replaced_by: Option<UserId>,
}

impl PrDetails {
    /// Build a snapshot from a pull request row and its reviewers.
    pub fn new(pr: &PullRequest, reviewers: Vec<UserId>) -> Self {
        Self {
            id: pr.id,
            title: pr.title.clone(),
            author_id: pr.author_id,
            status: pr.status,
            reviewers,
            created_at: pr.created_at,
            merged_at: pr.merged_at(),
            replaced_by: None,
        }
    }

    /// Record the replacement reviewer.
    pub fn with_replaced_by(mut self, user: UserId) -> Self {
        self.replaced_by = Some(user);
        self
    }
}

/// A user together with the name of their team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    /// The user row.
    #[serde(flatten)]
    pub user: User,
    /// Name of the owning team.
    pub team_name: String,
}

/// Abbreviated pull request, used in review queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrShort {
    /// Pull request identity.
    pub pull_request_id: PullRequestId,
    /// Title.
    pub pull_request_name: String,
    /// Author identity.
    pub author_id: UserId,
    /// Current status.
    pub status: PrStatus,
}

impl From<&PullRequest> for PrShort {
    fn from(pr: &PullRequest) -> Self {
        Self {
            pull_request_id: pr.id,
            pull_request_name: pr.title.clone(),
            author_id: pr.author_id,
            status: pr.status,
        }
    }
}

/// Open pull requests a user is currently reviewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewQueue {
    /// The reviewer.
    pub user_id: UserId,
    /// Open pull requests, oldest first.
    pub pull_requests: Vec<PrShort>,
}

/// Assignment count for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssignmentCount {
    /// The user.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Number of pull requests the user reviews, open or merged.
    pub assignments: i64,
}

/// Reviewer count for one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrAssignmentCount {
    /// The pull request.
    pub pull_request_id: PullRequestId,
    /// Title.
    pub title: String,
    /// Number of assigned reviewers.
    pub reviewers: i64,
}

/// Aggregate assignment statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    /// Per-user counts, ordered by user id.
    #[serde(rename = "users")]
    pub by_user: Vec<UserAssignmentCount>,
    /// Per-pull-request counts, ordered by pull request id.
    #[serde(rename = "prs")]
    pub by_pr: Vec<PrAssignmentCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TeamId;
    use uuid::Uuid;

    fn merged_pr() -> PullRequest {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let merged = DateTime::from_timestamp(1_700_000_600, 0).unwrap();
        PullRequest {
            id: PullRequestId::new(Uuid::from_u128(10)),
            title: "Tighten pool limits".to_string(),
            author_id: UserId::new(Uuid::from_u128(1)),
            status: PrStatus::Merged,
            created_at: created,
            updated_at: merged,
        }
    }

    #[test]
    fn test_pr_details_json_shape() {
        let reviewer = UserId::new(Uuid::from_u128(2));
        let details = PrDetails::new(&merged_pr(), vec![reviewer]).with_replaced_by(reviewer);
        let json = serde_json::to_value(&details).unwrap();

        assert_eq!(json["status"], "MERGED");
        assert_eq!(json["pull_request_name"], "Tighten pool limits");
        assert_eq!(json["assigned_reviewers"][0], reviewer.to_string());
        assert!(json.get("mergedAt").is_some());
        assert!(json.get("replaced_by").is_none());
    }

    #[test]
    fn test_open_pr_omits_merged_at() {
        let mut pr = merged_pr();
        pr.status = PrStatus::Open;
        let json = serde_json::to_value(PrDetails::new(&pr, vec![])).unwrap();
        assert!(json.get("mergedAt").is_none());
        assert_eq!(json["assigned_reviewers"], serde_json::json!([]));
    }

    #[test]
    fn test_user_details_flattens_user() {
        let user = User::new(
            UserId::new(Uuid::from_u128(3)),
            "carol",
            TeamId::new(Uuid::from_u128(9)),
            false,
        );
        let json = serde_json::to_value(UserDetails { user, team_name: "backend".into() }).unwrap();
        assert_eq!(json["username"], "carol");
        assert_eq!(json["is_active"], false);
        assert_eq!(json["team_name"], "backend");
    }
}
