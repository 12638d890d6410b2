//! Pull requests and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{PullRequestId, UserId};

/// Status of a pull request.
///
/// `Open` is the initial state and `Merged` is terminal. There is no other
/// transition and no closed/rejected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrStatus {
    /// Accepting review changes.
    Open,
    /// Terminal; reviewer assignments are frozen.
    Merged,
}

impl PrStatus {
    /// The persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }

    /// Whether no further transition is defined from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged)
    }
}

impl Default for PrStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl FromStr for PrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "MERGED" => Ok(Self::Merged),
            other => Err(format!("unknown pull request status: {other}")),
        }
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull request row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Caller-supplied identity.
    pub id: PullRequestId,
    /// Title.
    pub title: String,
    /// Author; never one of the reviewers.
    pub author_id: UserId,
    /// Current status.
    pub status: PrStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change. Doubles as the merge time once merged.
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    /// Merge time, if the pull request has been merged.
    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            PrStatus::Merged => Some(self.updated_at),
            PrStatus::Open => None,
        }
    }

    /// Whether reviewer assignments may still change.
    pub fn is_open(&self) -> bool {
        self.status == PrStatus::Open
    }
}

/// One reviewer assignment: a (pull request, user) pair.
///
/// A pull request's assignments form an ordered set; order is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// The reviewed pull request.
    pub pull_request_id: PullRequestId,
    /// The reviewer.
    pub user_id: UserId,
}

impl Assignment {
    /// Create an assignment pair.
    pub fn new(pull_request_id: PullRequestId, user_id: UserId) -> Self {
        Self { pull_request_id, user_id }
    }
}
