//! Teams and their members.

use serde::{Deserialize, Serialize};

use super::ids::{TeamId, UserId};

/// A team. The name is unique and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Store-generated identity.
    pub id: TeamId,
    /// Unique display name.
    pub name: String,
}

impl Team {
    /// Create a team record.
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A user, belonging to exactly one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Caller-supplied identity.
    #[serde(rename = "user_id")]
    pub id: UserId,
    /// Display name.
    #[serde(rename = "username")]
    pub name: String,
    /// Owning team.
    pub team_id: TeamId,
    /// Inactive users are never picked as reviewers.
    #[serde(rename = "is_active")]
    pub active: bool,
}

impl User {
    /// Create a user record.
    pub fn new(id: UserId, name: impl Into<String>, team_id: TeamId, active: bool) -> Self {
        Self {
            id,
            name: name.into(),
            team_id,
            active,
        }
    }
}
