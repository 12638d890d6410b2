//! Core types for the reviewer service.

pub mod ids;
pub mod roster;
pub mod pull_request;
pub mod details;

pub use ids::{TeamId, UserId, PullRequestId};
pub use roster::{Team, User};
pub use pull_request::{PrStatus, PullRequest, Assignment};
pub use details::{
    TeamMember, TeamDetails, PrDetails, UserDetails, PrShort, ReviewQueue,
    UserAssignmentCount, PrAssignmentCount, AssignmentStats,
};
