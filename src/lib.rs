//! # pr-reviewer
//!
//! Reviewer assignment and pull request lifecycle engine.
//!
//! The engine answers three questions:
//!
//! > Who reviews a new pull request? Who takes over from a reviewer who
//! > steps away? When is a pull request done?
//!
//! ## Core Contract
//!
//! 1. A new pull request gets up to two reviewers: the least loaded active
//!    teammates of its author, never the author.
//! 2. A pull request moves `OPEN` → `MERGED` exactly once; merging again
//!    returns the same snapshot.
//! 3. Reassignment swaps one reviewer for one eligible teammate atomically,
//!    preserving the reviewer count.
//!
//! ## Architecture
//!
//! ```text
//! caller → ReviewService → Executor::exec_tx → ReviewStore (Postgres or Memory)
//!                ↓
//!          ReviewerPolicy
//! ```
//!
//! ## Consistency Guarantees
//!
//! - Every operation is one transaction: it commits fully or leaves no trace
//! - Cancellation and deadline expiry roll the transaction back
//! - Concurrent reassignments of the same reviewer serialize on the pull
//!   request row; exactly one succeeds

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod store;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use config::{ServiceConfig, LogFormat};
pub use context::RequestContext;
pub use coordinator::Executor;
pub use error::{ConflictKind, Entity, ErrorCategory, ReviewError, StoreError};
pub use lifecycle::ReviewService;
pub use metrics::{ReviewMetrics, NoOpMetrics, TestMetrics, TracingMetrics};
pub use policy::{ReviewerPolicy, select_initial_reviewers, select_replacement};
pub use store::{InMemoryReviewStore, FailPoint, Queries, ReviewStore, StoreTx};
#[cfg(feature = "postgres")]
pub use store::{PostgresReviewStore, PostgresConfig};
pub use types::{
    TeamId, UserId, PullRequestId, Team, User, PrStatus, PullRequest, Assignment,
    TeamMember, TeamDetails, PrDetails, UserDetails, PrShort, ReviewQueue,
    UserAssignmentCount, PrAssignmentCount, AssignmentStats,
};
