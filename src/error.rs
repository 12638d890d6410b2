//! Failure taxonomy.
//!
//! `StoreError` is what a storage backend reports. `ReviewError` is what the
//! lifecycle manager reports to its caller; every variant maps to exactly one
//! [`ErrorCategory`] so the transport can translate failures without string
//! matching.

use std::fmt;

use serde::Serialize;

/// Error raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },
    /// A referenced row does not exist.
    #[error("Foreign key violated: {constraint}")]
    ForeignKeyViolation {
        /// Name of the violated constraint.
        constraint: String,
    },
    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    /// Backend failure without a more specific classification.
    #[error("Store backend error: {0}")]
    Backend(String),
    /// Database error.
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Create a backend error from any displayable error.
    pub fn backend(e: impl fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }

    /// Whether this is a uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

/// Kind of entity a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// A team.
    Team,
    /// A user.
    User,
    /// The author named by a pull request creation.
    Author,
    /// A pull request.
    PullRequest,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Team => write!(f, "team"),
            Self::User => write!(f, "user"),
            Self::Author => write!(f, "author"),
            Self::PullRequest => write!(f, "pull request"),
        }
    }
}

/// Why an operation is invalid given the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// The pull request is merged; assignments are frozen.
    AlreadyMerged,
    /// The named reviewer is not assigned to the pull request.
    NotAssigned,
    /// No eligible replacement reviewer exists.
    NoCandidate,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyMerged => write!(f, "cannot reassign on merged pull request"),
            Self::NotAssigned => write!(f, "reviewer is not assigned to this pull request"),
            Self::NoCandidate => write!(f, "no active replacement candidate in team"),
        }
    }
}

/// Stable category of a [`ReviewError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Duplicate identity on create.
    AlreadyExists,
    /// Referenced entity absent.
    NotFound,
    /// Operation invalid given current state.
    Conflict,
    /// Malformed identity or missing required field.
    InvalidInput,
    /// Caller cancelled or the deadline passed.
    Cancelled,
    /// Persistence failure not otherwise classified.
    StoreFailure,
}

/// Error returned by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// An entity with this identity already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        entity: Entity,
        /// Offending identity or name.
        id: String,
    },
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: Entity,
        /// Missing identity or name.
        id: String,
    },
    /// The operation conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),
    /// Input failed validation before reaching the store.
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
    /// The caller's deadline passed before the operation finished.
    #[error("Operation deadline exceeded")]
    DeadlineExceeded,
    /// Store failure.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
    /// The unit of work failed and rolling back failed as well.
    #[error("{cause}; rollback error: {rollback}")]
    RolledBack {
        /// The original failure.
        #[source]
        cause: Box<ReviewError>,
        /// The rollback failure.
        rollback: StoreError,
    },
}

impl ReviewError {
    /// Shorthand for a missing entity.
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Shorthand for a duplicate entity.
    pub fn already_exists(entity: Entity, id: impl ToString) -> Self {
        Self::AlreadyExists { entity, id: id.to_string() }
    }

    /// Shorthand for a validation failure.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput { field, message: message.into() }
    }

    /// The stable category of this failure.
    ///
    /// A rollback annotation never changes the category of the original cause.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::InvalidInput { .. } => ErrorCategory::InvalidInput,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCategory::Cancelled,
            Self::Store(_) => ErrorCategory::StoreFailure,
            Self::RolledBack { cause, .. } => cause.category(),
        }
    }

    /// The conflict kind, if this is (or wraps) a conflict.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self.root_cause() {
            Self::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The original failure with any rollback annotations peeled off.
    pub fn root_cause(&self) -> &ReviewError {
        match self {
            Self::RolledBack { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Attach a rollback failure to this error.
    pub fn with_rollback_failure(self, rollback: StoreError) -> Self {
        Self::RolledBack { cause: Box::new(self), rollback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_stable_through_rollback() {
        let err = ReviewError::Conflict(ConflictKind::NoCandidate)
            .with_rollback_failure(StoreError::backend("connection reset"));

        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(err.conflict_kind(), Some(ConflictKind::NoCandidate));
        assert!(matches!(err.root_cause(), ReviewError::Conflict(ConflictKind::NoCandidate)));
        assert!(err.to_string().contains("rollback error: Store backend error: connection reset"));
    }

    #[test]
    fn test_store_errors_are_store_failures() {
        let err: ReviewError = StoreError::backend("disk full").into();
        assert_eq!(err.category(), ErrorCategory::StoreFailure);
        assert_eq!(err.conflict_kind(), None);
    }

    #[test]
    fn test_messages_name_the_entity() {
        let err = ReviewError::not_found(Entity::Author, "u-1");
        assert_eq!(err.to_string(), "author not found: u-1");
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_deadline_and_cancel_share_a_category() {
        assert_eq!(ReviewError::Cancelled.category(), ErrorCategory::Cancelled);
        assert_eq!(ReviewError::DeadlineExceeded.category(), ErrorCategory::Cancelled);
    }
}
