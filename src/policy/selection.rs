//! Reviewer selection: which candidate wins.
//!
//! Candidate pools arrive already filtered (author, inactive users and
//! current reviewers removed) and ordered by the store. Selection only
//! decides how many of them to take, so it never touches I/O and never fails.

use serde::{Deserialize, Serialize};

use crate::types::User;

/// Upper bound on reviewers assigned when a pull request is created.
pub const MAX_INITIAL_REVIEWERS: usize = 2;

/// Default number of reviewers assigned when a pull request is created.
pub const DEFAULT_MAX_INITIAL_REVIEWERS: usize = MAX_INITIAL_REVIEWERS;

/// Take the first `limit` candidates, preserving their order.
///
/// Returns an empty list when there are no candidates.
pub fn select_initial_reviewers(candidates: &[User], limit: usize) -> Vec<User> {
    candidates.iter().take(limit).cloned().collect()
}

/// Take the first candidate, if any.
pub fn select_replacement(candidates: &[User]) -> Option<User> {
    candidates.first().cloned()
}

/// Reviewer selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerPolicy {
    /// Reviewers assigned at creation, never above [`MAX_INITIAL_REVIEWERS`].
    pub max_initial_reviewers: usize,
}

impl ReviewerPolicy {
    /// Create a policy with an explicit initial reviewer limit.
    ///
    /// The limit is capped at [`MAX_INITIAL_REVIEWERS`].
    pub fn new(max_initial_reviewers: usize) -> Self {
        Self {
            max_initial_reviewers: max_initial_reviewers.min(MAX_INITIAL_REVIEWERS),
        }
    }

    /// Pick initial reviewers from an ordered pool.
    pub fn initial_reviewers(&self, candidates: &[User]) -> Vec<User> {
        // Also covers policies built without `new`.
        select_initial_reviewers(candidates, self.max_initial_reviewers.min(MAX_INITIAL_REVIEWERS))
    }

    /// Pick the replacement for an outgoing reviewer.
    pub fn replacement(&self, candidates: &[User]) -> Option<User> {
        select_replacement(candidates)
    }
}

impl Default for ReviewerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INITIAL_REVIEWERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TeamId, UserId};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn user(n: u128) -> User {
        User::new(
            UserId::new(Uuid::from_u128(n)),
            format!("user-{n}"),
            TeamId::new(Uuid::from_u128(1000)),
            true,
        )
    }

    #[test]
    fn test_initial_takes_first_two_in_order() {
        let pool = vec![user(3), user(1), user(2)];
        let picked = ReviewerPolicy::default().initial_reviewers(&pool);
        assert_eq!(picked, vec![user(3), user(1)]);
    }

    #[test]
    fn test_initial_with_short_pool() {
        assert_eq!(select_initial_reviewers(&[user(5)], 2), vec![user(5)]);
        assert!(select_initial_reviewers(&[], 2).is_empty());
    }

    #[test]
    fn test_zero_limit_selects_nobody() {
        assert!(select_initial_reviewers(&[user(1), user(2)], 0).is_empty());
    }

    #[test]
    fn test_limit_is_capped_at_two() {
        let pool = vec![user(1), user(2), user(3), user(4)];

        let policy = ReviewerPolicy::new(4);
        assert_eq!(policy.max_initial_reviewers, MAX_INITIAL_REVIEWERS);
        assert_eq!(policy.initial_reviewers(&pool).len(), 2);

        let forced = ReviewerPolicy { max_initial_reviewers: 10 };
        assert_eq!(forced.initial_reviewers(&pool), vec![user(1), user(2)]);
    }

    #[test]
    fn test_replacement_is_first_candidate() {
        assert_eq!(select_replacement(&[user(9), user(4)]), Some(user(9)));
        assert_eq!(select_replacement(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_initial_is_prefix_of_pool(ids in proptest::collection::vec(any::<u128>(), 0..12), limit in 0usize..5) {
            let pool: Vec<User> = ids.iter().map(|n| user(*n)).collect();
            let picked = select_initial_reviewers(&pool, limit);

            prop_assert_eq!(picked.len(), pool.len().min(limit));
            prop_assert_eq!(&pool[..picked.len()], &picked[..]);
        }

        #[test]
        fn prop_selection_is_deterministic(ids in proptest::collection::vec(any::<u128>(), 0..12)) {
            let pool: Vec<User> = ids.iter().map(|n| user(*n)).collect();
            prop_assert_eq!(select_initial_reviewers(&pool, 2), select_initial_reviewers(&pool, 2));
            prop_assert_eq!(select_replacement(&pool), pool.first().cloned());
        }
    }
}
