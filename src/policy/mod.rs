//! Reviewer assignment policy.

pub mod selection;

pub use selection::{
    ReviewerPolicy, select_initial_reviewers, select_replacement,
    DEFAULT_MAX_INITIAL_REVIEWERS, MAX_INITIAL_REVIEWERS,
};
