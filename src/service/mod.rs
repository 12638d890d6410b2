//! Reviewer REST service.
//!
//! ## Endpoints
//!
//! - `POST /team/add` - Create a team with its members
//! - `GET /team/get?team_name=` - Team details
//! - `POST /users/setIsActive` - Toggle a user's active flag
//! - `GET /users/getReview?user_id=` - Open pull requests a user reviews
//! - `POST /pullRequest/create` - Open a pull request and assign reviewers
//! - `POST /pullRequest/merge` - Merge a pull request (idempotent)
//! - `POST /pullRequest/reassign` - Replace a reviewer
//! - `GET /stats/assignments` - Assignment counts
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{request_logging_middleware, REQUEST_ID_HEADER};
pub use routes::{create_router, error_status, ApiError, AppState};
pub use state::ServiceState;
