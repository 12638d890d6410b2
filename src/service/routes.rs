//! Axum routes for the reviewer service.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ConflictKind, Entity, ReviewError};
use crate::store::{PostgresReviewStore, ReviewStore};
use crate::types::{AssignmentStats, PrDetails, ReviewQueue, TeamDetails, TeamMember, UserDetails, UserId};

use super::state::ServiceState;

/// Service state over the PostgreSQL store.
pub type AppState = ServiceState<PostgresReviewStore>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Register a team with its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTeamRequest {
    /// Unique team name.
    pub team_name: String,
    /// Members to create or move into the team.
    pub members: Vec<TeamMember>,
}

/// `?team_name=` query.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamQuery {
    /// Team to look up.
    pub team_name: String,
}

/// Toggle a user's active flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetActiveRequest {
    /// The user.
    pub user_id: String,
    /// New value of the flag.
    pub is_active: bool,
}

/// `?user_id=` query.
#[derive(Debug, Clone, Deserialize)]
pub struct UserQuery {
    /// The reviewer.
    pub user_id: String,
}

/// Open a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePrRequest {
    /// Caller-chosen identity.
    pub pull_request_id: String,
    /// Title.
    pub pull_request_name: String,
    /// Author.
    pub author_id: String,
}

/// Merge a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeRequest {
    /// The pull request.
    pub pull_request_id: String,
}

/// Replace a reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReassignRequest {
    /// The pull request.
    pub pull_request_id: String,
    /// The outgoing reviewer.
    #[serde(alias = "old_reviewer_id")]
    pub old_user_id: String,
}

/// `{"team": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResponse {
    /// The team.
    pub team: TeamDetails,
}

/// `{"user": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    /// The user with its team name.
    pub user: UserDetails,
}

/// `{"pr": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrResponse {
    /// The pull request snapshot.
    pub pr: PrDetails,
}

/// `{"pr": …, "replaced_by": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignResponse {
    /// The pull request snapshot after the swap.
    pub pr: PrDetails,
    /// The incoming reviewer.
    pub replaced_by: Option<UserId>,
}

/// `{"stats": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Assignment counts.
    pub stats: AssignmentStats,
}

/// Service health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Store connectivity.
    pub database: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether traffic can be served.
    pub ready: bool,
    /// Store connectivity.
    pub database: bool,
    /// Failure detail.
    pub details: Option<String>,
}

/// Error body: `{"error": {"code", "message"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The failure.
    pub error: ErrorBody,
}

/// Machine-readable code plus message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// A failed request, ready to render.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }
}

/// Map a failure to its HTTP status and error code.
///
/// Depends only on the category of the root cause, its entity and its
/// conflict kind.
pub fn error_status(err: &ReviewError) -> (StatusCode, &'static str) {
    match err.root_cause() {
        ReviewError::AlreadyExists { entity: Entity::Team, .. } => (StatusCode::BAD_REQUEST, "TEAM_EXISTS"),
        ReviewError::AlreadyExists { .. } => (StatusCode::CONFLICT, "PR_EXISTS"),
        ReviewError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ReviewError::Conflict(ConflictKind::AlreadyMerged) => (StatusCode::CONFLICT, "PR_MERGED"),
        ReviewError::Conflict(ConflictKind::NotAssigned) => (StatusCode::CONFLICT, "NOT_ASSIGNED"),
        ReviewError::Conflict(ConflictKind::NoCandidate) => (StatusCode::CONFLICT, "NO_CANDIDATE"),
        ReviewError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        ReviewError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
        ReviewError::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "CANCELLED"),
        ReviewError::Store(_) | ReviewError::RolledBack { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        let (status, code) = error_status(&err);
        let message = if code == "INTERNAL" {
            tracing::error!(error = %err, "Internal error");
            "internal server error".to_string()
        } else {
            err.root_cause().to_string()
        };
        Self { status, code, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request format: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(
            status = self.status.as_u16(),
            code = self.code,
            error = %self.message,
            "Request error"
        );
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

type Shared<S> = State<Arc<ServiceState<S>>>;

// ============================================================================
// Route Handlers
// ============================================================================

/// Create a team with its members.
async fn add_team_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<AddTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiError> {
    let Json(request) = payload?;
    let ctx = state.request_context();
    let team = state
        .reviews
        .create_team_with_members(&ctx, &request.team_name, &request.members)
        .await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

/// Fetch a team.
async fn get_team_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamDetails>, ApiError> {
    let Query(query) = query?;
    let ctx = state.request_context();
    Ok(Json(state.reviews.get_team(&ctx, &query.team_name).await?))
}

/// Toggle a user's active flag.
async fn set_active_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(request) = payload?;
    let ctx = state.request_context();
    let user = state
        .reviews
        .set_user_active(&ctx, &request.user_id, request.is_active)
        .await?;
    Ok(Json(UserResponse { user }))
}

/// Open pull requests a user reviews.
async fn get_review_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ReviewQueue>, ApiError> {
    let Query(query) = query?;
    let ctx = state.request_context();
    Ok(Json(state.reviews.get_review_queue(&ctx, &query.user_id).await?))
}

/// Open a pull request.
async fn create_pr_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<CreatePrRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrResponse>), ApiError> {
    let Json(request) = payload?;
    let ctx = state.request_context();
    let pr = state
        .reviews
        .create_pull_request(&ctx, &request.pull_request_id, &request.pull_request_name, &request.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PrResponse { pr })))
}

/// Merge a pull request.
async fn merge_pr_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<PrResponse>, ApiError> {
    let Json(request) = payload?;
    let ctx = state.request_context();
    let pr = state.reviews.merge_pull_request(&ctx, &request.pull_request_id).await?;
    Ok(Json(PrResponse { pr }))
}

/// Replace a reviewer.
async fn reassign_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiError> {
    let Json(request) = payload?;
    let ctx = state.request_context();
    let pr = state
        .reviews
        .reassign_reviewer(&ctx, &request.pull_request_id, &request.old_user_id)
        .await?;
    Ok(Json(ReassignResponse {
        replaced_by: pr.replaced_by,
        pr,
    }))
}

/// Assignment statistics.
async fn stats_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
) -> Result<Json<StatsResponse>, ApiError> {
    let ctx = state.request_context();
    let stats = state.reviews.assignment_stats(&ctx).await?;
    Ok(Json(StatsResponse { stats }))
}

/// Health check endpoint (detailed).
async fn health_handler<S: ReviewStore + 'static>(State(state): Shared<S>) -> Json<HealthResponse> {
    let db_healthy = state.reviews.store().is_healthy().await;

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_healthy,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S: ReviewStore + 'static>(
    State(state): Shared<S>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.reviews.store().is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router over any review store.
pub fn create_router<S: ReviewStore + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Teams and users
        .route("/team/add", post(add_team_handler::<S>))
        .route("/team/get", get(get_team_handler::<S>))
        .route("/users/setIsActive", post(set_active_handler::<S>))
        .route("/users/getReview", get(get_review_handler::<S>))
        // Pull requests
        .route("/pullRequest/create", post(create_pr_handler::<S>))
        .route("/pullRequest/merge", post(merge_pr_handler::<S>))
        .route("/pullRequest/reassign", post(reassign_handler::<S>))
        .route("/stats/assignments", get(stats_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::lifecycle::ReviewService;
    use crate::store::InMemoryReviewStore;

    fn uid(n: u128) -> String {
        Uuid::from_u128(n).to_string()
    }

    fn app() -> Router {
        create_router(ServiceState::new(ReviewService::new(InMemoryReviewStore::new()), None))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seed(app: &Router) {
        let (status, _) = send(
            app,
            "POST",
            "/team/add",
            Some(json!({
                "team_name": "backend",
                "members": [
                    {"user_id": uid(1), "username": "alice", "is_active": true},
                    {"user_id": uid(2), "username": "bob", "is_active": true},
                    {"user_id": uid(3), "username": "carol", "is_active": true},
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ReviewError::already_exists(Entity::Team, "backend"), StatusCode::BAD_REQUEST, "TEAM_EXISTS"),
            (ReviewError::already_exists(Entity::PullRequest, "x"), StatusCode::CONFLICT, "PR_EXISTS"),
            (ReviewError::not_found(Entity::Author, "x"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ReviewError::Conflict(ConflictKind::AlreadyMerged), StatusCode::CONFLICT, "PR_MERGED"),
            (ReviewError::Conflict(ConflictKind::NoCandidate), StatusCode::CONFLICT, "NO_CANDIDATE"),
            (ReviewError::invalid("user_id", "bad"), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (ReviewError::Cancelled, StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
        ];
        for (err, status, code) in cases {
            assert_eq!(error_status(&err), (status, code), "{err}");
        }

        let wrapped = ReviewError::Conflict(ConflictKind::NotAssigned)
            .with_rollback_failure(crate::error::StoreError::backend("gone"));
        assert_eq!(error_status(&wrapped), (StatusCode::CONFLICT, "NOT_ASSIGNED"));
    }

    #[tokio::test]
    async fn test_team_roundtrip_over_http() {
        let app = app();
        seed(&app).await;

        let (status, body) = send(&app, "GET", "/team/get?team_name=backend", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["team_name"], "backend");
        assert_eq!(body["members"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            &app,
            "POST",
            "/team/add",
            Some(json!({"team_name": "backend", "members": [{"user_id": uid(9), "username": "z", "is_active": true}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "TEAM_EXISTS");
    }

    #[tokio::test]
    async fn test_pull_request_flow_over_http() {
        let app = app();
        seed(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/pullRequest/create",
            Some(json!({"pull_request_id": uid(100), "pull_request_name": "Add retries", "author_id": uid(1)})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["pr"]["status"], "OPEN");
        assert_eq!(body["pr"]["assigned_reviewers"], json!([uid(2), uid(3)]));

        let (status, body) = send(
            &app,
            "POST",
            "/pullRequest/reassign",
            Some(json!({"pull_request_id": uid(100), "old_user_id": uid(2)})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NO_CANDIDATE");

        let (status, body) = send(&app, "GET", &format!("/users/getReview?user_id={}", uid(2)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pull_requests"].as_array().unwrap().len(), 1);

        let (status, first) = send(&app, "POST", "/pullRequest/merge", Some(json!({"pull_request_id": uid(100)}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["pr"]["status"], "MERGED");
        let (_, second) = send(&app, "POST", "/pullRequest/merge", Some(json!({"pull_request_id": uid(100)}))).await;
        assert_eq!(first["pr"]["mergedAt"], second["pr"]["mergedAt"]);

        let (status, body) = send(&app, "GET", "/stats/assignments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["prs"][0]["reviewers"], 2);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_bad_request() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/pullRequest/merge",
            Some(json!({"pull_request_id": uid(1), "force": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, body) = send(&app, "POST", "/pullRequest/merge", Some(json!({"pull_request_id": "pr-1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, _) = send(&app, "GET", "/team/get", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/pullRequest/merge", Some(json!({"pull_request_id": uid(5)}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_health_probes() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = send(&app, "GET", "/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }
}
