use crate::config::ApiConfig;
use crate::hub::BroadcastHub;
use crate::state::{EntityStateCache, MetricsSnapshot, MetricsTracker};
use crate::store::{SampleStore, StorageError};
use crate::telemetry::{EntityState, ErrorRecord, TelemetrySample};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Shared state for the query API
pub struct QueryAppState {
    pub cache: Arc<EntityStateCache>,
    pub store: Arc<dyn SampleStore>,
    pub hub: Arc<BroadcastHub>,
    pub metrics: MetricsTracker,
    pub limits: ApiConfig,
    pub active_window_seconds: i64,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub entities: usize,
    pub subscribers: usize,
    pub metrics: MetricsSnapshot,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create query API router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/robots", get(list_robots))
        .route("/api/robots/:id", get(get_robot))
        .route("/api/robots/:id/samples", get(robot_samples))
        .route(
            "/api/robots/:id/errors",
            get(robot_errors).delete(clear_robot_errors),
        )
        .with_state(state)
}

/// Requested limit, or the default, clamped to 1..=max
fn resolve_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

/// GET /health
async fn health(State(state): State<Arc<QueryAppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        entities: state.cache.len(),
        subscribers: state.hub.count(),
        metrics: state.metrics.get_snapshot(state.active_window_seconds),
    })
}

/// GET /api/robots - All robot snapshots, ordered by id
async fn list_robots(State(state): State<Arc<QueryAppState>>) -> Json<Vec<EntityState>> {
    let mut robots: Vec<EntityState> = state.cache.get_all().into_values().collect();
    robots.sort_by(|a, b| a.id.cmp(&b.id));
    Json(robots)
}

/// GET /api/robots/:id
async fn get_robot(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
) -> Result<Json<EntityState>, QueryError> {
    state.cache.get(&id).map(Json).ok_or(QueryError::NotFound)
}

/// GET /api/robots/:id/samples?limit=N - Persisted samples, newest first
async fn robot_samples(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<TelemetrySample>>, QueryError> {
    let limit = resolve_limit(
        params.limit,
        state.limits.default_limit,
        state.limits.max_limit,
    );
    let store = Arc::clone(&state.store);

    let samples = tokio::task::spawn_blocking(move || store.query(&id, limit))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))??;

    Ok(Json(samples))
}

/// GET /api/robots/:id/errors?limit=N - Persisted error log, newest first
async fn robot_errors(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<ErrorRecord>>, QueryError> {
    let limit = resolve_limit(
        params.limit,
        state.limits.default_error_limit,
        state.limits.max_limit,
    );
    let store = Arc::clone(&state.store);

    let records = tokio::task::spawn_blocking(move || store.query_errors(&id, limit))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))??;

    Ok(Json(records))
}

/// DELETE /api/robots/:id/errors - Clear the in-memory error tail
///
/// The persisted error log is append-only and stays untouched.
async fn clear_robot_errors(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, QueryError> {
    if state.cache.clear_errors(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(QueryError::NotFound)
    }
}

/// Query error types
#[derive(Debug)]
enum QueryError {
    NotFound,
    Storage(StorageError),
    Internal(String),
}

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        QueryError::Storage(e)
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            QueryError::NotFound => (StatusCode::NOT_FOUND, "Robot not found".to_string()),
            QueryError::Storage(e) => {
                error!(error = %e, "History query failed");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            QueryError::Internal(e) => {
                error!(error = %e, "Query task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
