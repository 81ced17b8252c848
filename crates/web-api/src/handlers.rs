use autoani_core::{
    AbTest, AbTestError, AnalysisResult, Assignment, ExperimentEngine, NewAbTest, RecordOutcome,
    StopReason, TestStatus,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

type Engine = State<Arc<ExperimentEngine>>;

/// Engine error rendered as `{ "error": ... }` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AbTestError> for ApiError {
    fn from(err: AbTestError) -> Self {
        let status = match &err {
            AbTestError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            AbTestError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            AbTestError::UnknownTestOrArm { .. } => StatusCode::NOT_FOUND,
            AbTestError::Storage(e) => {
                error!("Storage failure while serving request: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct TestListResponse {
    pub tests: Vec<AbTest>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignQuery {
    pub visitor_id: String,
}

#[derive(Deserialize)]
pub struct EventRequest {
    pub arm_id: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Lists tests, newest first, optionally filtered by `?status=`.
///
/// # Errors
/// Returns 400 for an unknown status filter, 500 if the store fails.
pub async fn list_tests(
    State(engine): Engine,
    Query(query): Query<ListQuery>,
) -> Result<Json<TestListResponse>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            TestStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };

    let tests = engine.lifecycle().list(status).await?;
    Ok(Json(TestListResponse { tests }))
}

/// Creates a test in DRAFT.
///
/// # Errors
/// Returns 400 if the definition is invalid.
pub async fn create_test(
    State(engine): Engine,
    Json(req): Json<NewAbTest>,
) -> Result<(StatusCode, Json<AbTest>), ApiError> {
    let test = engine.lifecycle().create(req).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// # Errors
/// Returns 404 if the test doesn't exist.
pub async fn get_test(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    Ok(Json(engine.lifecycle().get(&test_id).await?))
}

/// # Errors
/// Returns 404 if the test doesn't exist, 409 unless it is DRAFT.
pub async fn start_test(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    Ok(Json(engine.lifecycle().start(&test_id).await?))
}

/// # Errors
/// Returns 404 if the test doesn't exist, 409 unless it is RUNNING.
pub async fn pause_test(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    Ok(Json(engine.lifecycle().pause(&test_id).await?))
}

/// # Errors
/// Returns 404 if the test doesn't exist, 409 unless it is PAUSED.
pub async fn resume_test(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    Ok(Json(engine.lifecycle().resume(&test_id).await?))
}

/// Concludes a test. Stopping a completed test returns it unchanged.
///
/// # Errors
/// Returns 404 if the test doesn't exist.
pub async fn stop_test(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AbTest>, ApiError> {
    Ok(Json(
        engine.lifecycle().stop(&test_id, StopReason::Manual).await?,
    ))
}

/// # Errors
/// Returns 404 if the test doesn't exist.
pub async fn assign_visitor(
    State(engine): Engine,
    Path(test_id): Path<String>,
    Query(query): Query<AssignQuery>,
) -> Result<Json<Assignment>, ApiError> {
    if query.visitor_id.is_empty() {
        return Err(ApiError::bad_request("visitor_id must not be empty"));
    }
    Ok(Json(
        engine.assign_visitor(&test_id, &query.visitor_id).await?,
    ))
}

/// Records an impression. Stray events answer 202 with an `ignored` outcome.
///
/// # Errors
/// Returns 500 if the store fails.
pub async fn record_impression(
    State(engine): Engine,
    Path(test_id): Path<String>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<RecordOutcome>), ApiError> {
    let outcome = engine
        .recorder()
        .record_impression(&test_id, &req.arm_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// Records a conversion. Stray events answer 202 with an `ignored` outcome.
///
/// # Errors
/// Returns 500 if the store fails.
pub async fn record_conversion(
    State(engine): Engine,
    Path(test_id): Path<String>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<RecordOutcome>), ApiError> {
    let outcome = engine
        .recorder()
        .record_conversion(&test_id, &req.arm_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// # Errors
/// Returns 404 if the test doesn't exist.
pub async fn get_results(
    State(engine): Engine,
    Path(test_id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    Ok(Json(engine.results(&test_id).await?))
}
