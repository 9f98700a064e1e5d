use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnqueueError, SettingsError};
use crate::jobs::{
    enqueue, DlqRepo, Job, JobSpec, JobState, JobsRepo, QueueSettings, SettingsRepo, StateCounts,
};

#[derive(Clone)]
pub struct ApiState {
    pub jobs: JobsRepo,
    pub dlq: DlqRepo,
    pub settings: SettingsRepo,
}

impl ApiState {
    pub fn new(jobs: JobsRepo, settings: SettingsRepo) -> Self {
        Self {
            dlq: DlqRepo::new(jobs.clone()),
            jobs,
            settings,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs).post(enqueue_job))
        .route("/jobs/:id", get(get_job))
        .route("/dlq", get(list_dlq))
        .route("/dlq/:id/requeue", post(requeue_job))
        .route("/status", get(status))
        .route("/config", get(show_config).put(set_config))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: msg.into() }))
}

fn internal_err(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %e, "admin api request failed");
    err(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

fn enqueue_err(e: EnqueueError) -> ApiError {
    match e {
        EnqueueError::DuplicateId(_) => err(StatusCode::CONFLICT, e.to_string()),
        EnqueueError::Storage(e) => internal_err(e),
        other => err(StatusCode::BAD_REQUEST, other.to_string()),
    }
}

fn settings_err(e: SettingsError) -> ApiError {
    match e {
        SettingsError::Storage(e) => internal_err(e.into()),
        other => err(StatusCode::BAD_REQUEST, other.to_string()),
    }
}

// ----------------------------
// Jobs
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub items: Vec<Job>,
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let filter = q
        .state
        .as_deref()
        .map(str::parse::<JobState>)
        .transpose()
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;

    let items = state.jobs.list_jobs(filter).await.map_err(internal_err)?;
    Ok(Json(ListJobsResponse { items }))
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: String,
}

/// Body is the raw job payload, parsed the same way as the CLI's.
pub async fn enqueue_job(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let spec = JobSpec::from_json_bytes(&body).map_err(enqueue_err)?;
    let settings = state.settings.load().await.map_err(settings_err)?;

    let job_id = enqueue(&state.jobs, spec, &settings)
        .await
        .map_err(enqueue_err)?;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { job_id })))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    match state.jobs.get_job(&id).await.map_err(internal_err)? {
        Some(job) => Ok(Json(job)),
        None => Err(err(StatusCode::NOT_FOUND, format!("job {id} not found"))),
    }
}

// ----------------------------
// DLQ
// ----------------------------

pub async fn list_dlq(State(state): State<ApiState>) -> Result<Json<ListJobsResponse>, ApiError> {
    let items = state.dlq.list().await.map_err(internal_err)?;
    Ok(Json(ListJobsResponse { items }))
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub job_id: String,
    pub requeued: bool,
}

pub async fn requeue_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RequeueResponse>, ApiError> {
    if !state.dlq.requeue(&id).await.map_err(internal_err)? {
        return Err(err(
            StatusCode::NOT_FOUND,
            format!("job {id} not found or not in DLQ"),
        ));
    }
    Ok(Json(RequeueResponse {
        job_id: id,
        requeued: true,
    }))
}

// ----------------------------
// Status / config
// ----------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counts: StateCounts,
    pub total: u64,
}

pub async fn status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let counts = state
        .jobs
        .aggregate_counts_by_state()
        .await
        .map_err(internal_err)?;
    Ok(Json(StatusResponse {
        total: counts.total(),
        counts,
    }))
}

pub async fn show_config(State(state): State<ApiState>) -> Result<Json<QueueSettings>, ApiError> {
    let settings = state.settings.load().await.map_err(settings_err)?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    pub key: String,
    pub value: Value,
}

pub async fn set_config(
    State(state): State<ApiState>,
    Json(body): Json<SetConfigRequest>,
) -> Result<Json<QueueSettings>, ApiError> {
    let value = match body.value {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let settings = state
        .settings
        .set(&body.key, &value)
        .await
        .map_err(settings_err)?;
    Ok(Json(settings))
}

pub async fn health() -> Response {
    (StatusCode::OK, "ok").into_response()
}
