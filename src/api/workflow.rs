use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, ApiResult, ApiState};
use crate::error::CatalogError;
use crate::queue::{matrix, JobConfig, JobStatus, MatrixSpec, Progress};

const DEFAULT_BATCH_LIMIT: usize = 100;
const MAX_ERROR_MESSAGE_LEN: usize = 1000;
const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const MIN_STALE_TIMEOUT_MINUTES: u32 = 30;
const MAX_STALE_TIMEOUT_MINUTES: u32 = 24 * 60;

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct GetBatchRequest {
    #[serde(default = "default_batch_limit")]
    pub limit: usize,
    #[serde(default)]
    pub priority_threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub config_id: Uuid,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetStaleParams {
    pub timeout_minutes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetStaleResponse {
    pub reset_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigListParams {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatrixParams {
    #[serde(default)]
    pub dry_run: bool,
}

pub(super) async fn get_batch(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<GetBatchRequest>,
) -> ApiResult<Json<Vec<JobConfig>>> {
    let max = state.queue_config.max_batch_limit;
    if request.limit == 0 || request.limit > max {
        return Err(CatalogError::InvalidRequest(format!("limit must be within 1..={}", max)).into());
    }
    let threshold = request
        .priority_threshold
        .unwrap_or(state.queue_config.default_priority_threshold);

    let batch = state.queue.dequeue_batch(request.limit, threshold).await?;
    Ok(Json(batch))
}

pub(super) async fn update_status(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<StatusUpdateRequest>,
) -> ApiResult<Json<StatusUpdateResponse>> {
    match request.status {
        JobStatus::Completed => {
            state.queue.mark_completed(id).await?;
        }
        JobStatus::Failed => {
            let message = request
                .error_message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .ok_or_else(|| {
                    CatalogError::InvalidRequest(
                        "error_message is required when status is failed".to_string(),
                    )
                })?;
            if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
                return Err(CatalogError::InvalidRequest(format!(
                    "error_message must be at most {} characters",
                    MAX_ERROR_MESSAGE_LEN
                ))
                .into());
            }
            state.queue.mark_failed(id, message).await?;
        }
        other => {
            return Err(CatalogError::InvalidRequest(format!(
                "status must be completed or failed, got {}",
                other
            ))
            .into());
        }
    }

    Ok(Json(StatusUpdateResponse {
        success: true,
        config_id: id,
        message: format!("Config marked as {}", request.status),
    }))
}

pub(super) async fn progress(
    State(state): State<ApiState>,
    ApiPath(model_version_id): ApiPath<Uuid>,
) -> ApiResult<Json<Progress>> {
    Ok(Json(state.queue.progress(model_version_id).await?))
}

pub(super) async fn reset_stale(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<ResetStaleParams>,
) -> ApiResult<Json<ResetStaleResponse>> {
    let minutes = params
        .timeout_minutes
        .unwrap_or(state.queue_config.stale_timeout_minutes);
    if !(MIN_STALE_TIMEOUT_MINUTES..=MAX_STALE_TIMEOUT_MINUTES).contains(&minutes) {
        return Err(CatalogError::InvalidRequest(format!(
            "timeout_minutes must be within {}..={}",
            MIN_STALE_TIMEOUT_MINUTES, MAX_STALE_TIMEOUT_MINUTES
        ))
        .into());
    }

    let outcome = state
        .queue
        .reset_stale(Duration::minutes(i64::from(minutes)))
        .await?;
    Ok(Json(ResetStaleResponse {
        reset_count: outcome.reset.len(),
        failed_count: outcome.failed.len(),
    }))
}

pub(super) async fn configs_for_model_version(
    State(state): State<ApiState>,
    ApiPath(model_version_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ConfigListParams>,
) -> ApiResult<Json<Vec<JobConfig>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(CatalogError::InvalidRequest(format!(
            "limit must be within 1..={}",
            MAX_LIST_LIMIT
        ))
        .into());
    }
    let configs = state
        .queue
        .configs_for_model_version(model_version_id, params.status, limit)
        .await?;
    Ok(Json(configs))
}

pub(super) async fn generate_matrix(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<MatrixParams>,
    ApiJson(spec): ApiJson<MatrixSpec>,
) -> ApiResult<Response> {
    if params.dry_run {
        return Ok(Json(spec.preview()?).into_response());
    }
    let outcome = matrix::populate(state.queue.store().as_ref(), &spec, Utc::now()).await?;
    Ok(Json(outcome).into_response())
}
