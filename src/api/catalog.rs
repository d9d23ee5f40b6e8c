use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiResult, ApiState};
use crate::error::CatalogError;
use crate::hardware::{vram, HardwareCandidate, HardwareConstraints, Quantization};
use crate::recommend::{
    BenchmarkResult, ModelVersion, NewBenchmarkResult, NewModelVersion, RecommendationRequest,
    RecommendationResponse,
};

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(super) async fn recommend(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<RecommendationRequest>,
) -> ApiResult<Json<RecommendationResponse>> {
    Ok(Json(state.recommender.recommend(&request).await?))
}

pub(super) async fn register_model(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<NewModelVersion>,
) -> ApiResult<(StatusCode, Json<ModelVersion>)> {
    let model = request.into_model(Utc::now())?;
    state.results.insert_model(model.clone()).await?;
    tracing::info!(
        model_version_id = %model.id,
        name = %model.name,
        quantization = %model.quantization,
        "Registered model version"
    );
    Ok((StatusCode::CREATED, Json(model)))
}

pub(super) async fn list_models(State(state): State<ApiState>) -> ApiResult<Json<Vec<ModelVersion>>> {
    Ok(Json(state.results.list_models().await?))
}

pub(super) async fn record_benchmark(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<NewBenchmarkResult>,
) -> ApiResult<(StatusCode, Json<BenchmarkResult>)> {
    if let Some(config_id) = request.config_id {
        // fails with ConfigNotFound for unknown ids
        state.queue.get(config_id).await?;
    }
    let result = request.into_result(Utc::now())?;
    state.results.append_result(result.clone()).await?;
    tracing::debug!(
        result_id = %result.id,
        model_version_id = %result.model_version_id,
        workload = %result.workload_type,
        "Recorded benchmark result"
    );
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct VramRequest {
    pub parameter_count: u64,
    pub quantization: String,
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// When set, also report the largest batch size that fits.
    #[serde(default)]
    pub available_gb: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VramResponse {
    pub parameter_count: u64,
    pub quantization: Quantization,
    pub vram_gb: f64,
    pub batch_size: u32,
    pub vram_with_batch_gb: f64,
    pub max_batch_size: Option<u32>,
    pub comparison: Vec<(Quantization, f64)>,
}

pub(super) async fn calculate_vram(
    ApiJson(request): ApiJson<VramRequest>,
) -> ApiResult<Json<VramResponse>> {
    let quantization: Quantization = request.quantization.parse()?;
    let batch_size = request.batch_size.unwrap_or(1);
    if batch_size == 0 || batch_size > vram::MAX_BATCH_SIZE {
        return Err(CatalogError::InvalidRequest(format!(
            "batch_size must be within 1..={}",
            vram::MAX_BATCH_SIZE
        ))
        .into());
    }
    if let Some(available) = request.available_gb {
        if !available.is_finite() || available <= 0.0 {
            return Err(CatalogError::InvalidRequest("available_gb must be positive".to_string()).into());
        }
    }

    let params = request.parameter_count;
    Ok(Json(VramResponse {
        parameter_count: params,
        quantization,
        vram_gb: vram::estimate(params, quantization),
        batch_size,
        vram_with_batch_gb: vram::estimate_with_batch(params, quantization, batch_size),
        max_batch_size: request
            .available_gb
            .and_then(|gb| vram::max_batch_size(params, quantization, gb)),
        comparison: vram::quantization_comparison(params),
    }))
}

#[derive(Debug, Deserialize)]
pub struct GpuRecommendRequest {
    pub memory_gb: f64,
    #[serde(default)]
    pub constraints: HardwareConstraints,
}

pub(super) async fn recommend_gpus(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<GpuRecommendRequest>,
) -> ApiResult<Json<Vec<HardwareCandidate>>> {
    if !request.memory_gb.is_finite() || request.memory_gb <= 0.0 {
        return Err(CatalogError::InvalidRequest("memory_gb must be positive".to_string()).into());
    }
    let candidates = state
        .recommender
        .matcher()
        .find(request.memory_gb, &request.constraints);
    if candidates.is_empty() {
        return Err(CatalogError::InfeasibleHardware {
            memory_gb: request.memory_gb,
        }
        .into());
    }
    Ok(Json(candidates))
}
