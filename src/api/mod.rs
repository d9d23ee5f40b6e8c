//! HTTP/JSON surface.
//!
//! - `/api/v1/workflow/...`: queue operations used by benchmark workers
//! - `/api/v1/recommend`, `/api/v1/models`, `/api/v1/benchmarks`: catalog
//! - `/api/v1/hardware/...`: VRAM and GPU sizing
//! - `/health`

mod catalog;
mod workflow;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::QueueConfig;
use crate::error::CatalogError;
use crate::queue::ConfigQueue;
use crate::recommend::{Recommender, ResultStore};

pub use catalog::{GpuRecommendRequest, VramRequest, VramResponse};
pub use workflow::{
    ConfigListParams, GetBatchRequest, ResetStaleParams, ResetStaleResponse, StatusUpdateRequest,
    StatusUpdateResponse,
};

#[derive(Clone)]
pub struct ApiState {
    pub queue: ConfigQueue,
    pub results: Arc<dyn ResultStore>,
    pub recommender: Arc<Recommender>,
    pub queue_config: Arc<QueueConfig>,
}

impl ApiState {
    pub fn new(
        queue: ConfigQueue,
        results: Arc<dyn ResultStore>,
        recommender: Arc<Recommender>,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            results,
            recommender,
            queue_config: Arc::new(queue_config),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// [`CatalogError`] rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub CatalogError);

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CatalogError::InvalidRequest(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(CatalogError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CatalogError::InvalidRequest(rejection.body_text()))
    }
}

/// `Json` whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub fn status_for(error: &CatalogError) -> StatusCode {
    match error {
        CatalogError::InvalidTransition { .. } | CatalogError::DuplicateConfig(_) => {
            StatusCode::CONFLICT
        }
        CatalogError::ConfigNotFound(_) | CatalogError::ModelNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidWeights(_)
        | CatalogError::InvalidRequest(_)
        | CatalogError::InvalidMatrix(_)
        | CatalogError::UnsupportedQuantization(_)
        | CatalogError::InfeasibleHardware { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        CatalogError::EmptyResultSet => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(catalog::health))
        .route(
            "/api/v1/workflow/configs/get-batch",
            post(workflow::get_batch),
        )
        .route(
            "/api/v1/workflow/configs/:id/status",
            post(workflow::update_status),
        )
        .route(
            "/api/v1/workflow/configs/:id",
            get(workflow::configs_for_model_version),
        )
        .route(
            "/api/v1/workflow/progress/:id",
            get(workflow::progress),
        )
        .route(
            "/api/v1/workflow/maintenance/reset-stale",
            post(workflow::reset_stale),
        )
        .route("/api/v1/workflow/matrix", post(workflow::generate_matrix))
        .route("/api/v1/recommend", post(catalog::recommend))
        .route(
            "/api/v1/models",
            get(catalog::list_models).post(catalog::register_model),
        )
        .route("/api/v1/benchmarks", post(catalog::record_benchmark))
        .route("/api/v1/hardware/vram/calculate", post(catalog::calculate_vram))
        .route("/api/v1/hardware/gpu/recommend", post(catalog::recommend_gpus))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}
