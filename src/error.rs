use thiserror::Error;
use uuid::Uuid;

use crate::queue::job::{JobStatus, MatrixKey};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config already exists for {0}")]
    DuplicateConfig(MatrixKey),

    #[error("Invalid transition for config {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Config not found: {0}")]
    ConfigNotFound(Uuid),

    #[error("Model version not found: {0}")]
    ModelNotFound(Uuid),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("No hardware configuration provides {memory_gb:.2} GB within the given constraints")]
    InfeasibleHardware { memory_gb: f64 },

    #[error("No candidates left after filtering")]
    EmptyResultSet,

    #[error("Invalid matrix: {0}")]
    InvalidMatrix(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported quantization: {0}")]
    UnsupportedQuantization(String),

    #[error("Store unavailable: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
