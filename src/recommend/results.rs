//! Registered model versions, appended benchmark results, and their
//! per-workload aggregation into performance rows.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::hardware::Quantization;

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: Uuid,
    pub name: String,
    pub parameter_count: u64,
    pub quantization: Quantization,
    pub created_at: DateTime<Utc>,
}

/// Body of a model registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewModelVersion {
    pub name: String,
    pub parameter_count: u64,
    pub quantization: Quantization,
}

impl NewModelVersion {
    pub fn into_model(self, created_at: DateTime<Utc>) -> Result<ModelVersion> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(CatalogError::InvalidRequest(format!(
                "model name must be 1..={} characters",
                MAX_NAME_LEN
            )));
        }
        if self.parameter_count == 0 {
            return Err(CatalogError::InvalidRequest(
                "parameter_count must be positive".to_string(),
            ));
        }
        Ok(ModelVersion {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parameter_count: self.parameter_count,
            quantization: self.quantization,
            created_at,
        })
    }
}

/// Measurements from one benchmark run. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: Uuid,
    /// Queue config that produced this run, absent for ad-hoc runs.
    pub config_id: Option<Uuid>,
    pub model_version_id: Uuid,
    pub hardware_config: String,
    pub framework: String,
    pub workload_type: String,
    pub batch_size: u32,
    pub sequence_length: u32,
    pub ttft_p50_ms: f64,
    pub ttft_p90_ms: f64,
    pub ttft_p99_ms: f64,
    pub tpot_p90_ms: Option<f64>,
    pub throughput_tokens_sec: f64,
    pub rps_sustained: f64,
    pub accuracy_score: Option<f64>,
    pub gpu_utilization_pct: Option<f64>,
    pub memory_used_gb: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Body of a result submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBenchmarkResult {
    #[serde(default)]
    pub config_id: Option<Uuid>,
    pub model_version_id: Uuid,
    pub hardware_config: String,
    pub framework: String,
    pub workload_type: String,
    pub batch_size: u32,
    pub sequence_length: u32,
    pub ttft_p50_ms: f64,
    pub ttft_p90_ms: f64,
    pub ttft_p99_ms: f64,
    #[serde(default)]
    pub tpot_p90_ms: Option<f64>,
    pub throughput_tokens_sec: f64,
    pub rps_sustained: f64,
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    #[serde(default)]
    pub gpu_utilization_pct: Option<f64>,
    #[serde(default)]
    pub memory_used_gb: Option<f64>,
}

impl NewBenchmarkResult {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("hardware_config", &self.hardware_config),
            ("framework", &self.framework),
            ("workload_type", &self.workload_type),
        ] {
            if value.trim().is_empty() {
                return Err(CatalogError::InvalidRequest(format!("{} must not be blank", field)));
            }
        }
        if self.batch_size == 0 || self.sequence_length == 0 {
            return Err(CatalogError::InvalidRequest(
                "batch_size and sequence_length must be positive".to_string(),
            ));
        }

        let metrics = [
            ("ttft_p50_ms", Some(self.ttft_p50_ms)),
            ("ttft_p90_ms", Some(self.ttft_p90_ms)),
            ("ttft_p99_ms", Some(self.ttft_p99_ms)),
            ("tpot_p90_ms", self.tpot_p90_ms),
            ("throughput_tokens_sec", Some(self.throughput_tokens_sec)),
            ("rps_sustained", Some(self.rps_sustained)),
            ("gpu_utilization_pct", self.gpu_utilization_pct),
            ("memory_used_gb", self.memory_used_gb),
        ];
        for (field, value) in metrics {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CatalogError::InvalidRequest(format!(
                        "{} must be a non-negative number",
                        field
                    )));
                }
            }
        }

        if !(self.ttft_p50_ms <= self.ttft_p90_ms && self.ttft_p90_ms <= self.ttft_p99_ms) {
            return Err(CatalogError::InvalidRequest(
                "TTFT percentiles must satisfy p50 <= p90 <= p99".to_string(),
            ));
        }
        if let Some(acc) = self.accuracy_score {
            if !(0.0..=1.0).contains(&acc) {
                return Err(CatalogError::InvalidRequest(
                    "accuracy_score must be within [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_result(self, recorded_at: DateTime<Utc>) -> Result<BenchmarkResult> {
        self.validate()?;
        Ok(BenchmarkResult {
            id: Uuid::new_v4(),
            config_id: self.config_id,
            model_version_id: self.model_version_id,
            hardware_config: self.hardware_config,
            framework: self.framework,
            workload_type: self.workload_type,
            batch_size: self.batch_size,
            sequence_length: self.sequence_length,
            ttft_p50_ms: self.ttft_p50_ms,
            ttft_p90_ms: self.ttft_p90_ms,
            ttft_p99_ms: self.ttft_p99_ms,
            tpot_p90_ms: self.tpot_p90_ms,
            throughput_tokens_sec: self.throughput_tokens_sec,
            rps_sustained: self.rps_sustained,
            accuracy_score: self.accuracy_score,
            gpu_utilization_pct: self.gpu_utilization_pct,
            memory_used_gb: self.memory_used_gb,
            recorded_at,
        })
    }
}

/// Mean performance of one (model version, hardware, framework) combination
/// on one workload type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub model_version_id: Uuid,
    pub model_name: String,
    pub parameter_count: u64,
    pub quantization: Quantization,
    pub hardware_config: String,
    pub framework: String,
    pub avg_ttft_p90_ms: f64,
    pub avg_throughput_tokens_sec: f64,
    pub avg_rps_sustained: f64,
    /// `None` when no sample reported accuracy.
    pub avg_accuracy: Option<f64>,
    pub sample_count: usize,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn insert_model(&self, model: ModelVersion) -> Result<()>;

    async fn get_model(&self, id: Uuid) -> Result<Option<ModelVersion>>;

    async fn list_models(&self) -> Result<Vec<ModelVersion>>;

    /// Append a result. Fails with `ModelNotFound` for unregistered models.
    async fn append_result(&self, result: BenchmarkResult) -> Result<()>;

    /// Results of `workload_type` aggregated per (model version, hardware,
    /// framework), ordered by (model name, hardware, framework).
    async fn performance_rows(&self, workload_type: &str) -> Result<Vec<PerformanceRow>>;
}

#[derive(Debug, Default)]
struct ResultTables {
    models: HashMap<Uuid, ModelVersion>,
    results: Vec<BenchmarkResult>,
}

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    tables: RwLock<ResultTables>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn result_count(&self) -> usize {
        self.tables.read().await.results.len()
    }
}

#[derive(Default)]
struct Accumulator {
    ttft_p90: f64,
    throughput: f64,
    rps: f64,
    accuracy: f64,
    accuracy_samples: usize,
    samples: usize,
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn insert_model(&self, model: ModelVersion) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.models.contains_key(&model.id) {
            return Err(CatalogError::InvalidRequest(format!(
                "model version {} already registered",
                model.id
            )));
        }
        tables.models.insert(model.id, model);
        Ok(())
    }

    async fn get_model(&self, id: Uuid) -> Result<Option<ModelVersion>> {
        Ok(self.tables.read().await.models.get(&id).cloned())
    }

    async fn list_models(&self) -> Result<Vec<ModelVersion>> {
        let tables = self.tables.read().await;
        let mut models: Vec<ModelVersion> = tables.models.values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(models)
    }

    async fn append_result(&self, result: BenchmarkResult) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.models.contains_key(&result.model_version_id) {
            return Err(CatalogError::ModelNotFound(result.model_version_id));
        }
        tables.results.push(result);
        Ok(())
    }

    async fn performance_rows(&self, workload_type: &str) -> Result<Vec<PerformanceRow>> {
        let tables = self.tables.read().await;

        let mut groups: BTreeMap<(String, Uuid, String, String), Accumulator> = BTreeMap::new();
        for result in tables
            .results
            .iter()
            .filter(|r| r.workload_type == workload_type)
        {
            let Some(model) = tables.models.get(&result.model_version_id) else {
                continue;
            };
            let acc = groups
                .entry((
                    model.name.clone(),
                    model.id,
                    result.hardware_config.clone(),
                    result.framework.clone(),
                ))
                .or_default();
            acc.ttft_p90 += result.ttft_p90_ms;
            acc.throughput += result.throughput_tokens_sec;
            acc.rps += result.rps_sustained;
            if let Some(a) = result.accuracy_score {
                acc.accuracy += a;
                acc.accuracy_samples += 1;
            }
            acc.samples += 1;
        }

        Ok(groups
            .into_iter()
            .filter_map(|((_, model_id, hardware_config, framework), acc)| {
                let model = tables.models.get(&model_id)?;
                let n = acc.samples as f64;
                Some(PerformanceRow {
                    model_version_id: model_id,
                    model_name: model.name.clone(),
                    parameter_count: model.parameter_count,
                    quantization: model.quantization,
                    hardware_config,
                    framework,
                    avg_ttft_p90_ms: acc.ttft_p90 / n,
                    avg_throughput_tokens_sec: acc.throughput / n,
                    avg_rps_sustained: acc.rps / n,
                    avg_accuracy: (acc.accuracy_samples > 0)
                        .then(|| acc.accuracy / acc.accuracy_samples as f64),
                    sample_count: acc.samples,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model(name: &str) -> ModelVersion {
        NewModelVersion {
            name: name.to_string(),
            parameter_count: 7_000_000_000,
            quantization: Quantization::Fp16,
        }
        .into_model(Utc::now())
        .unwrap()
    }

    fn sample(model_version_id: Uuid, hardware: &str, ttft_p90: f64, accuracy: Option<f64>) -> NewBenchmarkResult {
        NewBenchmarkResult {
            config_id: None,
            model_version_id,
            hardware_config: hardware.to_string(),
            framework: "vllm".to_string(),
            workload_type: "chatbot".to_string(),
            batch_size: 1,
            sequence_length: 1024,
            ttft_p50_ms: ttft_p90 / 2.0,
            ttft_p90_ms: ttft_p90,
            ttft_p99_ms: ttft_p90 * 2.0,
            tpot_p90_ms: None,
            throughput_tokens_sec: 400.0,
            rps_sustained: 5.0,
            accuracy_score: accuracy,
            gpu_utilization_pct: Some(80.0),
            memory_used_gb: Some(16.0),
        }
    }

    #[test]
    fn model_registration_validates_fields() {
        let blank = NewModelVersion {
            name: "  ".to_string(),
            parameter_count: 1,
            quantization: Quantization::Int8,
        };
        assert!(blank.into_model(Utc::now()).is_err());

        let zero = NewModelVersion {
            name: "tiny".to_string(),
            parameter_count: 0,
            quantization: Quantization::Int8,
        };
        assert!(zero.into_model(Utc::now()).is_err());
    }

    #[test]
    fn model_name_limit_counts_characters() {
        let named = |name: String| NewModelVersion {
            name,
            parameter_count: 1,
            quantization: Quantization::Fp16,
        };
        // 200 two-byte characters fit; one more does not.
        let model = named("é".repeat(MAX_NAME_LEN)).into_model(Utc::now()).unwrap();
        assert_eq!(model.name.chars().count(), MAX_NAME_LEN);
        assert!(named("é".repeat(MAX_NAME_LEN + 1))
            .into_model(Utc::now())
            .is_err());
    }

    #[test]
    fn result_validation() {
        let id = Uuid::new_v4();
        assert!(sample(id, "L4", 100.0, Some(0.8)).validate().is_ok());

        let mut bad = sample(id, "L4", 100.0, Some(1.5));
        assert!(bad.validate().is_err());

        bad = sample(id, "L4", 100.0, None);
        bad.ttft_p50_ms = 500.0;
        assert!(bad.validate().unwrap_err().to_string().contains("p50 <= p90"));

        bad = sample(id, "", 100.0, None);
        assert!(bad.validate().is_err());

        bad = sample(id, "L4", 100.0, None);
        bad.throughput_tokens_sec = f64::NAN;
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn rejects_results_for_unknown_models() {
        let store = MemoryResultStore::new();
        let result = sample(Uuid::new_v4(), "L4", 100.0, None)
            .into_result(Utc::now())
            .unwrap();
        assert!(matches!(
            store.append_result(result).await,
            Err(CatalogError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn aggregates_per_model_hardware_framework() {
        let store = MemoryResultStore::new();
        let m = model("llama-7b");
        let id = m.id;
        store.insert_model(m).await.unwrap();

        for (hw, ttft, acc) in [
            ("L4", 100.0, Some(0.8)),
            ("L4", 200.0, None),
            ("H100", 50.0, Some(0.9)),
        ] {
            let result = sample(id, hw, ttft, acc).into_result(Utc::now()).unwrap();
            store.append_result(result).await.unwrap();
        }
        let mut other_workload = sample(id, "L4", 999.0, None);
        other_workload.workload_type = "summarization".to_string();
        store
            .append_result(other_workload.into_result(Utc::now()).unwrap())
            .await
            .unwrap();

        let rows = store.performance_rows("chatbot").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].hardware_config, "H100");
        let l4 = &rows[1];
        assert_eq!(l4.sample_count, 2);
        assert_relative_eq!(l4.avg_ttft_p90_ms, 150.0);
        assert_eq!(l4.avg_accuracy, Some(0.8));

        assert_eq!(store.performance_rows("summarization").await.unwrap().len(), 1);
        assert!(store.performance_rows("qa").await.unwrap().is_empty());
        assert_eq!(store.result_count().await, 4);
    }
}
