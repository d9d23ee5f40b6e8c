//! Expansion of test dimensions into benchmark configs.
//!
//! A [`MatrixSpec`] names the model version under test and the sets of
//! hardware configurations, frameworks, workloads, batch sizes and sequence
//! lengths to cover. [`populate`] writes one pending [`JobConfig`] per cell
//! of their Cartesian product in a single store call. Cells that already
//! exist are skipped, so re-running a spec is a no-op for covered cells.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::queue::job::{JobConfig, MatrixKey};
use crate::queue::store::ConfigStore;

pub const WORKLOAD_TYPES: [&str; 5] = [
    "chatbot",
    "summarization",
    "qa",
    "code-generation",
    "creative-writing",
];
pub const BATCH_SIZES: [u32; 4] = [1, 2, 4, 8];
pub const SEQUENCE_LENGTHS: [u32; 3] = [1024, 2048, 4096];

/// Priority of a matrix cell. Lower runs sooner.
///
/// Interactive workloads come first, then each extra batch element adds 10
/// and longer contexts add up to 80.
pub fn calculate_priority(workload_type: &str, batch_size: u32, sequence_length: u32) -> i32 {
    let base: i32 = match workload_type {
        "chatbot" => 100,
        "qa" => 200,
        "code-generation" => 300,
        "creative-writing" => 400,
        "summarization" => 500,
        _ => 600,
    };

    let batch_penalty = (batch_size.saturating_sub(1) as i32).saturating_mul(10);

    let seq_penalty = match sequence_length {
        1024 => 0,
        2048 => 20,
        4096 => 40,
        8192 => 60,
        _ => 80,
    };

    base.saturating_add(batch_penalty).saturating_add(seq_penalty)
}

fn default_workloads() -> Vec<String> {
    WORKLOAD_TYPES.iter().map(|w| w.to_string()).collect()
}

fn default_batch_sizes() -> Vec<u32> {
    BATCH_SIZES.to_vec()
}

fn default_sequence_lengths() -> Vec<u32> {
    SEQUENCE_LENGTHS.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub model_version_id: Uuid,
    pub hardware_configs: Vec<String>,
    pub frameworks: Vec<String>,
    #[serde(default = "default_workloads")]
    pub workload_types: Vec<String>,
    #[serde(default = "default_batch_sizes")]
    pub batch_sizes: Vec<u32>,
    #[serde(default = "default_sequence_lengths")]
    pub sequence_lengths: Vec<u32>,
}

impl MatrixSpec {
    /// Spec over the standard workload, batch size and sequence length sets.
    pub fn new(model_version_id: Uuid, hardware_configs: Vec<String>, frameworks: Vec<String>) -> Self {
        Self {
            model_version_id,
            hardware_configs,
            frameworks,
            workload_types: default_workloads(),
            batch_sizes: default_batch_sizes(),
            sequence_lengths: default_sequence_lengths(),
        }
    }

    pub fn with_workloads(mut self, workload_types: Vec<String>) -> Self {
        self.workload_types = workload_types;
        self
    }

    pub fn with_batch_sizes(mut self, batch_sizes: Vec<u32>) -> Self {
        self.batch_sizes = batch_sizes;
        self
    }

    pub fn with_sequence_lengths(mut self, sequence_lengths: Vec<u32>) -> Self {
        self.sequence_lengths = sequence_lengths;
        self
    }

    /// Number of cells in the full product.
    pub fn cell_count(&self) -> usize {
        self.hardware_configs.len()
            * self.frameworks.len()
            * self.workload_types.len()
            * self.batch_sizes.len()
            * self.sequence_lengths.len()
    }

    /// Reject specs whose product would be empty or would contain the same
    /// cell twice.
    pub fn validate(&self) -> Result<()> {
        check_dimension("hardware_configs", &self.hardware_configs)?;
        check_dimension("frameworks", &self.frameworks)?;
        check_dimension("workload_types", &self.workload_types)?;
        check_dimension("batch_sizes", &self.batch_sizes)?;
        check_dimension("sequence_lengths", &self.sequence_lengths)?;

        for (name, values) in [
            ("hardware_configs", &self.hardware_configs),
            ("frameworks", &self.frameworks),
            ("workload_types", &self.workload_types),
        ] {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(CatalogError::InvalidMatrix(format!(
                    "{} contains an empty identifier",
                    name
                )));
            }
        }
        if self.batch_sizes.contains(&0) {
            return Err(CatalogError::InvalidMatrix(
                "batch_sizes must be positive".to_string(),
            ));
        }
        if self.sequence_lengths.contains(&0) {
            return Err(CatalogError::InvalidMatrix(
                "sequence_lengths must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Every cell of the product, in hardware-major order.
    pub fn keys(&self) -> Vec<MatrixKey> {
        let mut keys = Vec::with_capacity(self.cell_count());
        for hardware in &self.hardware_configs {
            for framework in &self.frameworks {
                for workload in &self.workload_types {
                    for &batch_size in &self.batch_sizes {
                        for &sequence_length in &self.sequence_lengths {
                            keys.push(MatrixKey {
                                model_version_id: self.model_version_id,
                                hardware_config: hardware.clone(),
                                framework: framework.clone(),
                                workload_type: workload.clone(),
                                batch_size,
                                sequence_length,
                            });
                        }
                    }
                }
            }
        }
        keys
    }

    /// Pending configs for every cell, all stamped with `created_at`.
    pub fn build_configs(&self, created_at: DateTime<Utc>) -> Result<Vec<JobConfig>> {
        self.validate()?;
        Ok(self
            .keys()
            .into_iter()
            .map(|key| {
                let priority =
                    calculate_priority(&key.workload_type, key.batch_size, key.sequence_length);
                JobConfig::new(key, priority, created_at)
            })
            .collect())
    }

    /// Size and priority distribution of the product, without writing anything.
    pub fn preview(&self) -> Result<MatrixPreview> {
        self.validate()?;

        let mut buckets: BTreeMap<&'static str, usize> = BTreeMap::new();
        for bucket in PRIORITY_BUCKETS {
            buckets.insert(bucket, 0);
        }
        let per_hardware = self.frameworks.len();
        for workload in &self.workload_types {
            for &batch_size in &self.batch_sizes {
                for &sequence_length in &self.sequence_lengths {
                    let priority = calculate_priority(workload, batch_size, sequence_length);
                    *buckets.entry(priority_bucket(priority)).or_default() +=
                        per_hardware * self.hardware_configs.len();
                }
            }
        }

        Ok(MatrixPreview {
            model_version_id: self.model_version_id,
            hardware_configs: self.hardware_configs.len(),
            frameworks: self.frameworks.len(),
            workload_types: self.workload_types.len(),
            batch_sizes: self.batch_sizes.len(),
            sequence_lengths: self.sequence_lengths.len(),
            total: self.cell_count(),
            priority_distribution: buckets
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        })
    }
}

const PRIORITY_BUCKETS: [&str; 4] = ["100-199", "200-299", "300-499", "500+"];

fn priority_bucket(priority: i32) -> &'static str {
    match priority {
        i32::MIN..=199 => "100-199",
        200..=299 => "200-299",
        300..=499 => "300-499",
        _ => "500+",
    }
}

fn check_dimension<T: Eq + Hash + std::fmt::Debug>(name: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(CatalogError::InvalidMatrix(format!("{} is empty", name)));
    }
    let mut seen = HashSet::with_capacity(values.len());
    for value in values {
        if !seen.insert(value) {
            return Err(CatalogError::InvalidMatrix(format!(
                "{} contains {:?} more than once",
                name, value
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixPreview {
    pub model_version_id: Uuid,
    pub hardware_configs: usize,
    pub frameworks: usize,
    pub workload_types: usize,
    pub batch_sizes: usize,
    pub sequence_lengths: usize,
    pub total: usize,
    pub priority_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatrixOutcome {
    /// Cells in the product.
    pub requested: usize,
    /// Cells written by this call.
    pub inserted: usize,
    /// Cells that already existed and were left untouched.
    pub skipped: usize,
}

/// Write the pending configs of `spec` to `store` in one bulk insert.
pub async fn populate(
    store: &dyn ConfigStore,
    spec: &MatrixSpec,
    created_at: DateTime<Utc>,
) -> Result<MatrixOutcome> {
    let configs = spec.build_configs(created_at)?;
    let requested = configs.len();
    let inserted = store.insert_missing(configs).await?;

    tracing::info!(
        model_version_id = %spec.model_version_id,
        requested,
        inserted,
        skipped = requested - inserted,
        "Populated benchmark matrix"
    );

    Ok(MatrixOutcome {
        requested,
        inserted,
        skipped: requested - inserted,
    })
}
