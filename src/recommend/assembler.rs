use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{CriteriaWeights, RecommendConfig};
use crate::error::{CatalogError, Result};
use crate::hardware::{vram, HardwareCandidate, HardwareConstraints, HardwareMatcher, Quantization};
use crate::ranking::{pareto, topsis, DecisionMatrix, Objective};
use crate::recommend::results::{PerformanceRow, ResultStore};

pub const ACCURACY: &str = "accuracy";
pub const LATENCY: &str = "latency";
pub const THROUGHPUT: &str = "throughput";
pub const COST: &str = "cost";

const CRITERIA: [&str; 4] = [ACCURACY, LATENCY, THROUGHPUT, COST];
const BENEFIT: [&str; 2] = [ACCURACY, THROUGHPUT];
const COST_CRITERIA: [&str; 2] = [LATENCY, COST];

/// Expected traffic. `rps * tokens` is the token throughput a candidate must sustain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub rps: f64,
    pub tokens: f64,
}

impl LoadProfile {
    pub fn tokens_per_sec(&self) -> f64 {
        self.rps * self.tokens
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaThresholds {
    pub latency_p90_ms: Option<f64>,
    pub min_accuracy: Option<f64>,
    pub min_throughput: Option<f64>,
    pub max_cost_per_hour: Option<f64>,
}

/// How the final list is ordered when TOPSIS and Pareto disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrdering {
    /// TOPSIS score descending.
    #[default]
    Score,
    /// Pareto front ascending, TOPSIS score descending within a front.
    Pareto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub use_case: String,
    #[serde(default)]
    pub load: Option<LoadProfile>,
    #[serde(default)]
    pub sla: SlaThresholds,
    /// Overrides the use case defaults when present.
    #[serde(default)]
    pub weights: Option<CriteriaWeights>,
    #[serde(default)]
    pub constraints: HardwareConstraints,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub ordering: RankOrdering,
}

impl RecommendationRequest {
    pub fn new(use_case: impl Into<String>) -> Self {
        Self {
            use_case: use_case.into(),
            load: None,
            sla: SlaThresholds::default(),
            weights: None,
            constraints: HardwareConstraints::default(),
            limit: None,
            ordering: RankOrdering::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// Hardware the measurements were taken on.
    pub benchmarked_hardware: String,
    pub framework: String,
    pub avg_ttft_p90_ms: f64,
    pub avg_throughput_tokens_sec: f64,
    pub avg_rps_sustained: f64,
    pub avg_accuracy: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Position in the returned list, 1 = best.
    pub rank: usize,
    pub model_version_id: Uuid,
    pub model_name: String,
    pub parameter_count: u64,
    pub quantization: Quantization,
    pub topsis_score: f64,
    pub pareto_front: usize,
    /// Feasible candidates this one dominates.
    pub dominates: usize,
    pub vram_gb: f64,
    pub hardware: HardwareCandidate,
    pub performance: PerformanceSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationMetadata {
    pub use_case: String,
    /// Performance rows found for the use case.
    pub total_candidates: usize,
    /// Rows with at least one hardware configuration that fits.
    pub feasible: usize,
    pub after_sla: usize,
    pub weights: CriteriaWeights,
    pub ordering: RankOrdering,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResponse {
    pub models: Vec<Recommendation>,
    pub metadata: RecommendationMetadata,
}

fn weight_map(weights: &CriteriaWeights) -> HashMap<String, f64> {
    HashMap::from([
        (ACCURACY.to_string(), weights.accuracy),
        (LATENCY.to_string(), weights.latency),
        (THROUGHPUT.to_string(), weights.throughput),
        (COST.to_string(), weights.cost),
    ])
}

fn objectives() -> Vec<Objective> {
    vec![
        Objective::maximize(ACCURACY),
        Objective::minimize(LATENCY),
        Objective::maximize(THROUGHPUT),
        Objective::minimize(COST),
    ]
}

struct Feasible {
    row: PerformanceRow,
    vram_gb: f64,
    hardware: HardwareCandidate,
}

/// Turns aggregated benchmark rows into ranked recommendations.
///
/// Read-only with respect to every store; each call owns its own data.
pub struct Recommender {
    results: Arc<dyn ResultStore>,
    matcher: HardwareMatcher,
    config: RecommendConfig,
}

impl Recommender {
    pub fn new(results: Arc<dyn ResultStore>, matcher: HardwareMatcher, config: RecommendConfig) -> Self {
        Self {
            results,
            matcher,
            config,
        }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    pub fn matcher(&self) -> &HardwareMatcher {
        &self.matcher
    }

    pub async fn recommend(&self, request: &RecommendationRequest) -> Result<RecommendationResponse> {
        let (weights, limit) = self.validate(request)?;
        let rows = self.results.performance_rows(&request.use_case).await?;
        self.assemble(request, weights, limit, rows)
    }

    /// Check everything that does not depend on stored data. Returns the
    /// effective weights and limit.
    pub fn validate(&self, request: &RecommendationRequest) -> Result<(CriteriaWeights, usize)> {
        if request.use_case.trim().is_empty() {
            return Err(CatalogError::InvalidRequest("use_case must not be blank".to_string()));
        }

        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(CatalogError::InvalidRequest(format!(
                "limit must be within 1..={}",
                self.config.max_limit
            )));
        }

        let sla = &request.sla;
        for (name, value) in [
            ("sla.latency_p90_ms", sla.latency_p90_ms),
            ("sla.min_accuracy", sla.min_accuracy),
            ("sla.min_throughput", sla.min_throughput),
            ("sla.max_cost_per_hour", sla.max_cost_per_hour),
            ("constraints.max_cost_per_hour", request.constraints.max_cost_per_hour),
            ("load.rps", request.load.map(|l| l.rps)),
            ("load.tokens", request.load.map(|l| l.tokens)),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CatalogError::InvalidRequest(format!(
                        "{} must be a non-negative number",
                        name
                    )));
                }
            }
        }

        let weights = request
            .weights
            .unwrap_or_else(|| self.config.weights_for(&request.use_case));
        let criteria: Vec<String> = CRITERIA.iter().map(|c| c.to_string()).collect();
        topsis::validate(&criteria, &weight_map(&weights), &BENEFIT, &COST_CRITERIA)?;

        Ok((weights, limit))
    }

    /// Rank `rows` for `request`. Pure apart from logging.
    pub fn rank(
        &self,
        request: &RecommendationRequest,
        rows: Vec<PerformanceRow>,
    ) -> Result<RecommendationResponse> {
        let (weights, limit) = self.validate(request)?;
        self.assemble(request, weights, limit, rows)
    }

    fn assemble(
        &self,
        request: &RecommendationRequest,
        weights: CriteriaWeights,
        limit: usize,
        rows: Vec<PerformanceRow>,
    ) -> Result<RecommendationResponse> {
        let total_candidates = rows.len();

        let feasible: Vec<Feasible> = rows
            .into_iter()
            .filter_map(|row| {
                let metrics = [
                    row.avg_accuracy.unwrap_or(0.0),
                    row.avg_ttft_p90_ms,
                    row.avg_throughput_tokens_sec,
                ];
                if metrics.iter().any(|v| !v.is_finite()) {
                    tracing::debug!(
                        model = %row.model_name,
                        hardware = %row.hardware_config,
                        "Dropping candidate with non-finite performance"
                    );
                    return None;
                }
                let vram_gb = vram::estimate(row.parameter_count, row.quantization);
                match self.matcher.best(vram_gb, &request.constraints) {
                    Ok(hardware) => Some(Feasible {
                        row,
                        vram_gb,
                        hardware,
                    }),
                    Err(e) => {
                        tracing::debug!(
                            model = %row.model_name,
                            hardware = %row.hardware_config,
                            error = %e,
                            "Dropping candidate without feasible hardware"
                        );
                        None
                    }
                }
            })
            .collect();

        let mut metadata = RecommendationMetadata {
            use_case: request.use_case.clone(),
            total_candidates,
            feasible: feasible.len(),
            after_sla: 0,
            weights,
            ordering: request.ordering,
            limit,
        };
        if feasible.is_empty() {
            return Ok(RecommendationResponse {
                models: Vec::new(),
                metadata,
            });
        }

        let mut matrix = DecisionMatrix::new(CRITERIA);
        for f in &feasible {
            matrix.push_row(vec![
                f.row.avg_accuracy.unwrap_or(0.0),
                f.row.avg_ttft_p90_ms,
                f.row.avg_throughput_tokens_sec,
                f.hardware.cost_per_hour,
            ])?;
        }
        let scores = topsis::score(&matrix, &weight_map(&weights), &BENEFIT, &COST_CRITERIA)?;
        let fronts = pareto::pareto_fronts(&matrix, &objectives())?;

        let throughput_floor = match (request.sla.min_throughput, request.load) {
            (Some(min), Some(load)) => Some(min.max(load.tokens_per_sec())),
            (Some(min), None) => Some(min),
            (None, Some(load)) => Some(load.tokens_per_sec()),
            (None, None) => None,
        };

        let mut survivors: Vec<(Feasible, topsis::TopsisScore, pareto::ParetoRank)> = feasible
            .into_iter()
            .zip(scores)
            .zip(fronts)
            .map(|((f, s), p)| (f, s, p))
            .filter(|(f, _, _)| meets_sla(&request.sla, throughput_floor, f))
            .collect();
        metadata.after_sla = survivors.len();

        match request.ordering {
            RankOrdering::Score => survivors.sort_by_key(|(_, s, _)| s.rank),
            RankOrdering::Pareto => survivors.sort_by_key(|(_, s, p)| (p.front, s.rank)),
        }
        survivors.truncate(limit);

        let models: Vec<Recommendation> = survivors
            .into_iter()
            .enumerate()
            .map(|(position, (f, score, front))| Recommendation {
                rank: position + 1,
                model_version_id: f.row.model_version_id,
                model_name: f.row.model_name,
                parameter_count: f.row.parameter_count,
                quantization: f.row.quantization,
                topsis_score: score.score,
                pareto_front: front.front,
                dominates: front.dominates,
                vram_gb: f.vram_gb,
                hardware: f.hardware,
                performance: PerformanceSummary {
                    benchmarked_hardware: f.row.hardware_config,
                    framework: f.row.framework,
                    avg_ttft_p90_ms: f.row.avg_ttft_p90_ms,
                    avg_throughput_tokens_sec: f.row.avg_throughput_tokens_sec,
                    avg_rps_sustained: f.row.avg_rps_sustained,
                    avg_accuracy: f.row.avg_accuracy,
                    sample_count: f.row.sample_count,
                },
            })
            .collect();

        tracing::info!(
            use_case = %request.use_case,
            total = metadata.total_candidates,
            feasible = metadata.feasible,
            after_sla = metadata.after_sla,
            returned = models.len(),
            "Assembled recommendations"
        );

        Ok(RecommendationResponse { models, metadata })
    }
}

impl std::fmt::Debug for Recommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recommender")
            .field("matcher", &self.matcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A candidate without accuracy data never satisfies `min_accuracy`.
fn meets_sla(sla: &SlaThresholds, throughput_floor: Option<f64>, f: &Feasible) -> bool {
    if let Some(max) = sla.latency_p90_ms {
        if f.row.avg_ttft_p90_ms > max {
            return false;
        }
    }
    if let Some(min) = sla.min_accuracy {
        if f.row.avg_accuracy.map_or(true, |a| a < min) {
            return false;
        }
    }
    if let Some(floor) = throughput_floor {
        if f.row.avg_throughput_tokens_sec < floor {
            return false;
        }
    }
    if let Some(max) = sla.max_cost_per_hour {
        if f.hardware.cost_per_hour > max {
            return false;
        }
    }
    true
}
