//! Recommendation engine.
//!
//! [`results`] stores benchmark measurements and aggregates them per use case;
//! [`assembler`] turns those aggregates into ranked, hardware-matched
//! recommendations. Nothing here mutates queue state.

pub mod assembler;
pub mod results;

pub use assembler::{
    LoadProfile, RankOrdering, Recommendation, RecommendationMetadata, RecommendationRequest,
    RecommendationResponse, Recommender, SlaThresholds,
};
pub use results::{
    BenchmarkResult, MemoryResultStore, ModelVersion, NewBenchmarkResult, NewModelVersion,
    PerformanceRow, ResultStore,
};
