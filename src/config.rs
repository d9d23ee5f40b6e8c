use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hardware::HardwareCatalog;

/// Relative importance of the four ranking criteria. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriteriaWeights {
    pub accuracy: f64,
    pub latency: f64,
    pub throughput: f64,
    pub cost: f64,
}

impl CriteriaWeights {
    pub const fn new(accuracy: f64, latency: f64, throughput: f64, cost: f64) -> Self {
        Self {
            accuracy,
            latency,
            throughput,
            cost,
        }
    }

    pub fn sum(&self) -> f64 {
        self.accuracy + self.latency + self.throughput + self.cost
    }
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        Self::new(0.30, 0.25, 0.25, 0.20)
    }
}

/// Built-in weights for the known use cases.
pub fn default_use_case_weights() -> HashMap<String, CriteriaWeights> {
    [
        ("chatbot", CriteriaWeights::new(0.25, 0.40, 0.15, 0.20)),
        ("summarization", CriteriaWeights::new(0.25, 0.10, 0.40, 0.25)),
        ("qa", CriteriaWeights::new(0.50, 0.20, 0.10, 0.20)),
        ("code-generation", CriteriaWeights::new(0.40, 0.25, 0.15, 0.20)),
        ("creative-writing", CriteriaWeights::new(0.45, 0.15, 0.15, 0.25)),
    ]
    .into_iter()
    .map(|(name, weights)| (name.to_string(), weights))
    .collect()
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Age after which a `running` config is considered abandoned.
    pub stale_timeout_minutes: u32,
    pub reaper_interval_secs: u64,
    /// Stale recycles before a config is failed. `None` recycles forever.
    pub max_retries: Option<u32>,
    /// Upper bound accepted for `get-batch` limits.
    pub max_batch_limit: usize,
    pub default_priority_threshold: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_timeout_minutes: 120,
            reaper_interval_secs: 30 * 60,
            max_retries: None,
            max_batch_limit: 500,
            default_priority_threshold: 1000,
        }
    }
}

impl QueueConfig {
    pub fn with_stale_timeout_minutes(mut self, minutes: u32) -> Self {
        self.stale_timeout_minutes = minutes;
        self
    }

    pub fn with_reaper_interval_secs(mut self, secs: u64) -> Self {
        self.reaper_interval_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn stale_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.stale_timeout_minutes))
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct RecommendConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub use_case_weights: HashMap<String, CriteriaWeights>,
    /// Used for use cases without an entry in `use_case_weights`.
    pub fallback_weights: CriteriaWeights,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            use_case_weights: default_use_case_weights(),
            fallback_weights: CriteriaWeights::default(),
        }
    }
}

impl RecommendConfig {
    pub fn weights_for(&self, use_case: &str) -> CriteriaWeights {
        self.use_case_weights
            .get(use_case)
            .copied()
            .unwrap_or(self.fallback_weights)
    }

    pub fn with_use_case_weights(mut self, use_case: &str, weights: CriteriaWeights) -> Self {
        self.use_case_weights.insert(use_case.to_string(), weights);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub queue: QueueConfig,
    pub recommend: RecommendConfig,
    pub catalog: HardwareCatalog,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            queue: QueueConfig::default(),
            recommend: RecommendConfig::default(),
            catalog: HardwareCatalog::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_recommend(mut self, recommend: RecommendConfig) -> Self {
        self.recommend = recommend;
        self
    }

    pub fn with_catalog(mut self, catalog: HardwareCatalog) -> Self {
        self.catalog = catalog;
        self
    }
}
