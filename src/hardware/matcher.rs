use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Fraction knocked off the hourly price for spot capacity.
pub const SPOT_DISCOUNT: f64 = 0.75;

/// Largest GPU count per configuration in the default catalog.
pub const DEFAULT_MAX_GPUS: u32 = 8;

/// One GPU model that can be provisioned in multiples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSpec {
    pub gpu_type: String,
    pub memory_gb: f64,
    /// On-demand price of a single unit.
    pub cost_per_hour_usd: f64,
    pub spot_available: bool,
    pub max_count: u32,
}

impl GpuSpec {
    pub fn new(gpu_type: &str, memory_gb: f64, cost_per_hour_usd: f64, spot_available: bool) -> Self {
        Self {
            gpu_type: gpu_type.to_string(),
            memory_gb,
            cost_per_hour_usd,
            spot_available,
            max_count: DEFAULT_MAX_GPUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareCatalog {
    pub gpus: Vec<GpuSpec>,
}

impl HardwareCatalog {
    pub fn new(gpus: Vec<GpuSpec>) -> Self {
        Self { gpus }
    }
}

impl Default for HardwareCatalog {
    fn default() -> Self {
        Self::new(vec![
            GpuSpec::new("L4", 24.0, 0.50, true),
            GpuSpec::new("A100-40GB", 40.0, 1.20, true),
            GpuSpec::new("A100-80GB", 80.0, 2.40, true),
            GpuSpec::new("H100", 80.0, 4.00, true),
            GpuSpec::new("V100", 16.0, 0.80, false),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConstraints {
    /// Upper bound on the effective hourly cost.
    pub max_cost_per_hour: Option<f64>,
    /// Price spot-capable GPUs at the spot rate.
    pub allow_spot: bool,
    pub preferred_gpu_type: Option<String>,
}

impl Default for HardwareConstraints {
    fn default() -> Self {
        Self {
            max_cost_per_hour: None,
            allow_spot: true,
            preferred_gpu_type: None,
        }
    }
}

/// A concrete provisioning choice for a memory requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareCandidate {
    pub gpu_type: String,
    pub gpu_count: u32,
    pub memory_per_gpu_gb: f64,
    pub total_memory_gb: f64,
    pub on_demand_cost_per_hour: f64,
    /// On-demand cost, or the spot price when spot capacity is used.
    pub cost_per_hour: f64,
    pub spot: bool,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HardwareMatcher {
    catalog: HardwareCatalog,
}

impl HardwareMatcher {
    pub fn new(catalog: HardwareCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &HardwareCatalog {
        &self.catalog
    }

    /// All configurations with enough aggregate memory, cheapest first.
    pub fn find(&self, memory_gb: f64, constraints: &HardwareConstraints) -> Vec<HardwareCandidate> {
        if !memory_gb.is_finite() || memory_gb < 0.0 {
            return Vec::new();
        }

        let mut candidates: Vec<HardwareCandidate> = self
            .catalog
            .gpus
            .iter()
            .filter(|gpu| {
                constraints
                    .preferred_gpu_type
                    .as_deref()
                    .map_or(true, |t| gpu.gpu_type.eq_ignore_ascii_case(t))
            })
            .filter_map(|gpu| Self::size(gpu, memory_gb, constraints.allow_spot))
            .filter(|c| {
                constraints
                    .max_cost_per_hour
                    .map_or(true, |max| c.cost_per_hour <= max)
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.cost_per_hour
                .total_cmp(&b.cost_per_hour)
                .then_with(|| b.total_memory_gb.total_cmp(&a.total_memory_gb))
                .then_with(|| a.gpu_type.cmp(&b.gpu_type))
        });
        candidates
    }

    /// Cheapest feasible configuration.
    pub fn best(&self, memory_gb: f64, constraints: &HardwareConstraints) -> Result<HardwareCandidate> {
        self.find(memory_gb, constraints)
            .into_iter()
            .next()
            .ok_or(CatalogError::InfeasibleHardware { memory_gb })
    }

    fn size(gpu: &GpuSpec, memory_gb: f64, allow_spot: bool) -> Option<HardwareCandidate> {
        if gpu.memory_gb <= 0.0 || gpu.max_count == 0 {
            return None;
        }

        let needed = (memory_gb / gpu.memory_gb).ceil().max(1.0);
        if needed > gpu.max_count as f64 {
            return None;
        }
        let mut count = needed as u32;
        // ceil() on a rounded quotient can land one unit short
        while (count as f64) * gpu.memory_gb < memory_gb {
            count += 1;
        }
        if count > gpu.max_count {
            return None;
        }

        let total_memory_gb = count as f64 * gpu.memory_gb;
        let on_demand = count as f64 * gpu.cost_per_hour_usd;
        let spot = allow_spot && gpu.spot_available;
        let cost_per_hour = if spot {
            on_demand * (1.0 - SPOT_DISCOUNT)
        } else {
            on_demand
        };

        Some(HardwareCandidate {
            gpu_type: gpu.gpu_type.clone(),
            gpu_count: count,
            memory_per_gpu_gb: gpu.memory_gb,
            total_memory_gb,
            on_demand_cost_per_hour: on_demand,
            cost_per_hour,
            spot,
            utilization_pct: memory_gb / total_memory_gb * 100.0,
        })
    }
}
