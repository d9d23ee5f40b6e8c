//! GPU memory requirement estimation.
//!
//! `memory_gb = parameter_count * bytes_per_param(quantization) * 1.2 / 2^30`
//!
//! The 20% overhead covers activations, KV cache and framework buffers. All
//! functions here are pure, so callers may cache results freely.

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Weight/activation overhead on top of raw parameter storage.
pub const OVERHEAD_FACTOR: f64 = 1.2;

/// Extra memory per additional batch element, relative to batch size 1.
pub const BATCH_OVERHEAD_PER_ELEMENT: f64 = 0.1;

/// Largest batch size [`max_batch_size`] will consider.
pub const MAX_BATCH_SIZE: u32 = 64;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Quantization {
    Fp32,
    Fp16,
    Bf16,
    Int8,
    Int4,
    Awq,
    Gptq,
}

impl Quantization {
    pub const ALL: [Quantization; 7] = [
        Quantization::Fp32,
        Quantization::Fp16,
        Quantization::Bf16,
        Quantization::Int8,
        Quantization::Int4,
        Quantization::Awq,
        Quantization::Gptq,
    ];

    /// Storage bits per parameter. AWQ and GPTQ are 4-bit schemes.
    pub fn bits(&self) -> u32 {
        match self {
            Quantization::Fp32 => 32,
            Quantization::Fp16 | Quantization::Bf16 => 16,
            Quantization::Int8 => 8,
            Quantization::Int4 | Quantization::Awq | Quantization::Gptq => 4,
        }
    }

    pub fn bytes_per_param(&self) -> f64 {
        self.bits() as f64 / 8.0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quantization::Fp32 => "fp32",
            Quantization::Fp16 => "fp16",
            Quantization::Bf16 => "bf16",
            Quantization::Int8 => "int8",
            Quantization::Int4 => "int4",
            Quantization::Awq => "awq",
            Quantization::Gptq => "gptq",
        }
    }
}

impl std::fmt::Display for Quantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Quantization {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Quantization::ALL
            .into_iter()
            .find(|q| q.as_str() == lowered)
            .ok_or_else(|| CatalogError::UnsupportedQuantization(s.to_string()))
    }
}

impl TryFrom<String> for Quantization {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Memory in GB needed to serve a model at batch size 1.
pub fn estimate(parameter_count: u64, quantization: Quantization) -> f64 {
    parameter_count as f64 * quantization.bytes_per_param() / BYTES_PER_GB * OVERHEAD_FACTOR
}

/// Memory in GB at `batch_size`, adding 10% of the base estimate per element beyond the first.
pub fn estimate_with_batch(parameter_count: u64, quantization: Quantization, batch_size: u32) -> f64 {
    let base = estimate(parameter_count, quantization);
    let extra = batch_size.saturating_sub(1) as f64 * BATCH_OVERHEAD_PER_ELEMENT;
    base * (1.0 + extra)
}

/// Largest batch size (up to [`MAX_BATCH_SIZE`]) that fits in `available_gb`.
/// `None` when the model does not fit even at batch size 1.
pub fn max_batch_size(
    parameter_count: u64,
    quantization: Quantization,
    available_gb: f64,
) -> Option<u32> {
    (1..=MAX_BATCH_SIZE)
        .take_while(|&batch| estimate_with_batch(parameter_count, quantization, batch) <= available_gb)
        .last()
}

/// Estimates for the four common precisions, widest first.
pub fn quantization_comparison(parameter_count: u64) -> Vec<(Quantization, f64)> {
    [
        Quantization::Fp32,
        Quantization::Fp16,
        Quantization::Int8,
        Quantization::Int4,
    ]
    .into_iter()
    .map(|q| (q, estimate(parameter_count, q)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const SEVEN_B: u64 = 7_000_000_000;

    #[test]
    fn deserializes_any_case() {
        let q: Quantization = serde_json::from_str("\"FP16\"").unwrap();
        assert_eq!(q, Quantization::Fp16);
        let q: Quantization = serde_json::from_str("\"Gptq\"").unwrap();
        assert_eq!(q, Quantization::Gptq);
        assert_eq!(serde_json::to_string(&Quantization::Bf16).unwrap(), "\"bf16\"");
        assert!(serde_json::from_str::<Quantization>("\"fp12\"").is_err());
    }

    #[test]
    fn seven_billion_fp16() {
        // 7e9 * 2 B / 2^30 * 1.2
        assert_relative_eq!(estimate(SEVEN_B, Quantization::Fp16), 15.646, epsilon = 1e-3);
    }

    #[test]
    fn halving_bits_halves_memory() {
        let fp16 = estimate(SEVEN_B, Quantization::Fp16);
        let int8 = estimate(SEVEN_B, Quantization::Int8);
        let int4 = estimate(SEVEN_B, Quantization::Int4);
        assert_relative_eq!(fp16, int8 * 2.0, epsilon = 1e-9);
        assert_relative_eq!(int8, int4 * 2.0, epsilon = 1e-9);
        assert_relative_eq!(
            estimate(SEVEN_B, Quantization::Awq),
            int4,
            epsilon = 1e-12
        );
    }

    #[test]
    fn zero_parameters_need_no_memory() {
        assert_eq!(estimate(0, Quantization::Fp32), 0.0);
    }

    #[test]
    fn batch_overhead() {
        let base = estimate(SEVEN_B, Quantization::Fp16);
        assert_relative_eq!(estimate_with_batch(SEVEN_B, Quantization::Fp16, 1), base);
        assert_relative_eq!(
            estimate_with_batch(SEVEN_B, Quantization::Fp16, 4),
            base * 1.3,
            epsilon = 1e-9
        );
        assert_relative_eq!(estimate_with_batch(SEVEN_B, Quantization::Fp16, 0), base);
    }

    #[test]
    fn max_batch_size_fits_budget() {
        let batch = max_batch_size(SEVEN_B, Quantization::Fp16, 40.0).unwrap();
        assert!(estimate_with_batch(SEVEN_B, Quantization::Fp16, batch) <= 40.0);
        assert!(estimate_with_batch(SEVEN_B, Quantization::Fp16, batch + 1) > 40.0);
        assert_eq!(max_batch_size(SEVEN_B, Quantization::Fp16, 1.0), None);
        assert_eq!(max_batch_size(1_000, Quantization::Int4, 80.0), Some(MAX_BATCH_SIZE));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("FP16".parse::<Quantization>().unwrap(), Quantization::Fp16);
        assert_eq!(" gptq ".parse::<Quantization>().unwrap(), Quantization::Gptq);
        assert!(matches!(
            "fp8".parse::<Quantization>(),
            Err(CatalogError::UnsupportedQuantization(_))
        ));
    }

    #[test]
    fn comparison_is_widest_first() {
        let table = quantization_comparison(SEVEN_B);
        assert_eq!(table.len(), 4);
        assert!(table.windows(2).all(|w| w[0].1 > w[1].1));
    }

    fn any_quantization() -> impl Strategy<Value = Quantization> {
        prop::sample::select(Quantization::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn monotonic_in_parameters(a in 0u64..1_000_000_000_000, b in 0u64..1_000_000_000_000, q in any_quantization()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(estimate(lo, q) <= estimate(hi, q));
        }

        #[test]
        fn non_increasing_as_bits_shrink(params in 0u64..1_000_000_000_000, a in any_quantization(), b in any_quantization()) {
            let (wide, narrow) = if a.bits() >= b.bits() { (a, b) } else { (b, a) };
            prop_assert!(estimate(params, narrow) <= estimate(params, wide));
        }

        #[test]
        fn deterministic(params in 0u64..1_000_000_000_000, q in any_quantization()) {
            prop_assert_eq!(estimate(params, q).to_bits(), estimate(params, q).to_bits());
        }
    }
}
