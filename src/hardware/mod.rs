//! Memory sizing and hardware selection.
//!
//! [`vram::estimate`] turns a parameter count and quantization into a memory
//! requirement; [`HardwareMatcher`] turns that requirement into concrete GPU
//! configurations priced under the caller's cost and spot constraints.

pub mod matcher;
pub mod vram;

pub use matcher::{GpuSpec, HardwareCandidate, HardwareCatalog, HardwareConstraints, HardwareMatcher};
pub use vram::Quantization;
