//! Run configuration: device placement and seeding.
//!
//! Device selection is resolved exactly once at startup and the resolved
//! [`candle_core::Device`] is passed down; library code never probes CUDA
//! availability on its own.

use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{map_candle, CatsResult};

/// Compute device requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeDevice {
    /// CPU execution.
    Cpu,
    /// CUDA device by ordinal.
    Cuda(usize),
}

impl Default for ComputeDevice {
    fn default() -> Self {
        Self::Cpu
    }
}

impl ComputeDevice {
    /// Parse a `--device` style string: `cpu`, `cuda`, or `cuda:N`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu" => Some(Self::Cpu),
            "cuda" => Some(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(Self::Cuda),
        }
    }

    /// Resolve to a concrete candle device.
    ///
    /// A CUDA request on a machine without CUDA falls back to CPU with a
    /// warning rather than aborting, so the same invocation works on
    /// GPU-less development hosts.
    pub fn resolve(&self) -> CatsResult<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(ordinal) => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(*ordinal).map_err(map_candle)
                } else {
                    warn!("CUDA requested but not available, falling back to CPU");
                    Ok(Device::Cpu)
                }
            }
        }
    }
}

/// Top-level run configuration shared by the binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Requested compute device.
    pub device: ComputeDevice,
    /// Random seed threaded through init, splits, and shuffling.
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            device: ComputeDevice::Cpu,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_strings() {
        assert_eq!(ComputeDevice::parse("cpu"), Some(ComputeDevice::Cpu));
        assert_eq!(ComputeDevice::parse("cuda"), Some(ComputeDevice::Cuda(0)));
        assert_eq!(ComputeDevice::parse("cuda:2"), Some(ComputeDevice::Cuda(2)));
        assert_eq!(ComputeDevice::parse("tpu"), None);
    }

    #[test]
    fn test_cpu_resolves() {
        let device = ComputeDevice::Cpu.resolve().unwrap();
        assert!(matches!(device, Device::Cpu));
    }

    #[test]
    fn test_default_seed() {
        let config = RunConfig::default();
        assert_eq!(config.seed, 42);
    }
}
