//! # Device Detection and Selection
//!
//! Picks the compute device (CPU/GPU) used for speech-model inference, with
//! a CPU fallback when the requested accelerator is unavailable.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Cached best available device so detection runs once per process
static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// Force CUDA GPU usage (falls back to CPU if not available)
    Cuda,
    /// Force Metal GPU usage (falls back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve a device from a preference, probing accelerators as needed.
pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Auto => best_device(),
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or(Device::Cpu),
        DevicePreference::Metal => metal_device().unwrap_or(Device::Cpu),
    }
}

/// Parse a preference string, falling back to auto-detection on nonsense.
pub fn select_device_from_str(device_str: &str) -> Device {
    match device_str.parse::<DevicePreference>() {
        Ok(preference) => select_device(preference),
        Err(_) => {
            warn!("Invalid device preference '{}', using auto", device_str);
            best_device()
        }
    }
}

/// Best available device, detected once and cached.
fn best_device() -> Device {
    BEST_DEVICE.get_or_init(detect_best_device).clone()
}

fn detect_best_device() -> Device {
    // CUDA first (NVIDIA), then Metal (Apple Silicon), then CPU.
    if let Some(device) = cuda_device() {
        info!("Selected CUDA GPU for inference");
        return device;
    }
    if let Some(device) = metal_device() {
        info!("Selected Metal GPU for inference");
        return device;
    }
    info!("Using CPU for inference (no GPU acceleration available)");
    Device::Cpu
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("CUDA not available: {}", e);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("Metal not available: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("CUDA".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("invalid".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_preference_always_resolves() {
        let device = select_device(DevicePreference::Cpu);
        assert!(matches!(device, Device::Cpu));
    }
}
