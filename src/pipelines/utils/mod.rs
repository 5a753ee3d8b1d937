use candle_core::{Device, DeviceLocation};

use crate::config::DevicePreference;
use crate::error::{PipelineError, Result};

/// Device the classifier should be loaded onto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceRequest {
    #[default]
    Cpu,
    Cuda(usize),
}

impl DeviceRequest {
    pub fn from_preference(preference: DevicePreference, cuda_ordinal: usize) -> Self {
        match preference {
            DevicePreference::Gpu => DeviceRequest::Cuda(cuda_ordinal),
            DevicePreference::Cpu => DeviceRequest::Cpu,
        }
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceRequest::Cpu)
    }

    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(i) => Device::new_cuda(i).map_err(|e| {
                PipelineError::Device(format!(
                    "Failed to init CUDA device {i}: {e}. Try CPU as fallback."
                ))
            }),
        }
    }
}

impl std::fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

/// Short human name for a live device (`cpu`, `cuda:0`, ...).
pub fn device_label(device: &Device) -> String {
    match device.location() {
        DeviceLocation::Cpu => "cpu".to_string(),
        DeviceLocation::Cuda { gpu_id } => format!("cuda:{gpu_id}"),
        DeviceLocation::Metal { gpu_id } => format!("metal:{gpu_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_maps_to_request() {
        assert_eq!(
            DeviceRequest::from_preference(DevicePreference::Gpu, 1),
            DeviceRequest::Cuda(1)
        );
        assert!(DeviceRequest::from_preference(DevicePreference::Cpu, 1).is_cpu());
    }

    #[test]
    fn cpu_always_resolves() {
        let device = DeviceRequest::Cpu.resolve().unwrap();
        assert_eq!(device_label(&device), "cpu");
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn cuda_without_support_is_a_device_error() {
        assert!(matches!(
            DeviceRequest::Cuda(0).resolve(),
            Err(PipelineError::Device(_))
        ));
    }
}
