//! GPU telemetry backend
//!
//! Only NVML is supported. The `nvml` feature gates the dependency; without
//! it, or when no driver is present at runtime, every query returns `None`.

use bench_core::types::GpuInfo;

#[cfg(feature = "nvml")]
mod backend {
    use super::GpuInfo;
    use nvml_wrapper::Nvml;
    use std::sync::OnceLock;
    use tracing::warn;

    static NVML: OnceLock<Option<Nvml>> = OnceLock::new();

    fn nvml() -> Option<&'static Nvml> {
        NVML.get_or_init(|| match Nvml::init() {
            Ok(nvml) => Some(nvml),
            Err(e) => {
                warn!("NVML unavailable, GPU telemetry disabled: {}", e);
                None
            }
        })
        .as_ref()
    }

    /// Utilization of the first GPU controller, as a percentage
    pub fn sample_utilization() -> Option<f64> {
        let device = nvml()?.device_by_index(0).ok()?;
        let rates = device.utilization_rates().ok()?;
        Some(rates.gpu as f64)
    }

    /// Static descriptor of the first GPU controller
    pub fn describe() -> Option<GpuInfo> {
        let device = nvml()?.device_by_index(0).ok()?;
        let model = device.name().ok()?;
        let vram_bytes = device.memory_info().ok().map(|m| m.total);
        Some(GpuInfo { model, vram_bytes })
    }
}

#[cfg(not(feature = "nvml"))]
mod backend {
    use super::GpuInfo;

    pub fn sample_utilization() -> Option<f64> {
        None
    }

    pub fn describe() -> Option<GpuInfo> {
        None
    }
}

pub use backend::{describe, sample_utilization};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_queries_do_not_panic() {
        // With the feature off this is trivially None; with it on, the result
        // depends on the host driver. Either way the call must not panic.
        let _ = sample_utilization();
        let _ = describe();
    }
}
