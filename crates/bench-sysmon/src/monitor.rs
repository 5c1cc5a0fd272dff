//! CPU/RAM sampling and hardware discovery

use crate::gpu;
use bench_core::types::{CpuInfo, HardwareInfo, OsInfo, ResourceSample};
use std::sync::Mutex;
use sysinfo::System;
use tracing::warn;

/// Point-in-time sampler over a persistent [`sysinfo::System`].
///
/// CPU load is derived from the delta between consecutive refreshes, so the
/// very first sample of a fresh monitor may report 0. The engine samples
/// before and after every iteration, which keeps the window short.
pub struct ResourceMonitor {
    system: Mutex<System>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }

    /// Snapshot current CPU, RAM, and GPU utilization percentages.
    ///
    /// Values the platform does not expose come back as `None`; the call
    /// itself never fails.
    pub fn sample(&self) -> ResourceSample {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("resource monitor lock poisoned, continuing with inner state");
                poisoned.into_inner()
            }
        };

        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = {
            let usage = system.global_cpu_info().cpu_usage() as f64;
            if usage.is_finite() {
                Some(usage.clamp(0.0, 100.0))
            } else {
                warn!("CPU usage unavailable on this platform");
                None
            }
        };

        let ram = {
            let total = system.total_memory();
            if total > 0 {
                Some(system.used_memory() as f64 / total as f64 * 100.0)
            } else {
                warn!("total memory reported as zero, skipping RAM sample");
                None
            }
        };

        ResourceSample {
            cpu,
            ram,
            gpu: gpu::sample_utilization(),
        }
    }

    /// Structured descriptor of the host. Best-effort; missing fields are
    /// `None`.
    pub fn hardware_info(&self) -> HardwareInfo {
        let system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let cpu = CpuInfo {
            vendor: system.cpus().first().map(|c| c.vendor_id().to_string()),
            model: system.cpus().first().map(|c| c.brand().trim().to_string()),
            physical_cores: system.physical_core_count(),
            logical_cores: Some(num_cpus::get()),
        };

        let ram_total_bytes = match system.total_memory() {
            0 => None,
            total => Some(total),
        };

        let os = OsInfo {
            platform: System::name(),
            release: System::os_version(),
            arch: System::cpu_arch(),
        };

        HardwareInfo {
            cpu,
            ram_total_bytes,
            gpu: gpu::describe(),
            os,
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
