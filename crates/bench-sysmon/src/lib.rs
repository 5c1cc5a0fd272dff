//! # bench-sysmon
//!
//! Best-effort host introspection for tokenbench:
//!
//! - [`ResourceMonitor::sample`] returns a point-in-time CPU/RAM/GPU
//!   utilization snapshot
//! - [`ResourceMonitor::hardware_info`] returns a static hardware descriptor
//!
//! Neither operation fails the caller. Anything the platform does not expose
//! degrades to `None` with a warning in the process log, so benchmark
//! iterations keep running on hosts without GPUs or with restricted procfs.
//!
//! GPU telemetry requires the `nvml` feature and an NVIDIA driver at runtime;
//! in every other configuration GPU fields are `None`.

pub mod gpu;
pub mod monitor;

pub use monitor::ResourceMonitor;
