//! # bench-core
//!
//! Core types, traits, and utilities for tokenbench - a benchmark engine for
//! locally hosted LLM inference endpoints.
//!
//! This crate provides the foundational data structures and interfaces that are
//! shared across all other tokenbench components. It includes:
//!
//! - Core data structures for models, scenarios, runs, and results
//! - The `Repository` contract for durable persistence
//! - Run configuration schema and validation
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod repo;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::RunConfig;
pub use error::{Error, Result};
pub use repo::{Repository, RunExport, RunPatch};
pub use types::{
    BenchmarkResult, BenchmarkRun, HardwareInfo, HealthStatus, IterationRecord, LoadedModelInfo,
    LogEntry, LogLevel, ModelDescriptor, ModelStatus, RawScenarioData, ResourceSample, RunStatus,
    RunSummary, Scenario, Suite,
};
