//! Core entity definitions for tokenbench

use crate::RunConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Last-known state of a configured model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Model is not resident on the backend
    Stopped,
    /// Model is loaded and ready for inference
    Running,
    /// The last load or health observation failed
    Error,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Stopped => write!(f, "stopped"),
            ModelStatus::Running => write!(f, "running"),
            ModelStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(ModelStatus::Stopped),
            "running" => Ok(ModelStatus::Running),
            "error" => Ok(ModelStatus::Error),
            _ => Err(format!("Unknown model status: {}", s)),
        }
    }
}

/// A configured model known to the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Opaque identifier assigned at registration
    pub id: String,

    /// Short human name
    pub alias: String,

    /// The identifier the inference backend expects (may carry a
    /// device-variant suffix, e.g. `…-cpu:1`)
    pub model_id: String,

    /// Last-known state
    pub status: ModelStatus,

    /// URL of the backend exposing this model, when known ready
    pub endpoint: Option<String>,

    /// Last observed failure, if any
    pub last_error: Option<String>,

    /// Timestamp of the last successful health observation
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ModelDescriptor {
    /// Create a freshly registered descriptor
    pub fn new(id: impl Into<String>, alias: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
            model_id: model_id.into(),
            status: ModelStatus::Stopped,
            endpoint: None,
            last_error: None,
            last_heartbeat: None,
        }
    }

    /// Register a descriptor with a generated id
    pub fn register(alias: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), alias, model_id)
    }
}

/// A single named prompt workload with a token budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique within its suite
    pub name: String,

    /// Sent as the user message
    pub prompt: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Informational tag
    #[serde(default)]
    pub expected_output_length: Option<String>,
}

fn default_max_tokens() -> u32 {
    100
}

impl Scenario {
    /// Create a scenario with the default token budget
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            max_tokens: default_max_tokens(),
            expected_output_length: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// An ordered collection of scenarios addressed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Return a copy restricted to the named scenarios, preserving suite order.
    ///
    /// An empty selection means "all scenarios".
    pub fn select(&self, selected: &[String]) -> Suite {
        if selected.is_empty() {
            return self.clone();
        }
        Suite {
            name: self.name.clone(),
            description: self.description.clone(),
            scenarios: self
                .scenarios
                .iter()
                .filter(|s| selected.iter().any(|sel| sel == &s.name))
                .cloned()
                .collect(),
        }
    }
}

/// Lifecycle status of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Terminal states accept no further results
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One execution of a suite over one or more models under a given config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub id: Uuid,
    pub suite_name: String,
    /// Descriptor ids, in execution order
    pub model_ids: Vec<String>,
    pub config: RunConfig,
    pub hardware_info: HardwareInfo,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BenchmarkRun {
    /// Create a new run record in `running` state
    pub fn new(
        suite_name: impl Into<String>,
        model_ids: Vec<String>,
        config: RunConfig,
        hardware_info: HardwareInfo,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            suite_name: suite_name.into(),
            model_ids,
            config,
            hardware_info,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Point-in-time resource utilization snapshot.
///
/// Every field is a percentage in [0, 100]; `None` means the platform did not
/// expose the value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu: Option<f64>,
    pub ram: Option<f64>,
    pub gpu: Option<f64>,
}

impl ResourceSample {
    /// A sample with no observed values
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Raw measurements for one inference iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// End-to-end latency in milliseconds (stamped on success and failure)
    pub latency_ms: f64,

    /// Time to first token in milliseconds; `None` when not streaming
    pub ttft_ms: Option<f64>,

    /// Count of generated content tokens
    pub tokens: u64,

    /// Deltas between consecutive content tokens in milliseconds; empty when
    /// not streaming or fewer than two tokens were observed
    #[serde(default)]
    pub inter_token_delays_ms: Vec<f64>,

    /// Failure cause, if the iteration failed
    pub error: Option<String>,

    /// Whether the iteration was cancelled by its deadline
    pub timeout: bool,

    #[serde(default)]
    pub resources_before: ResourceSample,

    #[serde(default)]
    pub resources_after: ResourceSample,
}

impl IterationRecord {
    /// An iteration counts as successful when it neither errored nor timed out
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.timeout
    }
}

/// The full per-iteration structure retained alongside aggregates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawScenarioData {
    pub iterations: Vec<IterationRecord>,
}

/// Aggregated measurements for one (run, model, scenario) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: Uuid,
    pub run_id: Uuid,
    pub model_id: String,
    pub scenario: String,

    /// Successful tokens divided by aggregate wall-clock of successful
    /// iterations, in tokens per second
    pub tps: f64,

    /// Median time-to-first-token in milliseconds; `None` without streaming
    pub ttft: Option<f64>,

    /// Mean inter-token delay in milliseconds; `None` without streaming
    pub tpot: Option<f64>,

    /// `1000 / tpot`: throughput once generation is underway
    pub gen_tps: Option<f64>,

    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,

    /// Failed iterations as a percentage of all iterations
    pub error_rate: f64,

    /// Timed-out iterations as a percentage of all iterations
    pub timeout_rate: f64,

    pub cpu_avg: f64,
    pub ram_avg: f64,
    pub gpu_avg: Option<f64>,

    pub total_tokens: u64,
    pub total_iterations: u32,
    pub successful_iterations: u32,

    pub raw_data: RawScenarioData,
}

/// Severity of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Append-only audit log entry bound to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            level,
            message: message.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Structured descriptor of the host hardware, captured once per run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub cpu: CpuInfo,
    pub ram_total_bytes: Option<u64>,
    pub gpu: Option<GpuInfo>,
    pub os: OsInfo,
}

impl HardwareInfo {
    /// A descriptor with every field unknown (used when sampling fails)
    pub fn unknown() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuInfo {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub physical_cores: Option<usize>,
    pub logical_cores: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub model: String,
    pub vram_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: Option<String>,
    pub release: Option<String>,
    pub arch: Option<String>,
}

/// Backend-canonical descriptor of a model resident in memory.
///
/// `id` is the identifier the backend requires on inference calls; it may
/// differ from both the descriptor's alias and the submitted model id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModelInfo {
    /// Canonical backend-side identifier, required on inference calls
    pub id: String,

    /// The descriptor this loaded instance belongs to
    pub descriptor_id: String,

    /// The identifier that was submitted to the load request
    pub requested: String,

    /// Endpoint serving this model
    pub endpoint: String,
}

/// Outcome of a health probe against a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl HealthStatus {
    pub fn healthy(endpoint: impl Into<String>) -> Self {
        Self {
            healthy: true,
            status: "ok".to_string(),
            error: None,
            endpoint: Some(endpoint.into()),
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: "unhealthy".to_string(),
            error: Some(reason.into()),
            endpoint: None,
        }
    }
}

/// A run enriched with resolved model display names, for listing surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: BenchmarkRun,
    /// Aliases resolved from the run's descriptor ids, in run order; falls
    /// back to the raw id when the descriptor no longer exists
    pub model_names: Vec<String>,
}
