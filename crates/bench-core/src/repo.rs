//! Durable persistence contract
//!
//! The storage backend is abstract: any implementation that satisfies
//! [`Repository`] can back the engine. Operations are durable on successful
//! return. A single writer across the process is sufficient; reads may be
//! concurrent with writes.

use crate::types::{
    BenchmarkResult, BenchmarkRun, LogEntry, LogLevel, ModelDescriptor, ModelStatus, RunStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partial update applied to a run record
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunPatch {
    /// Patch that moves a run into a terminal state, stamping `completed_at`
    pub fn terminal(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            completed_at: Some(Utc::now()),
        }
    }
}

/// A run together with its results, as produced by `export_run_json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunExport {
    pub run: BenchmarkRun,
    pub results: Vec<BenchmarkResult>,
    pub exported_at: DateTime<Utc>,
}

/// Durable persistence of models, runs, results, and audit log entries
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_model(&self, model: &ModelDescriptor) -> Result<()>;
    async fn get_model(&self, id: &str) -> Result<Option<ModelDescriptor>>;
    /// Ordered by registration
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;
    async fn delete_model(&self, id: &str) -> Result<()>;
    /// Updates the descriptor's status and stamps `last_heartbeat`
    async fn update_model_status(
        &self,
        id: &str,
        status: ModelStatus,
        endpoint: Option<String>,
        error: Option<String>,
    ) -> Result<()>;

    async fn save_run(&self, run: &BenchmarkRun) -> Result<()>;
    async fn update_run(&self, id: Uuid, patch: RunPatch) -> Result<()>;
    async fn get_run(&self, id: Uuid) -> Result<Option<BenchmarkRun>>;
    /// Ordered by `started_at` descending
    async fn list_runs(&self) -> Result<Vec<BenchmarkRun>>;

    /// Rejects results bound to a run in terminal status
    async fn save_result(&self, result: &BenchmarkResult) -> Result<()>;
    async fn get_results(&self, run_id: Uuid) -> Result<Vec<BenchmarkResult>>;
    /// Ordered by insertion descending
    async fn get_all_results(&self) -> Result<Vec<BenchmarkResult>>;

    async fn append_log(
        &self,
        entity_type: &str,
        entity_id: &str,
        level: LogLevel,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;
    /// Most recent first
    async fn get_logs(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<LogEntry>>;

    /// Export a run and its results as a single JSON document
    async fn export_run_json(&self, id: Uuid) -> Result<RunExport> {
        let run = self
            .get_run(id)
            .await?
            .ok_or_else(|| crate::Error::not_found(format!("run {}", id)))?;
        let results = self.get_results(id).await?;
        Ok(RunExport {
            run,
            results,
            exported_at: Utc::now(),
        })
    }

    /// Export a run's results as CSV text.
    ///
    /// One row per result with the aggregates flattened in a stable column
    /// order; `raw_data` is omitted. Fields containing commas, quotes, or
    /// newlines are surrounded with double quotes, with embedded quotes
    /// doubled.
    async fn export_run_csv(&self, id: Uuid) -> Result<String> {
        let export = self.export_run_json(id).await?;
        Ok(results_to_csv(&export.results))
    }
}

/// Stable CSV column order for flattened results
pub const CSV_HEADER: &[&str] = &[
    "id",
    "run_id",
    "model_id",
    "scenario",
    "tps",
    "ttft",
    "tpot",
    "gen_tps",
    "latency_p50",
    "latency_p95",
    "latency_p99",
    "error_rate",
    "timeout_rate",
    "cpu_avg",
    "ram_avg",
    "gpu_avg",
    "total_tokens",
    "total_iterations",
    "successful_iterations",
];

/// Flatten results into CSV text, `raw_data` omitted
pub fn results_to_csv(results: &[BenchmarkResult]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADER.join(","));
    out.push('\n');

    for result in results {
        let fields = [
            result.id.to_string(),
            result.run_id.to_string(),
            result.model_id.clone(),
            result.scenario.clone(),
            format_float(result.tps),
            format_opt_float(result.ttft),
            format_opt_float(result.tpot),
            format_opt_float(result.gen_tps),
            format_float(result.latency_p50),
            format_float(result.latency_p95),
            format_float(result.latency_p99),
            format_float(result.error_rate),
            format_float(result.timeout_rate),
            format_float(result.cpu_avg),
            format_float(result.ram_avg),
            format_opt_float(result.gpu_avg),
            result.total_tokens.to_string(),
            result.total_iterations.to_string(),
            result.successful_iterations.to_string(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

fn format_float(value: f64) -> String {
    format!("{:.3}", value)
}

fn format_opt_float(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Surround fields containing commas, quotes, or newlines with double quotes,
/// doubling embedded quotes
pub fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawScenarioData;

    fn sample_result() -> BenchmarkResult {
        BenchmarkResult {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            model_id: "m1".to_string(),
            scenario: "greeting, short".to_string(),
            tps: 38.4615,
            ttft: Some(50.0),
            tpot: Some(20.0),
            gen_tps: Some(50.0),
            latency_p50: 130.0,
            latency_p95: 130.0,
            latency_p99: 130.0,
            error_rate: 0.0,
            timeout_rate: 0.0,
            cpu_avg: 41.2,
            ram_avg: 63.0,
            gpu_avg: None,
            total_tokens: 15,
            total_iterations: 3,
            successful_iterations: 3,
            raw_data: RawScenarioData::default(),
        }
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_header_and_row() {
        let csv = results_to_csv(&[sample_result()]);
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), CSV_HEADER.len());
        assert!(header.starts_with("id,run_id,model_id,scenario,tps,ttft,tpot"));
        assert!(!csv.contains("raw_data"));

        // The comma in the scenario name is quoted, so the column count holds
        let row = lines.next().unwrap();
        assert!(row.contains("\"greeting, short\""));
    }

    #[test]
    fn test_csv_null_fields_empty() {
        let mut result = sample_result();
        result.ttft = None;
        result.tpot = None;
        result.gen_tps = None;
        let csv = results_to_csv(&[result]);
        let row = csv.lines().nth(1).unwrap();
        // ttft, tpot, gen_tps columns are consecutive and empty
        assert!(row.contains(",,,"));
    }

    #[test]
    fn test_terminal_patch() {
        let patch = RunPatch::terminal(RunStatus::Completed);
        assert_eq!(patch.status, Some(RunStatus::Completed));
        assert!(patch.completed_at.is_some());
    }
}
