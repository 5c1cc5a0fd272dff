//! Execution of one (model, scenario) pair
//!
//! Individual iteration failures are absorbed into the aggregates; a scenario
//! only fails when the model has no loaded-model record to run against.

use crate::stats;
use bench_backend::{InferenceRequest, Orchestrator};
use bench_core::types::{BenchmarkResult, IterationRecord, RawScenarioData, Scenario};
use bench_core::{Error, Result, RunConfig};
use bench_sysmon::ResourceMonitor;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-iteration progress report
#[derive(Debug, Clone)]
pub struct IterationProgress {
    pub descriptor_id: String,
    pub scenario: String,
    /// 1-based iteration counter
    pub iteration: u32,
    pub total: u32,
}

/// Aggregate statistics plus the raw per-iteration data for one scenario
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub tps: f64,
    pub ttft: Option<f64>,
    pub tpot: Option<f64>,
    pub gen_tps: Option<f64>,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub error_rate: f64,
    pub timeout_rate: f64,
    pub cpu_avg: f64,
    pub ram_avg: f64,
    pub gpu_avg: Option<f64>,
    pub total_tokens: u64,
    pub total_iterations: u32,
    pub successful_iterations: u32,
    pub raw: RawScenarioData,
}

impl ScenarioOutcome {
    /// Bind the outcome to a run and model, producing the persistable result
    pub fn into_result(self, run_id: Uuid, model_id: String, scenario: String) -> BenchmarkResult {
        BenchmarkResult {
            id: Uuid::new_v4(),
            run_id,
            model_id,
            scenario,
            tps: self.tps,
            ttft: self.ttft,
            tpot: self.tpot,
            gen_tps: self.gen_tps,
            latency_p50: self.latency_p50,
            latency_p95: self.latency_p95,
            latency_p99: self.latency_p99,
            error_rate: self.error_rate,
            timeout_rate: self.timeout_rate,
            cpu_avg: self.cpu_avg,
            ram_avg: self.ram_avg,
            gpu_avg: self.gpu_avg,
            total_tokens: self.total_tokens,
            total_iterations: self.total_iterations,
            successful_iterations: self.successful_iterations,
            raw_data: self.raw,
        }
    }
}

/// Executes scenarios against loaded models
pub struct ScenarioRunner {
    orchestrator: Arc<Orchestrator>,
    monitor: Arc<ResourceMonitor>,
}

impl ScenarioRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, monitor: Arc<ResourceMonitor>) -> Self {
        Self {
            orchestrator,
            monitor,
        }
    }

    /// Run `config.iterations` measured iterations of `scenario` against the
    /// model loaded for `descriptor_id`.
    ///
    /// Fails with `ModelNotReady` when no loaded-model record exists; every
    /// other failure is absorbed into the per-iteration records.
    pub async fn run_scenario(
        &self,
        descriptor_id: &str,
        scenario: &Scenario,
        config: &RunConfig,
        progress_cb: &(dyn Fn(IterationProgress) + Send + Sync),
    ) -> Result<ScenarioOutcome> {
        let loaded = self
            .orchestrator
            .get_loaded(descriptor_id)
            .await
            .ok_or_else(|| {
                Error::model_not_ready(format!("no loaded model for descriptor {}", descriptor_id))
            })?;
        let client = self.orchestrator.get_client().await?;

        info!(
            "Running scenario '{}' against {} ({} iterations, streaming={})",
            scenario.name, loaded.id, config.iterations, config.streaming
        );

        // The model identifier on the wire is always the backend-canonical id
        let request = InferenceRequest {
            model: loaded.id.clone(),
            prompt: scenario.prompt.clone(),
            max_tokens: scenario.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout(),
            streaming: config.streaming,
        };

        let mut records = Vec::with_capacity(config.iterations as usize);
        for iteration in 1..=config.iterations {
            let before = self.monitor.sample();
            let mut record = client.infer(&request).await;
            record.resources_before = before;
            record.resources_after = self.monitor.sample();

            debug!(
                "iteration {}/{} of '{}': latency={:.1}ms tokens={} success={}",
                iteration,
                config.iterations,
                scenario.name,
                record.latency_ms,
                record.tokens,
                record.is_success()
            );
            records.push(record);

            progress_cb(IterationProgress {
                descriptor_id: descriptor_id.to_string(),
                scenario: scenario.name.clone(),
                iteration,
                total: config.iterations,
            });

            if iteration < config.iterations {
                tokio::time::sleep(config.pause()).await;
            }
        }

        Ok(aggregate(config.iterations, records))
    }
}

/// Fold per-iteration records into the aggregate statistics.
///
/// Latency percentiles, TTFT, and token timing only consider successful
/// iterations. `cpu_avg`/`ram_avg` sum the non-null post-iteration samples but
/// divide by the full iteration count, so a host that stops reporting biases
/// downward instead of jumping; `gpu_avg` averages over non-null samples only.
pub fn aggregate(total_iterations: u32, records: Vec<IterationRecord>) -> ScenarioOutcome {
    let successful: Vec<&IterationRecord> = records.iter().filter(|r| r.is_success()).collect();

    let latencies = stats::sorted(successful.iter().map(|r| r.latency_ms));
    let ttfts = stats::sorted(successful.iter().filter_map(|r| r.ttft_ms));
    let delays: Vec<f64> = successful
        .iter()
        .flat_map(|r| r.inter_token_delays_ms.iter().copied())
        .collect();

    let total_tokens: u64 = successful.iter().map(|r| r.tokens).sum();
    let total_latency_s: f64 = successful.iter().map(|r| r.latency_ms).sum::<f64>() / 1000.0;
    let tps = if total_latency_s > 0.0 {
        total_tokens as f64 / total_latency_s
    } else {
        0.0
    };

    let tpot = stats::mean(&delays);
    let gen_tps = tpot.and_then(|t| if t > 0.0 { Some(1000.0 / t) } else { None });

    let timeouts = records.iter().filter(|r| r.timeout).count() as u32;
    let errors = records
        .iter()
        .filter(|r| r.error.is_some() && !r.timeout)
        .count() as u32;

    let denominator = total_iterations.max(1) as f64;
    let cpu_avg = records
        .iter()
        .filter_map(|r| r.resources_after.cpu)
        .sum::<f64>()
        / denominator;
    let ram_avg = records
        .iter()
        .filter_map(|r| r.resources_after.ram)
        .sum::<f64>()
        / denominator;
    let gpu_samples: Vec<f64> = records.iter().filter_map(|r| r.resources_after.gpu).collect();
    let gpu_avg = stats::mean(&gpu_samples);

    ScenarioOutcome {
        tps,
        ttft: stats::median_floor(&ttfts),
        tpot,
        gen_tps,
        latency_p50: stats::percentile(&latencies, 50.0),
        latency_p95: stats::percentile(&latencies, 95.0),
        latency_p99: stats::percentile(&latencies, 99.0),
        error_rate: errors as f64 / denominator * 100.0,
        timeout_rate: timeouts as f64 / denominator * 100.0,
        cpu_avg,
        ram_avg,
        gpu_avg,
        total_tokens,
        total_iterations,
        successful_iterations: total_iterations - errors - timeouts,
        raw: RawScenarioData { iterations: records },
    }
}
