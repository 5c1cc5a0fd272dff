//! Run coordination: the durable state machine of a benchmark run
//!
//! The coordinator is the only component that transitions a run out of
//! `running`. Per-model and per-scenario failures are absorbed (logged and
//! skipped); only coordinator-level failures, which are almost always durable
//! write failures, fail the run.

use crate::registry::StatusRegistry;
use crate::scenario::{IterationProgress, ScenarioRunner};
use bench_backend::Orchestrator;
use bench_core::types::{BenchmarkRun, LogLevel, ModelDescriptor, RunStatus, Suite};
use bench_core::{Repository, Result, RunConfig, RunPatch};
use bench_sysmon::ResourceMonitor;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Entity type used for run-scoped audit log entries
const RUN_ENTITY: &str = "benchmark";

/// Everything needed to execute one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Descriptor ids in execution order
    pub descriptor_ids: Vec<String>,
    pub suite: Suite,
    pub config: RunConfig,
}

/// Per-scenario progress report published after each (model, scenario) pair
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub run_id: Uuid,
    pub descriptor_id: String,
    pub scenario: String,
    pub completed_tasks: u32,
    pub total_tasks: u32,
    /// Rounded percentage in 0..=100
    pub progress: u8,
}

pub type RunProgressFn = Arc<dyn Fn(RunProgress) + Send + Sync>;

/// Drives runs across the (model x scenario) matrix
pub struct RunCoordinator {
    repo: Arc<dyn Repository>,
    orchestrator: Arc<Orchestrator>,
    runner: ScenarioRunner,
    registry: Arc<StatusRegistry>,
    monitor: Arc<ResourceMonitor>,
    /// Serializes run execution: one run drives the backend at a time
    run_gate: Mutex<()>,
}

impl RunCoordinator {
    pub fn new(
        repo: Arc<dyn Repository>,
        orchestrator: Arc<Orchestrator>,
        registry: Arc<StatusRegistry>,
        monitor: Arc<ResourceMonitor>,
    ) -> Self {
        let runner = ScenarioRunner::new(orchestrator.clone(), monitor.clone());
        Self {
            repo,
            orchestrator,
            runner,
            registry,
            monitor,
            run_gate: Mutex::new(()),
        }
    }

    /// Execute a run to completion and return its id
    pub async fn run(&self, request: RunRequest, progress_cb: Option<RunProgressFn>) -> Result<Uuid> {
        let run = self.prepare(&request).await?;
        let run_id = run.id;
        self.execute(run, request, progress_cb).await?;
        Ok(run_id)
    }

    /// Schedule a run on a background task and return its id immediately.
    ///
    /// The run record exists (status `running`) before this returns; execution
    /// queues behind any run already in flight.
    pub async fn start_detached(
        self: &Arc<Self>,
        request: RunRequest,
        progress_cb: Option<RunProgressFn>,
    ) -> Result<Uuid> {
        let run = self.prepare(&request).await?;
        let run_id = run.id;

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = coordinator.execute(run, request, progress_cb).await {
                error!("background run {} failed: {}", run_id, e);
            }
        });

        Ok(run_id)
    }

    /// Create the durable run record and publish it to the registry
    async fn prepare(&self, request: &RunRequest) -> Result<BenchmarkRun> {
        let run = BenchmarkRun::new(
            &request.suite.name,
            request.descriptor_ids.clone(),
            request.config.clone(),
            self.monitor.hardware_info(),
        );

        self.registry.publish(run.id, RunStatus::Running, 0, None);

        if let Err(e) = self.repo.save_run(&run).await {
            self.registry
                .publish(run.id, RunStatus::Failed, 0, Some(e.to_string()));
            return Err(e);
        }

        info!(
            "Run {} started: suite '{}', {} models, {} scenarios",
            run.id,
            request.suite.name,
            request.descriptor_ids.len(),
            request.suite.scenarios.len()
        );
        Ok(run)
    }

    /// Drive the run to a terminal state
    async fn execute(
        &self,
        run: BenchmarkRun,
        request: RunRequest,
        progress_cb: Option<RunProgressFn>,
    ) -> Result<()> {
        let _gate = self.run_gate.lock().await;
        let run_id = run.id;

        match self.drive(&run, &request, progress_cb.as_ref()).await {
            Ok(()) => {
                if let Err(e) = self
                    .repo
                    .update_run(run_id, RunPatch::terminal(RunStatus::Completed))
                    .await
                {
                    return Err(self.fail_run(run_id, e).await);
                }
                self.registry.publish(run_id, RunStatus::Completed, 100, None);
                info!("Run {} completed", run_id);
                Ok(())
            }
            Err(e) => Err(self.fail_run(run_id, e).await),
        }
    }

    /// Transition a run to `failed`, recording the coordinator-level error
    async fn fail_run(&self, run_id: Uuid, cause: bench_core::Error) -> bench_core::Error {
        error!("run {} failed: {}", run_id, cause);
        if let Err(e) = self
            .repo
            .update_run(run_id, RunPatch::terminal(RunStatus::Failed))
            .await
        {
            warn!("could not persist failed status for run {}: {}", run_id, e);
        }
        let progress = self.registry.get(run_id).map(|s| s.progress).unwrap_or(0);
        self.registry
            .publish(run_id, RunStatus::Failed, progress, Some(cause.to_string()));
        cause
    }

    async fn drive(
        &self,
        run: &BenchmarkRun,
        request: &RunRequest,
        progress_cb: Option<&RunProgressFn>,
    ) -> Result<()> {
        let scenarios = &request.suite.scenarios;
        let total_tasks = (run.model_ids.len() * scenarios.len()) as u32;
        let mut completed_tasks: u32 = 0;

        for descriptor_id in &run.model_ids {
            let ready = self.ensure_ready(run.id, descriptor_id).await?;

            for scenario in scenarios {
                if ready {
                    self.run_pair(run, descriptor_id, scenario).await?;
                } else {
                    debug!(
                        "skipping scenario '{}' for unready model {}",
                        scenario.name, descriptor_id
                    );
                }

                completed_tasks += 1;
                let progress = if total_tasks > 0 {
                    ((completed_tasks as f64 / total_tasks as f64) * 100.0).round() as u8
                } else {
                    100
                };
                self.registry.set_progress(run.id, progress);
                if let Some(cb) = progress_cb {
                    cb(RunProgress {
                        run_id: run.id,
                        descriptor_id: descriptor_id.clone(),
                        scenario: scenario.name.clone(),
                        completed_tasks,
                        total_tasks,
                        progress,
                    });
                }
            }
        }

        Ok(())
    }

    /// Run one (model, scenario) pair and persist its result.
    ///
    /// A scenario failure is logged and absorbed; only the durable writes can
    /// fail the run.
    async fn run_pair(
        &self,
        run: &BenchmarkRun,
        descriptor_id: &str,
        scenario: &bench_core::types::Scenario,
    ) -> Result<()> {
        let iteration_cb = |p: IterationProgress| {
            debug!(
                "run progress: {} '{}' iteration {}/{}",
                p.descriptor_id, p.scenario, p.iteration, p.total
            );
        };

        match self
            .runner
            .run_scenario(descriptor_id, scenario, &run.config, &iteration_cb)
            .await
        {
            Ok(outcome) => {
                let result =
                    outcome.into_result(run.id, descriptor_id.to_string(), scenario.name.clone());
                let result_id = result.id;
                self.repo.save_result(&result).await?;
                self.log_run(
                    run.id,
                    LogLevel::Info,
                    &format!("scenario '{}' completed for model {}", scenario.name, descriptor_id),
                    Some(json!({ "result_id": result_id })),
                )
                .await?;
            }
            Err(e) => {
                warn!(
                    "scenario '{}' failed for model {}: {}",
                    scenario.name, descriptor_id, e
                );
                self.log_run(
                    run.id,
                    LogLevel::Error,
                    &format!(
                        "scenario '{}' failed for model {}: {}",
                        scenario.name, descriptor_id, e
                    ),
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Bring a model to a healthy, loaded state.
    ///
    /// Returns `Ok(false)` when the model must be skipped (missing descriptor,
    /// load failure, or persistent unhealth after the single reload retry);
    /// repository failures propagate as coordinator failures.
    async fn ensure_ready(&self, run_id: Uuid, descriptor_id: &str) -> Result<bool> {
        let Some(descriptor) = self.repo.get_model(descriptor_id).await? else {
            self.log_run(
                run_id,
                LogLevel::Error,
                &format!("model {} is not registered, skipping", descriptor_id),
                None,
            )
            .await?;
            return Ok(false);
        };

        let target = load_target(&descriptor);

        if self.orchestrator.get_loaded(descriptor_id).await.is_none() {
            if let Err(e) = self.orchestrator.load(descriptor_id, &target).await {
                self.log_run(
                    run_id,
                    LogLevel::Error,
                    &format!("model {} failed to load: {}", descriptor_id, e),
                    None,
                )
                .await?;
                return Ok(false);
            }
        }

        let health = self.orchestrator.check_health(&descriptor.id).await?;
        if health.healthy {
            return Ok(true);
        }

        // One reload, then one re-probe. The only built-in retry.
        warn!(
            "model {} unhealthy ({}), attempting reload",
            descriptor_id,
            health.error.as_deref().unwrap_or("unknown")
        );
        self.orchestrator.unload(descriptor_id, &target).await?;
        if let Err(e) = self.orchestrator.load(descriptor_id, &target).await {
            self.log_run(
                run_id,
                LogLevel::Error,
                &format!("model {} failed to reload: {}", descriptor_id, e),
                None,
            )
            .await?;
            return Ok(false);
        }

        let health = self.orchestrator.check_health(&descriptor.id).await?;
        if health.healthy {
            return Ok(true);
        }

        self.log_run(
            run_id,
            LogLevel::Error,
            &format!(
                "model {} still unhealthy after reload: {}",
                descriptor_id,
                health.error.as_deref().unwrap_or("unknown")
            ),
            None,
        )
        .await?;
        Ok(false)
    }

    async fn log_run(
        &self,
        run_id: Uuid,
        level: LogLevel,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.repo
            .append_log(RUN_ENTITY, &run_id.to_string(), level, message, metadata)
            .await
    }
}

/// The identifier submitted to load requests: the backend model id, falling
/// back to the alias when no model id was registered
fn load_target(descriptor: &ModelDescriptor) -> String {
    if descriptor.model_id.trim().is_empty() {
        descriptor.alias.clone()
    } else {
        descriptor.model_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_target_falls_back_to_alias() {
        let mut descriptor = ModelDescriptor::new("m1", "llama", "llama-3.2-1b-cpu:1");
        assert_eq!(load_target(&descriptor), "llama-3.2-1b-cpu:1");

        descriptor.model_id = String::new();
        assert_eq!(load_target(&descriptor), "llama");

        descriptor.model_id = "  ".to_string();
        assert_eq!(load_target(&descriptor), "llama");
    }
}
