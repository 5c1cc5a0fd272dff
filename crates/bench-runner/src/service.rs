//! Operation surface consumed by external bindings
//!
//! [`BenchService`] bundles the engine's components behind the operations a
//! REST layer (or the CLI) exposes. It owns no state of its own; everything
//! is delegated to the injected repository, orchestrator, and coordinator.

use crate::coordinator::{RunCoordinator, RunProgressFn, RunRequest};
use crate::registry::StatusRegistry;
use crate::suite::SuiteLibrary;
use bench_backend::api::CatalogEntry;
use bench_backend::Orchestrator;
use bench_core::types::{
    BenchmarkResult, BenchmarkRun, HealthStatus, LoadedModelInfo, LogLevel, ModelDescriptor,
    RunStatus, RunSummary, Suite,
};
use bench_core::{Error, Repository, Result, RunConfig, RunPatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Parameters accepted by `start_run`
#[derive(Debug, Clone)]
pub struct StartRunParams {
    /// Descriptor ids, in execution order
    pub model_ids: Vec<String>,
    pub suite_name: String,
    /// Restrict to these scenarios; empty means the whole suite
    pub selected_scenarios: Vec<String>,
    pub config: RunConfig,
    /// Return immediately and drive the run on a background task
    pub detach: bool,
}

/// Output of `get_run_status`
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusReport {
    pub status: RunStatus,
    /// Present while the process that started the run is alive
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub run: Option<BenchmarkRun>,
}

/// Output of `get_run`
#[derive(Debug, Clone, Serialize)]
pub struct RunDetails {
    pub run: BenchmarkRun,
    pub results: Vec<BenchmarkResult>,
}

/// Export encodings supported by `export_run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::bad_input(format!("unknown export format: {}", other))),
        }
    }
}

/// The engine's operations, bundled for external callers
pub struct BenchService {
    repo: Arc<dyn Repository>,
    orchestrator: Arc<Orchestrator>,
    coordinator: Arc<RunCoordinator>,
    registry: Arc<StatusRegistry>,
    suites: SuiteLibrary,
}

impl BenchService {
    pub fn new(
        repo: Arc<dyn Repository>,
        orchestrator: Arc<Orchestrator>,
        coordinator: Arc<RunCoordinator>,
        registry: Arc<StatusRegistry>,
        suites: SuiteLibrary,
    ) -> Self {
        Self {
            repo,
            orchestrator,
            coordinator,
            registry,
            suites,
        }
    }

    /// Register a model descriptor
    pub async fn register_model(&self, alias: &str, model_id: &str) -> Result<ModelDescriptor> {
        let alias = alias.trim();
        let model_id = model_id.trim();
        if alias.is_empty() {
            return Err(Error::bad_input("alias is required"));
        }
        if model_id.is_empty() {
            return Err(Error::bad_input("model_id is required"));
        }

        let descriptor = ModelDescriptor::register(alias, model_id);
        self.repo.save_model(&descriptor).await?;
        info!("Registered model {} as '{}'", descriptor.id, alias);
        Ok(descriptor)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.repo.list_models().await
    }

    /// Delete a descriptor, unloading it from the backend first
    pub async fn delete_model(&self, id: &str) -> Result<()> {
        let descriptor = self
            .repo
            .get_model(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("model {}", id)))?;

        self.orchestrator.unload(id, &descriptor.model_id).await?;
        self.repo.delete_model(id).await?;
        info!("Deleted model {} ('{}')", id, descriptor.alias);
        Ok(())
    }

    /// Load a model on the backend
    pub async fn load_model(&self, id: &str) -> Result<LoadedModelInfo> {
        let descriptor = self
            .repo
            .get_model(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("model {}", id)))?;

        match self.orchestrator.load(id, &descriptor.model_id).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                if e.is_loggable() {
                    self.repo
                        .append_log("model", id, LogLevel::Error, &e.to_string(), None)
                        .await?;
                }
                Err(e)
            }
        }
    }

    /// Unload a model from the backend
    pub async fn unload_model(&self, id: &str) -> Result<()> {
        let descriptor = self
            .repo
            .get_model(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("model {}", id)))?;
        self.orchestrator.unload(id, &descriptor.model_id).await
    }

    /// Probe a model's health
    pub async fn model_health(&self, id: &str) -> Result<HealthStatus> {
        self.orchestrator.check_health(id).await
    }

    /// The backend's catalog
    pub async fn list_available(&self) -> Result<Vec<CatalogEntry>> {
        self.orchestrator.list_available().await
    }

    /// Suites known to the library
    pub async fn list_suites(&self) -> Result<Vec<Suite>> {
        self.suites.list().await
    }

    /// Validate inputs and start a run
    pub async fn start_run(
        &self,
        params: StartRunParams,
        progress_cb: Option<RunProgressFn>,
    ) -> Result<Uuid> {
        params.config.validate()?;
        if params.model_ids.is_empty() {
            return Err(Error::bad_input("at least one model id is required"));
        }

        let suite = self.suites.get(&params.suite_name).await?;
        let suite = suite.select(&params.selected_scenarios);
        if suite.scenarios.is_empty() {
            return Err(Error::bad_input(format!(
                "suite '{}' has no matching scenarios",
                params.suite_name
            )));
        }

        for id in &params.model_ids {
            if self.repo.get_model(id).await?.is_none() {
                return Err(Error::not_found(format!("model {}", id)));
            }
        }

        let request = RunRequest {
            descriptor_ids: params.model_ids,
            suite,
            config: params.config,
        };

        if params.detach {
            self.coordinator.start_detached(request, progress_cb).await
        } else {
            self.coordinator.run(request, progress_cb).await
        }
    }

    /// Latest observed status of a run.
    ///
    /// Prefers the registry (live progress); falls back to the repository for
    /// runs from earlier processes. `None` for an unknown id.
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<Option<RunStatusReport>> {
        let run = self.repo.get_run(run_id).await?;

        if let Some(state) = self.registry.get(run_id) {
            return Ok(Some(RunStatusReport {
                status: state.status,
                progress: Some(state.progress),
                error: state.error,
                run,
            }));
        }

        Ok(run.map(|run| RunStatusReport {
            status: run.status,
            progress: None,
            error: None,
            run: Some(run),
        }))
    }

    /// A run together with its results
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunDetails> {
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("run {}", run_id)))?;
        let results = self.repo.get_results(run_id).await?;
        Ok(RunDetails { run, results })
    }

    /// All runs, newest first, enriched with resolved model aliases
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let models = self.repo.list_models().await?;
        let runs = self.repo.list_runs().await?;

        Ok(runs
            .into_iter()
            .map(|run| {
                let model_names = run
                    .model_ids
                    .iter()
                    .map(|id| {
                        models
                            .iter()
                            .find(|m| &m.id == id)
                            .map(|m| m.alias.clone())
                            .unwrap_or_else(|| id.clone())
                    })
                    .collect();
                RunSummary { run, model_names }
            })
            .collect())
    }

    /// Export a run as JSON or CSV bytes
    pub async fn export_run(&self, run_id: Uuid, format: ExportFormat) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Json => {
                let export = self.repo.export_run_json(run_id).await?;
                Ok(serde_json::to_vec_pretty(&export)?)
            }
            ExportFormat::Csv => Ok(self.repo.export_run_csv(run_id).await?.into_bytes()),
        }
    }

    /// Startup repair: any `running` run with no registry entry belongs to a
    /// crashed process and is swept to `failed`. Returns the number swept.
    pub async fn sweep_stale_runs(&self) -> Result<usize> {
        let mut swept = 0;
        for run in self.repo.list_runs().await? {
            if run.status == RunStatus::Running && !self.registry.contains(run.id) {
                warn!("sweeping orphaned running run {} to failed", run.id);
                self.repo
                    .update_run(run.id, RunPatch::terminal(RunStatus::Failed))
                    .await?;
                self.repo
                    .append_log(
                        "benchmark",
                        &run.id.to_string(),
                        LogLevel::Warn,
                        "run was still running at startup, marked failed",
                        None,
                    )
                    .await?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
