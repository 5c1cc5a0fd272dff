//! File-backed JSON repository

use async_trait::async_trait;
use bench_core::types::{
    BenchmarkResult, BenchmarkRun, LogEntry, LogLevel, ModelDescriptor, ModelStatus,
};
use bench_core::{Error, Repository, Result, RunPatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// The audit log ring keeps this many most-recent entries
pub const MAX_LOG_ENTRIES: usize = 1_000;

/// Entire durable state as one serializable document
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
    #[serde(default)]
    runs: Vec<BenchmarkRun>,
    #[serde(default)]
    results: Vec<BenchmarkResult>,
    #[serde(default)]
    logs: VecDeque<LogEntry>,
}

/// File-backed repository.
///
/// Mutations serialize a snapshot under the state write lock, then replace the
/// backing file outside of it; a dedicated I/O mutex keeps file replacements
/// ordered. Reads are served from the in-memory mirror.
pub struct JsonStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    io: Mutex<()>,
}

impl JsonStore {
    /// Open a store at `path`, creating an empty one if the file is absent
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::storage(format!("corrupt store at {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating new store at {}", path.display());
                StoreState::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
            io: Mutex::new(()),
        })
    }

    /// Replace the backing file with `snapshot` via a temp file and rename
    async fn persist(&self, snapshot: Vec<u8>) -> Result<()> {
        let _guard = self.io.lock().await;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &snapshot).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Persisted {} bytes to {}", snapshot.len(), self.path.display());
        Ok(())
    }

    /// Mutate the state under the write lock, serialize, then persist
    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StoreState) -> Result<()>,
    {
        let snapshot = {
            let mut state = self.state.write().await;
            f(&mut state)?;
            serde_json::to_vec_pretty(&*state)?
        };
        self.persist(snapshot).await
    }
}

#[async_trait]
impl Repository for JsonStore {
    async fn save_model(&self, model: &ModelDescriptor) -> Result<()> {
        let model = model.clone();
        self.mutate(move |state| {
            match state.models.iter_mut().find(|m| m.id == model.id) {
                Some(existing) => *existing = model,
                None => state.models.push(model),
            }
            Ok(())
        })
        .await
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelDescriptor>> {
        let state = self.state.read().await;
        Ok(state.models.iter().find(|m| m.id == id).cloned())
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let state = self.state.read().await;
        Ok(state.models.clone())
    }

    async fn delete_model(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.mutate(move |state| {
            let before = state.models.len();
            state.models.retain(|m| m.id != id);
            if state.models.len() == before {
                return Err(Error::not_found(format!("model {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn update_model_status(
        &self,
        id: &str,
        status: ModelStatus,
        endpoint: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        let id = id.to_string();
        self.mutate(move |state| {
            let model = state
                .models
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::not_found(format!("model {}", id)))?;
            model.status = status;
            if endpoint.is_some() {
                model.endpoint = endpoint;
            }
            model.last_error = error;
            model.last_heartbeat = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn save_run(&self, run: &BenchmarkRun) -> Result<()> {
        let run = run.clone();
        self.mutate(move |state| {
            match state.runs.iter_mut().find(|r| r.id == run.id) {
                Some(existing) => *existing = run,
                None => state.runs.push(run),
            }
            Ok(())
        })
        .await
    }

    async fn update_run(&self, id: Uuid, patch: RunPatch) -> Result<()> {
        self.mutate(move |state| {
            let run = state
                .runs
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::not_found(format!("run {}", id)))?;
            if let Some(status) = patch.status {
                run.status = status;
            }
            if let Some(completed_at) = patch.completed_at {
                run.completed_at = Some(completed_at);
            }
            Ok(())
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<BenchmarkRun>> {
        let state = self.state.read().await;
        Ok(state.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<BenchmarkRun>> {
        let state = self.state.read().await;
        let mut runs = state.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn save_result(&self, result: &BenchmarkResult) -> Result<()> {
        let result = result.clone();
        self.mutate(move |state| {
            let run = state
                .runs
                .iter()
                .find(|r| r.id == result.run_id)
                .ok_or_else(|| Error::not_found(format!("run {}", result.run_id)))?;
            if run.status.is_terminal() {
                return Err(Error::storage(format!(
                    "run {} is {} and accepts no further results",
                    run.id, run.status
                )));
            }
            state.results.push(result);
            Ok(())
        })
        .await
    }

    async fn get_results(&self, run_id: Uuid) -> Result<Vec<BenchmarkResult>> {
        let state = self.state.read().await;
        Ok(state
            .results
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn get_all_results(&self) -> Result<Vec<BenchmarkResult>> {
        let state = self.state.read().await;
        Ok(state.results.iter().rev().cloned().collect())
    }

    async fn append_log(
        &self,
        entity_type: &str,
        entity_id: &str,
        level: LogLevel,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut entry = LogEntry::new(entity_type, entity_id, level, message);
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }
        self.mutate(move |state| {
            state.logs.push_back(entry);
            while state.logs.len() > MAX_LOG_ENTRIES {
                state.logs.pop_front();
            }
            Ok(())
        })
        .await
    }

    async fn get_logs(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .rev()
            .filter(|l| l.entity_type == entity_type && l.entity_id == entity_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::types::{HardwareInfo, RawScenarioData, RunStatus};
    use bench_core::RunConfig;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> JsonStore {
        JsonStore::open(dir.path().join("store.json")).await.unwrap()
    }

    fn sample_run() -> BenchmarkRun {
        BenchmarkRun::new(
            "quick",
            vec!["m1".to_string()],
            RunConfig::default(),
            HardwareInfo::unknown(),
        )
    }

    fn sample_result(run_id: Uuid, scenario: &str) -> BenchmarkResult {
        BenchmarkResult {
            id: Uuid::new_v4(),
            run_id,
            model_id: "m1".to_string(),
            scenario: scenario.to_string(),
            tps: 10.0,
            ttft: None,
            tpot: None,
            gen_tps: None,
            latency_p50: 100.0,
            latency_p95: 100.0,
            latency_p99: 100.0,
            error_rate: 0.0,
            timeout_rate: 0.0,
            cpu_avg: 0.0,
            ram_avg: 0.0,
            gpu_avg: None,
            total_tokens: 10,
            total_iterations: 1,
            successful_iterations: 1,
            raw_data: RawScenarioData::default(),
        }
    }

    #[tokio::test]
    async fn test_model_crud_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let model = ModelDescriptor::register("llama", "llama-3.2-1b-cpu:1");
        store.save_model(&model).await.unwrap();

        // Reopen from disk
        drop(store);
        let store = open_store(&dir).await;
        let loaded = store.get_model(&model.id).await.unwrap().unwrap();
        assert_eq!(loaded, model);

        store.delete_model(&model.id).await.unwrap();
        assert!(store.get_model(&model.id).await.unwrap().is_none());
        assert!(store.delete_model(&model.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_model_status_stamps_heartbeat() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let model = ModelDescriptor::register("llama", "llama-3.2-1b");
        store.save_model(&model).await.unwrap();
        assert!(model.last_heartbeat.is_none());

        store
            .update_model_status(
                &model.id,
                ModelStatus::Running,
                Some("http://localhost:1234".to_string()),
                None,
            )
            .await
            .unwrap();

        let updated = store.get_model(&model.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ModelStatus::Running);
        assert_eq!(updated.endpoint.as_deref(), Some("http://localhost:1234"));
        assert!(updated.last_heartbeat.is_some());

        // A failed observation records the error but keeps the endpoint
        store
            .update_model_status(
                &model.id,
                ModelStatus::Error,
                None,
                Some("probe failed".to_string()),
            )
            .await
            .unwrap();
        let updated = store.get_model(&model.id).await.unwrap().unwrap();
        assert_eq!(updated.last_error.as_deref(), Some("probe failed"));
        assert_eq!(updated.endpoint.as_deref(), Some("http://localhost:1234"));
    }

    #[tokio::test]
    async fn test_runs_ordered_by_started_at_desc() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut first = sample_run();
        first.started_at = Utc::now() - chrono::Duration::seconds(60);
        let second = sample_run();
        store.save_run(&first).await.unwrap();
        store.save_run(&second).await.unwrap();

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }

    #[tokio::test]
    async fn test_terminal_run_rejects_results() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let run = sample_run();
        store.save_run(&run).await.unwrap();
        store.save_result(&sample_result(run.id, "s1")).await.unwrap();

        store
            .update_run(run.id, RunPatch::terminal(RunStatus::Completed))
            .await
            .unwrap();

        let err = store.save_result(&sample_result(run.id, "s2")).await.unwrap_err();
        assert_eq!(err.category(), "storage");
        assert_eq!(store.get_results(run.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_results_insertion_desc() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let run = sample_run();
        store.save_run(&run).await.unwrap();
        store.save_result(&sample_result(run.id, "s1")).await.unwrap();
        store.save_result(&sample_result(run.id, "s2")).await.unwrap();

        let all = store.get_all_results().await.unwrap();
        assert_eq!(all[0].scenario, "s2");
        assert_eq!(all[1].scenario, "s1");
    }

    #[tokio::test]
    async fn test_log_ring_is_bounded() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        for i in 0..MAX_LOG_ENTRIES + 5 {
            store
                .append_log("benchmark", "run-1", LogLevel::Info, &format!("entry {}", i), None)
                .await
                .unwrap();
        }

        let logs = store.get_logs("benchmark", "run-1", usize::MAX).await.unwrap();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        // Most recent first; the oldest five entries were evicted
        assert_eq!(logs[0].message, format!("entry {}", MAX_LOG_ENTRIES + 4));
        assert_eq!(logs.last().unwrap().message, "entry 5");
    }

    #[tokio::test]
    async fn test_logs_filtered_and_limited() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .append_log("model", "m1", LogLevel::Error, "load failed", None)
            .await
            .unwrap();
        store
            .append_log("benchmark", "r1", LogLevel::Info, "scenario done", None)
            .await
            .unwrap();
        store
            .append_log("model", "m1", LogLevel::Warn, "slow probe", None)
            .await
            .unwrap();

        let logs = store.get_logs("model", "m1", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "slow probe");

        let logs = store.get_logs("model", "m1", 1).await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_export_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let run = sample_run();
        store.save_run(&run).await.unwrap();
        store.save_result(&sample_result(run.id, "s1")).await.unwrap();
        store
            .update_run(run.id, RunPatch::terminal(RunStatus::Completed))
            .await
            .unwrap();

        let export = store.export_run_json(run.id).await.unwrap();
        let json = serde_json::to_string(&export).unwrap();
        let parsed: bench_core::RunExport = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.run, export.run);
        assert_eq!(parsed.results, export.results);
        assert_eq!(parsed.run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_export_unknown_run_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert!(store.export_run_json(Uuid::new_v4()).await.unwrap_err().is_not_found());
        assert!(store.export_run_csv(Uuid::new_v4()).await.unwrap_err().is_not_found());
    }
}
