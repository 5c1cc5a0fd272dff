//! Orchestrator behavior against the mock backend

use bench_backend::Orchestrator;
use bench_core::types::{ModelDescriptor, ModelStatus};
use bench_core::Repository;
use bench_dev::{MockBackendServer, MockModelBehavior};
use bench_store::JsonStore;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    server: MockBackendServer,
    repo: Arc<JsonStore>,
    orchestrator: Arc<Orchestrator>,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let server = MockBackendServer::start().await;
    let repo = Arc::new(JsonStore::open(dir.path().join("store.json")).await.unwrap());
    let repo_dyn: Arc<dyn Repository> = repo.clone();
    let orchestrator = Arc::new(Orchestrator::new(server.url(), repo_dyn).unwrap());
    orchestrator.initialize().await.unwrap();

    Harness {
        _dir: dir,
        server,
        repo,
        orchestrator,
    }
}

impl Harness {
    async fn add_model(&self, alias: &str, model_id: &str, behavior: MockModelBehavior) -> String {
        let descriptor = ModelDescriptor::register(alias, model_id);
        self.repo.save_model(&descriptor).await.unwrap();
        self.server.register(alias, model_id, behavior).await;
        descriptor.id
    }
}

#[tokio::test]
async fn load_returns_canonical_id_and_marks_running() {
    let h = harness().await;
    let id = h.add_model("llama", "llama-3.2-1b-cpu:1", MockModelBehavior::default()).await;

    let loaded = h.orchestrator.load(&id, "llama-3.2-1b-cpu:1").await.unwrap();

    // The canonical id is neither the alias nor the submitted model id
    assert_ne!(loaded.id, "llama");
    assert_ne!(loaded.id, "llama-3.2-1b-cpu:1");
    assert_eq!(loaded.requested, "llama-3.2-1b-cpu:1");
    assert_eq!(loaded.descriptor_id, id);

    let descriptor = h.repo.get_model(&id).await.unwrap().unwrap();
    assert_eq!(descriptor.status, ModelStatus::Running);
    assert!(descriptor.endpoint.is_some());
    assert!(descriptor.last_heartbeat.is_some());
}

#[tokio::test]
async fn load_is_idempotent() {
    let h = harness().await;
    let id = h.add_model("llama", "llama-id", MockModelBehavior::default()).await;

    let first = h.orchestrator.load(&id, "llama-id").await.unwrap();
    let second = h.orchestrator.load(&id, "llama-id").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.orchestrator.list_loaded().await.len(), 1);
    assert_eq!(h.server.loaded_pairs().await.len(), 1);
}

#[tokio::test]
async fn failed_load_marks_descriptor_error() {
    let h = harness().await;
    let behavior = MockModelBehavior {
        fail_load: true,
        ..MockModelBehavior::default()
    };
    let id = h.add_model("broken", "broken-id", behavior).await;

    let err = h.orchestrator.load(&id, "broken-id").await.unwrap_err();
    assert_eq!(err.category(), "load_failed");

    let descriptor = h.repo.get_model(&id).await.unwrap().unwrap();
    assert_eq!(descriptor.status, ModelStatus::Error);
    assert!(descriptor.last_error.is_some());
    assert!(h.orchestrator.get_loaded(&id).await.is_none());
}

#[tokio::test]
async fn unload_clears_cache_and_is_idempotent() {
    let h = harness().await;
    let id = h.add_model("llama", "llama-id", MockModelBehavior::default()).await;

    h.orchestrator.load(&id, "llama-id").await.unwrap();
    assert!(h.orchestrator.get_loaded(&id).await.is_some());

    h.orchestrator.unload(&id, "llama-id").await.unwrap();
    assert!(h.orchestrator.get_loaded(&id).await.is_none());
    assert!(h.server.loaded_pairs().await.is_empty());

    let descriptor = h.repo.get_model(&id).await.unwrap().unwrap();
    assert_eq!(descriptor.status, ModelStatus::Stopped);

    // Unloading again (backend answers 404) still succeeds
    h.orchestrator.unload(&id, "llama-id").await.unwrap();
}

#[tokio::test]
async fn check_health_accepts_alias_and_stamps_heartbeat() {
    let h = harness().await;
    let id = h.add_model("healthy", "healthy-id", MockModelBehavior::default()).await;
    h.orchestrator.load(&id, "healthy-id").await.unwrap();

    let health = h.orchestrator.check_health("healthy").await.unwrap();
    assert!(health.healthy);
    assert!(health.endpoint.is_some());

    let descriptor = h.repo.get_model(&id).await.unwrap().unwrap();
    assert_eq!(descriptor.status, ModelStatus::Running);
    assert!(descriptor.last_heartbeat.is_some());
}

#[tokio::test]
async fn check_health_reports_probe_failures() {
    let h = harness().await;
    let id = h.add_model("sick", "sick-id", MockModelBehavior::default().failing_health()).await;

    let health = h.orchestrator.check_health(&id).await.unwrap();
    assert!(!health.healthy);
    assert!(health.error.is_some());

    let descriptor = h.repo.get_model(&id).await.unwrap().unwrap();
    assert_eq!(descriptor.status, ModelStatus::Error);
}

#[tokio::test]
async fn catalog_lists_configured_models() {
    let h = harness().await;
    h.add_model("a", "a-id", MockModelBehavior::default()).await;
    h.add_model("b", "b-id", MockModelBehavior::default()).await;

    let catalog = h.orchestrator.list_available().await.unwrap();
    let ids: Vec<&str> = catalog.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"a-id"));
    assert!(ids.contains(&"b-id"));
}

#[tokio::test]
async fn catalog_falls_back_to_loaded_models_when_backend_dies() {
    let h = harness().await;
    let id = h.add_model("survivor", "survivor-id", MockModelBehavior::default()).await;
    h.orchestrator.load(&id, "survivor-id").await.unwrap();

    // Kill the backend; enumeration now fails but the cache still answers
    drop(h.server);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let catalog = h.orchestrator.list_available().await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].id, "survivor-id");
}

#[tokio::test]
async fn shutdown_unloads_everything() {
    let h = harness().await;
    let a = h.add_model("a", "a-id", MockModelBehavior::default()).await;
    let b = h.add_model("b", "b-id", MockModelBehavior::default()).await;
    h.orchestrator.load(&a, "a-id").await.unwrap();
    h.orchestrator.load(&b, "b-id").await.unwrap();

    h.orchestrator.shutdown().await.unwrap();

    assert!(h.orchestrator.list_loaded().await.is_empty());
    assert!(h.server.loaded_pairs().await.is_empty());
    // The connection is gone until the next initialize
    assert!(h.orchestrator.get_client().await.is_err());
}
