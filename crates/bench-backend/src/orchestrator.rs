//! Model lifecycle orchestration on the shared inference backend
//!
//! The orchestrator is the process-wide owner of the backend connection and
//! of the loaded-model cache. Only the run coordinator mutates the cache (via
//! [`Orchestrator::load`] / [`Orchestrator::unload`]); the scenario runner
//! reads it through [`Orchestrator::get_loaded`].

use crate::api::{self, CatalogEntry, CatalogResponse, LoadRequest, LoadedEntry};
use crate::client::InferenceClient;
use bench_core::types::{HealthStatus, LoadedModelInfo, ModelDescriptor, ModelStatus};
use bench_core::{Error, Repository, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Timeout for management calls (load can pull weights into memory, so it is
/// generous; probes use a fraction of it)
const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owner of the backend connection and the loaded-model cache
pub struct Orchestrator {
    base_url: String,
    repo: Arc<dyn Repository>,
    http: reqwest::Client,
    /// Set once `initialize` has verified the backend answers
    endpoint: RwLock<Option<String>>,
    /// descriptor id -> backend-canonical loaded model record
    loaded: RwLock<HashMap<String, LoadedModelInfo>>,
}

impl Orchestrator {
    /// Create an orchestrator for the backend at `base_url`.
    ///
    /// No connection is attempted until [`Orchestrator::initialize`].
    pub fn new(base_url: impl Into<String>, repo: Arc<dyn Repository>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(MANAGEMENT_TIMEOUT)
            .build()
            .map_err(|e| Error::backend_unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            repo,
            http,
            endpoint: RwLock::new(None),
            loaded: RwLock::new(HashMap::new()),
        })
    }

    /// Probe the backend and mark the connection established.
    ///
    /// Returns the endpoint all subsequent calls are bound to.
    pub async fn initialize(&self) -> Result<String> {
        let url = format!("{}{}", self.base_url, api::paths::HEALTH);
        let response = self
            .http
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(format!("cannot reach backend: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::backend_unavailable(format!(
                "backend health probe returned {}",
                response.status()
            )));
        }

        let mut endpoint = self.endpoint.write().await;
        *endpoint = Some(self.base_url.clone());
        info!("Connected to inference backend at {}", self.base_url);
        Ok(self.base_url.clone())
    }

    /// The established endpoint, or `BackendUnavailable` before `initialize`
    async fn endpoint(&self) -> Result<String> {
        self.endpoint
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::backend_unavailable("orchestrator is not initialized"))
    }

    /// Enumerate the backend's catalog.
    ///
    /// When the backend answers but enumeration fails, the fallback is the
    /// catalog synthesized from the loaded-model cache, so callers always see
    /// at least the models known to be resident.
    pub async fn list_available(&self) -> Result<Vec<CatalogEntry>> {
        let endpoint = self.endpoint().await?;
        let url = format!("{}{}", endpoint, api::paths::MODELS);

        let result = async {
            let response = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await?;
            response.error_for_status()?.json::<CatalogResponse>().await
        }
        .await;

        match result {
            Ok(catalog) => Ok(catalog.data),
            Err(e) => {
                warn!("catalog enumeration failed, falling back to loaded models: {}", e);
                let loaded = self.loaded.read().await;
                Ok(loaded
                    .values()
                    .map(|m| CatalogEntry {
                        id: m.requested.clone(),
                        object: None,
                    })
                    .collect())
            }
        }
    }

    /// Models currently tracked as loaded
    pub async fn list_loaded(&self) -> Vec<LoadedModelInfo> {
        self.loaded.read().await.values().cloned().collect()
    }

    /// The loaded record for a descriptor, if any
    pub async fn get_loaded(&self, descriptor_id: &str) -> Option<LoadedModelInfo> {
        self.loaded.read().await.get(descriptor_id).cloned()
    }

    /// Ask the backend to load `model` for the given descriptor.
    ///
    /// Idempotent: a descriptor that is already cached is returned as-is. On
    /// success the descriptor is marked `running`; on backend failure it is
    /// marked `error` and `LoadFailed` is returned.
    pub async fn load(&self, descriptor_id: &str, model: &str) -> Result<LoadedModelInfo> {
        if let Some(existing) = self.get_loaded(descriptor_id).await {
            debug!("model {} already loaded as {}", descriptor_id, existing.id);
            return Ok(existing);
        }

        let endpoint = self.endpoint().await?;
        let url = format!("{}{}", endpoint, api::paths::MODELS_LOAD);
        info!("Loading model {} ({}) on backend", descriptor_id, model);

        let result = async {
            let response = self
                .http
                .post(&url)
                .json(&LoadRequest {
                    model: model.to_string(),
                })
                .send()
                .await?;
            response.error_for_status()?.json::<LoadedEntry>().await
        }
        .await;

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let message = format!("backend rejected load of {}: {}", model, e);
                self.repo
                    .update_model_status(descriptor_id, ModelStatus::Error, None, Some(message.clone()))
                    .await
                    .ok();
                return Err(Error::load_failed(message));
            }
        };

        let info = LoadedModelInfo {
            id: entry.id,
            descriptor_id: descriptor_id.to_string(),
            requested: model.to_string(),
            endpoint: endpoint.clone(),
        };

        self.loaded
            .write()
            .await
            .insert(descriptor_id.to_string(), info.clone());
        self.repo
            .update_model_status(descriptor_id, ModelStatus::Running, Some(endpoint), None)
            .await?;

        info!("Model {} loaded with canonical id {}", descriptor_id, info.id);
        Ok(info)
    }

    /// Remove the descriptor from the cache and ask the backend to unload.
    ///
    /// Idempotent: unloading a model that is not resident is a no-op, and
    /// backend-side unload failures are logged rather than raised.
    pub async fn unload(&self, descriptor_id: &str, model: &str) -> Result<()> {
        let cached = self.loaded.write().await.remove(descriptor_id);

        if let Ok(endpoint) = self.endpoint().await {
            let url = format!("{}{}", endpoint, api::paths::MODELS_UNLOAD);
            let target = cached
                .as_ref()
                .map(|m| m.requested.clone())
                .unwrap_or_else(|| model.to_string());

            match self
                .http
                .post(&url)
                .json(&LoadRequest { model: target })
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {}
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    debug!("model {} was not resident on the backend", descriptor_id);
                }
                Ok(response) => {
                    warn!("backend unload of {} returned {}", descriptor_id, response.status());
                }
                Err(e) => {
                    warn!("backend unload of {} failed: {}", descriptor_id, e);
                }
            }
        }

        if self.repo.get_model(descriptor_id).await?.is_some() {
            self.repo
                .update_model_status(descriptor_id, ModelStatus::Stopped, None, None)
                .await?;
        }
        Ok(())
    }

    /// Probe the health of a model addressed by descriptor id or alias.
    ///
    /// The probe itself may use the alias; only inference calls require the
    /// canonical loaded id. The descriptor's heartbeat is stamped either way.
    pub async fn check_health(&self, alias_or_id: &str) -> Result<HealthStatus> {
        let descriptor = self.resolve_descriptor(alias_or_id).await?;

        let endpoint = match self.endpoint().await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let status = HealthStatus::unhealthy(e.to_string());
                self.record_health(&descriptor, &status).await?;
                return Ok(status);
            }
        };

        let url = format!("{}{}", endpoint, api::paths::HEALTH);
        let result = self
            .http
            .get(&url)
            .query(&[("model", descriptor.alias.as_str())])
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        let status = match result {
            Ok(response) if response.status().is_success() => {
                let mut status = HealthStatus::healthy(endpoint);
                if let Some(loaded) = self.get_loaded(&descriptor.id).await {
                    status.status = format!("loaded as {}", loaded.id);
                }
                status
            }
            Ok(response) => HealthStatus::unhealthy(format!("probe returned {}", response.status())),
            Err(e) => HealthStatus::unhealthy(format!("probe failed: {}", e)),
        };

        self.record_health(&descriptor, &status).await?;
        Ok(status)
    }

    /// The inference client bound to the current endpoint
    pub async fn get_client(&self) -> Result<InferenceClient> {
        InferenceClient::new(self.endpoint().await?)
    }

    /// Unload all cached models and drop the backend connection
    pub async fn shutdown(&self) -> Result<()> {
        let cached: Vec<LoadedModelInfo> = self.list_loaded().await;
        info!("Shutting down orchestrator, unloading {} models", cached.len());

        for model in cached {
            if let Err(e) = self.unload(&model.descriptor_id, &model.requested).await {
                warn!("failed to unload {} during shutdown: {}", model.descriptor_id, e);
            }
        }

        *self.endpoint.write().await = None;
        Ok(())
    }

    async fn resolve_descriptor(&self, alias_or_id: &str) -> Result<ModelDescriptor> {
        let models = self.repo.list_models().await?;
        models
            .into_iter()
            .find(|m| m.id == alias_or_id || m.alias == alias_or_id)
            .ok_or_else(|| Error::not_found(format!("model {}", alias_or_id)))
    }

    async fn record_health(&self, descriptor: &ModelDescriptor, status: &HealthStatus) -> Result<()> {
        let (model_status, error) = if status.healthy {
            // A healthy probe does not flip a stopped model to running
            let model_status = match self.get_loaded(&descriptor.id).await {
                Some(_) => ModelStatus::Running,
                None => descriptor.status,
            };
            (model_status, None)
        } else {
            (ModelStatus::Error, status.error.clone())
        };

        self.repo
            .update_model_status(&descriptor.id, model_status, status.endpoint.clone(), error)
            .await
    }
}
