//! Mock inference backend with scripted per-model behavior

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bench_backend::api::{
    paths, CatalogEntry, CatalogResponse, ChatChoice, ChatCompletionRequest,
    ChatCompletionResponse, ChatMessage, HealthResponse, LoadRequest, LoadedEntry,
    LoadedListResponse, Usage,
};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Scripted behavior for one mock model
#[derive(Debug, Clone)]
pub struct MockModelBehavior {
    /// Content deltas emitted per streamed request
    pub tokens: usize,
    /// Delay before the first content delta
    pub ttft: Duration,
    /// Delay between subsequent content deltas
    pub inter_token: Duration,
    /// `usage.completion_tokens` reported on the non-streaming path
    pub completion_tokens: u64,
    /// Per-model health probes answer 503
    pub fail_health: bool,
    /// Load requests answer 500
    pub fail_load: bool,
    /// Chat completions never answer (exercises client deadlines)
    pub stall: bool,
}

impl Default for MockModelBehavior {
    fn default() -> Self {
        Self {
            tokens: 5,
            ttft: Duration::ZERO,
            inter_token: Duration::ZERO,
            completion_tokens: 5,
            fail_health: false,
            fail_load: false,
            stall: false,
        }
    }
}

impl MockModelBehavior {
    pub fn with_timing(mut self, ttft: Duration, inter_token: Duration) -> Self {
        self.ttft = ttft;
        self.inter_token = inter_token;
        self
    }

    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens = tokens;
        self.completion_tokens = tokens as u64;
        self
    }

    pub fn failing_health(mut self) -> Self {
        self.fail_health = true;
        self
    }

    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }
}

#[derive(Clone)]
struct MockState {
    inner: Arc<MockStateInner>,
}

struct MockStateInner {
    /// Behaviors keyed by any name a request may carry (alias or model id)
    behaviors: RwLock<HashMap<String, MockModelBehavior>>,
    /// requested model id -> canonical loaded id
    loaded: RwLock<HashMap<String, String>>,
    /// `model` field of every chat-completion request, in arrival order
    chat_models: RwLock<Vec<String>>,
    load_counter: AtomicUsize,
}

impl MockState {
    async fn behavior(&self, name: &str) -> MockModelBehavior {
        self.inner
            .behaviors
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

/// In-process inference backend bound to an ephemeral port
pub struct MockBackendServer {
    addr: SocketAddr,
    state: MockState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackendServer {
    /// Bind and serve on an ephemeral localhost port
    pub async fn start() -> Self {
        let state = MockState {
            inner: Arc::new(MockStateInner {
                behaviors: RwLock::new(HashMap::new()),
                loaded: RwLock::new(HashMap::new()),
                chat_models: RwLock::new(Vec::new()),
                load_counter: AtomicUsize::new(0),
            }),
        };

        let app = Router::new()
            .route(paths::HEALTH, get(health))
            .route(paths::MODELS, get(catalog))
            .route(paths::MODELS_LOADED, get(loaded_models))
            .route(paths::MODELS_LOAD, post(load_model))
            .route(paths::MODELS_UNLOAD, post(unload_model))
            .route(paths::CHAT_COMPLETIONS, post(chat_completions))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend addr");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                debug!("mock backend stopped: {}", e);
            }
        });

        Self { addr, state, handle }
    }

    /// Base URL of this backend
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Script behavior under a single name
    pub async fn set_behavior(&self, name: impl Into<String>, behavior: MockModelBehavior) {
        self.state
            .inner
            .behaviors
            .write()
            .await
            .insert(name.into(), behavior);
    }

    /// Script behavior under both an alias and a backend model id
    pub async fn register(
        &self,
        alias: impl Into<String>,
        model_id: impl Into<String>,
        behavior: MockModelBehavior,
    ) {
        let mut behaviors = self.state.inner.behaviors.write().await;
        behaviors.insert(alias.into(), behavior.clone());
        behaviors.insert(model_id.into(), behavior);
    }

    /// The `model` field of every chat-completion request seen so far
    pub async fn chat_model_ids(&self) -> Vec<String> {
        self.state.inner.chat_models.read().await.clone()
    }

    /// Currently loaded (requested, canonical) pairs
    pub async fn loaded_pairs(&self) -> Vec<(String, String)> {
        self.state
            .inner
            .loaded
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Drop for MockBackendServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(model) = params.get("model") {
        if state.behavior(model).await.fail_health {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy", "model": model})),
            )
                .into_response();
        }
    }
    Json(HealthResponse {
        status: "ok".to_string(),
    })
    .into_response()
}

async fn catalog(State(state): State<MockState>) -> Json<CatalogResponse> {
    let behaviors = state.inner.behaviors.read().await;
    let mut data: Vec<CatalogEntry> = behaviors
        .keys()
        .map(|id| CatalogEntry {
            id: id.clone(),
            object: Some("model".to_string()),
        })
        .collect();
    data.sort_by(|a, b| a.id.cmp(&b.id));
    Json(CatalogResponse { data })
}

async fn loaded_models(State(state): State<MockState>) -> Json<LoadedListResponse> {
    let loaded = state.inner.loaded.read().await;
    Json(LoadedListResponse {
        data: loaded
            .iter()
            .map(|(model, id)| LoadedEntry {
                id: id.clone(),
                model: model.clone(),
            })
            .collect(),
    })
}

async fn load_model(
    State(state): State<MockState>,
    Json(request): Json<LoadRequest>,
) -> Response {
    let behavior = state.behavior(&request.model).await;
    if behavior.fail_load {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("failed to load {}", request.model)})),
        )
            .into_response();
    }

    let mut loaded = state.inner.loaded.write().await;
    let canonical = loaded.get(&request.model).cloned().unwrap_or_else(|| {
        let n = state.inner.load_counter.fetch_add(1, Ordering::SeqCst);
        // Canonical ids deliberately differ from both alias and model id
        format!("{}::instance-{}", request.model, n)
    });
    loaded.insert(request.model.clone(), canonical.clone());

    Json(LoadedEntry {
        id: canonical,
        model: request.model,
    })
    .into_response()
}

async fn unload_model(
    State(state): State<MockState>,
    Json(request): Json<LoadRequest>,
) -> StatusCode {
    if state.inner.loaded.write().await.remove(&request.model).is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn chat_completions(
    State(state): State<MockState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    state
        .inner
        .chat_models
        .write()
        .await
        .push(request.model.clone());

    // Inference requires the canonical loaded id; anything else is not resident
    let requested = {
        let loaded = state.inner.loaded.read().await;
        loaded
            .iter()
            .find(|(_, canonical)| **canonical == request.model)
            .map(|(requested, _)| requested.clone())
    };
    let Some(requested) = requested else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("model {} is not loaded", request.model)})),
        )
            .into_response();
    };

    let behavior = state.behavior(&requested).await;
    if behavior.stall {
        // Park far past any sane deadline; the client cancels first
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    if request.stream {
        stream_response(&request.model, &behavior)
    } else {
        tokio::time::sleep(behavior.ttft).await;
        Json(ChatCompletionResponse {
            id: "chatcmpl-mock".to_string(),
            model: request.model,
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: "mock completion".to_string(),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: behavior.completion_tokens,
                total_tokens: behavior.completion_tokens + 1,
            }),
        })
        .into_response()
    }
}

fn stream_response(model: &str, behavior: &MockModelBehavior) -> Response {
    let model = model.to_string();
    let ttft = behavior.ttft;
    let inter_token = behavior.inter_token;

    let chunks: Vec<(Duration, String)> = (0..behavior.tokens)
        .map(|i| {
            let delay = if i == 0 { ttft } else { inter_token };
            let data = json!({
                "id": "chatcmpl-mock",
                "model": model,
                "choices": [{
                    "index": 0,
                    "delta": {"content": format!("tok{} ", i)},
                    "finish_reason": null
                }]
            })
            .to_string();
            (delay, data)
        })
        .collect();

    let stream = futures::stream::iter(chunks)
        .then(|(delay, data)| async move {
            tokio::time::sleep(delay).await;
            Ok::<Event, Infallible>(Event::default().data(data))
        })
        .chain(futures::stream::once(async {
            Ok(Event::default().data("[DONE]"))
        }));

    Sse::new(stream).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_and_per_model_probe() {
        let server = MockBackendServer::start().await;
        server
            .set_behavior("bad", MockModelBehavior::default().failing_health())
            .await;

        let client = reqwest::Client::new();
        let ok = client
            .get(format!("{}{}", server.url(), paths::HEALTH))
            .send()
            .await
            .unwrap();
        assert!(ok.status().is_success());

        let bad = client
            .get(format!("{}{}?model=bad", server.url(), paths::HEALTH))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_load_assigns_distinct_canonical_id() {
        let server = MockBackendServer::start().await;
        let client = reqwest::Client::new();

        let entry: LoadedEntry = client
            .post(format!("{}{}", server.url(), paths::MODELS_LOAD))
            .json(&LoadRequest {
                model: "llama-3.2-1b".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(entry.model, "llama-3.2-1b");
        assert_ne!(entry.id, entry.model);

        // Loading again returns the same canonical id
        let again: LoadedEntry = client
            .post(format!("{}{}", server.url(), paths::MODELS_LOAD))
            .json(&LoadRequest {
                model: "llama-3.2-1b".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again.id, entry.id);
    }

    #[tokio::test]
    async fn test_unload_is_idempotent_via_404() {
        let server = MockBackendServer::start().await;
        let client = reqwest::Client::new();

        let status = client
            .post(format!("{}{}", server.url(), paths::MODELS_UNLOAD))
            .json(&LoadRequest {
                model: "never-loaded".to_string(),
            })
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_requires_canonical_id() {
        let server = MockBackendServer::start().await;
        let client = reqwest::Client::new();

        let entry: LoadedEntry = client
            .post(format!("{}{}", server.url(), paths::MODELS_LOAD))
            .json(&LoadRequest {
                model: "m".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        // The raw model id is rejected
        let by_alias = client
            .post(format!("{}{}", server.url(), paths::CHAT_COMPLETIONS))
            .json(&serde_json::json!({"model": "m", "messages": [], "stream": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(by_alias.status(), StatusCode::NOT_FOUND);

        // The canonical id answers
        let by_canonical = client
            .post(format!("{}{}", server.url(), paths::CHAT_COMPLETIONS))
            .json(&serde_json::json!({"model": entry.id, "messages": [], "stream": false}))
            .send()
            .await
            .unwrap();
        assert!(by_canonical.status().is_success());

        assert_eq!(server.chat_model_ids().await, vec!["m".to_string(), entry.id]);
    }
}
