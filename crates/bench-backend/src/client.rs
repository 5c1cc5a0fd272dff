//! Measured chat-completion client
//!
//! One [`InferenceClient::infer`] call is one benchmark iteration: it issues a
//! single chat completion and reports token-level timing. Failures are
//! captured into the returned [`IterationRecord`] rather than raised, so the
//! scenario runner can account for them without unwinding.

use crate::api::{
    self, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
};
use bench_core::types::IterationRecord;
use bench_core::{Error, Result};
use futures::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Prefix of the error string recorded when an iteration hits its deadline
pub const TIMEOUT_SENTINEL: &str = "inference timed out";

/// Parameters for one measured inference call
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Canonical backend-side model identifier (from `LoadedModelInfo.id`)
    pub model: String,
    /// Sent as the user message
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Wall-clock budget; expiry cancels the request
    pub timeout: Duration,
    /// Request an SSE stream and derive TTFT/inter-token delays
    pub streaming: bool,
}

/// What a single request observed before completing
#[derive(Debug, Default)]
struct Observation {
    ttft_ms: Option<f64>,
    tokens: u64,
    inter_token_delays_ms: Vec<f64>,
}

/// Thin client bound to one backend endpoint
#[derive(Debug, Clone)]
pub struct InferenceClient {
    endpoint: String,
    http: reqwest::Client,
}

impl InferenceClient {
    /// Create a client for `endpoint`. The client carries no request timeout
    /// of its own; every call gets an explicit deadline instead.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::backend_unavailable(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    /// The endpoint this client is bound to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one inference iteration and measure it.
    ///
    /// `latency_ms` is stamped on every exit path; a deadline expiry cancels
    /// the in-flight request and marks the record as a timeout.
    pub async fn infer(&self, request: &InferenceRequest) -> IterationRecord {
        let send_time = Instant::now();

        let outcome = tokio::time::timeout(request.timeout, async {
            if request.streaming {
                self.run_streaming(request, send_time).await
            } else {
                self.run_blocking(request).await
            }
        })
        .await;

        let latency_ms = send_time.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(observation)) => {
                trace!(
                    tokens = observation.tokens,
                    latency_ms,
                    "inference iteration succeeded"
                );
                IterationRecord {
                    latency_ms,
                    ttft_ms: observation.ttft_ms,
                    tokens: observation.tokens,
                    inter_token_delays_ms: observation.inter_token_delays_ms,
                    error: None,
                    timeout: false,
                    resources_before: Default::default(),
                    resources_after: Default::default(),
                }
            }
            Ok(Err(e)) => {
                debug!("inference iteration failed: {}", e);
                IterationRecord {
                    latency_ms,
                    ttft_ms: None,
                    tokens: 0,
                    inter_token_delays_ms: Vec::new(),
                    error: Some(e.to_string()),
                    timeout: false,
                    resources_before: Default::default(),
                    resources_after: Default::default(),
                }
            }
            Err(_elapsed) => {
                debug!(timeout_ms = request.timeout.as_millis() as u64, "inference iteration timed out");
                IterationRecord {
                    latency_ms,
                    ttft_ms: None,
                    tokens: 0,
                    inter_token_delays_ms: Vec::new(),
                    error: Some(format!(
                        "{} after {}ms",
                        TIMEOUT_SENTINEL,
                        request.timeout.as_millis()
                    )),
                    timeout: true,
                    resources_before: Default::default(),
                    resources_after: Default::default(),
                }
            }
        }
    }

    fn chat_url(&self) -> String {
        format!("{}{}", self.endpoint, api::paths::CHAT_COMPLETIONS)
    }

    fn body(&self, request: &InferenceRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage::user(&request.prompt)],
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            stream,
        }
    }

    /// Single-response completion; tokens come from the backend's usage report
    async fn run_blocking(&self, request: &InferenceRequest) -> Result<Observation> {
        let response = self
            .http
            .post(self.chat_url())
            .json(&self.body(request, false))
            .send()
            .await
            .map_err(|e| Error::inference(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::inference(format!("backend returned {}: {}", status, text)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::inference(format!("invalid completion response: {}", e)))?;

        Ok(Observation {
            ttft_ms: None,
            tokens: completion.usage.map(|u| u.completion_tokens).unwrap_or(0),
            inter_token_delays_ms: Vec::new(),
        })
    }

    /// Streamed completion; timing is stamped in the read loop, at the moment
    /// each content delta is surfaced
    async fn run_streaming(
        &self,
        request: &InferenceRequest,
        send_time: Instant,
    ) -> Result<Observation> {
        let builder = self.http.post(self.chat_url()).json(&self.body(request, true));
        let mut stream = EventSource::new(builder)
            .map_err(|e| Error::inference(format!("failed to open stream: {}", e)))?;

        let mut observation = Observation::default();
        let mut last_token_at: Option<Instant> = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        break;
                    }
                    let chunk: ChatCompletionChunk =
                        serde_json::from_str(&message.data).map_err(|e| {
                            stream.close();
                            Error::inference(format!("malformed stream chunk: {}", e))
                        })?;

                    let content = chunk.content().unwrap_or("");
                    if content.is_empty() {
                        continue;
                    }

                    let now = Instant::now();
                    match last_token_at {
                        None => {
                            observation.ttft_ms =
                                Some(now.duration_since(send_time).as_secs_f64() * 1000.0);
                        }
                        Some(previous) => {
                            observation
                                .inter_token_delays_ms
                                .push(now.duration_since(previous).as_secs_f64() * 1000.0);
                        }
                    }
                    last_token_at = Some(now);
                    observation.tokens += 1;
                }
                Err(SseError::StreamEnded) => break,
                Err(e) => {
                    stream.close();
                    return Err(Error::inference(format!("stream error: {}", e)));
                }
            }
        }

        stream.close();
        Ok(observation)
    }
}
