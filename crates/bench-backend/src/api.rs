//! Wire types for the OpenAI-compatible backend surface
//!
//! Responses are decoded permissively: fields the engine does not need are
//! defaulted rather than rejected, since backends differ in how much of the
//! OpenAI schema they fill in.

use serde::{Deserialize, Serialize};

/// Backend endpoint paths
pub mod paths {
    /// Backend liveness probe; accepts an optional `model` query parameter
    /// for a per-model health check
    pub const HEALTH: &str = "/api/v1/health";
    /// Catalog of models the backend can load
    pub const MODELS: &str = "/api/v1/models";
    /// Models currently resident in memory
    pub const MODELS_LOADED: &str = "/api/v1/models/loaded";
    /// Load a model into memory
    pub const MODELS_LOAD: &str = "/api/v1/models/load";
    /// Unload a model
    pub const MODELS_UNLOAD: &str = "/api/v1/models/unload";
    /// OpenAI-compatible chat completion (JSON or SSE stream)
    pub const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One choice in a non-streaming completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Non-streaming chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Incremental content in a streamed chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice in a streamed chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One server-sent event of a streamed completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The content delta of the first choice, if any
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// Catalog entry as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
}

/// Catalog listing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub data: Vec<CatalogEntry>,
}

/// One loaded model as reported by the backend.
///
/// `id` is the canonical backend-side identifier required on inference calls;
/// `model` echoes the identifier submitted to the load request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedEntry {
    pub id: String,
    pub model: String,
}

/// Loaded-model listing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedListResponse {
    pub data: Vec<LoadedEntry>,
}

/// Load/unload request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub model: String,
}

/// Backend health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_skips_absent_fields() {
        let request = ChatCompletionRequest {
            model: "canonical-1".to_string(),
            messages: vec![ChatMessage::user("Hi")],
            max_tokens: None,
            temperature: None,
            stream: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("temperature"));
        assert!(json.contains("\"stream\":true"));
    }

    #[test]
    fn test_response_decoding_is_permissive() {
        // Minimal body without id/model/usage still decodes
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, "hello");
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_chunk_content_extraction() {
        let json = r#"{"choices": [{"delta": {"content": "tok"}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.content(), Some("tok"));

        let json = r#"{"choices": [{"delta": {"role": "assistant"}, "finish_reason": null}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn test_usage_defaults() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens": 7}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 0);
    }
}
