//! Error handling for tokenbench
//!
//! Provides a unified error type and result type for use across all tokenbench
//! components.

/// Result type alias for tokenbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for tokenbench
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing required field or out-of-range configuration
    #[error("Bad input: {0}")]
    BadInput(String),

    /// Referenced model, run, or suite does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The inference backend cannot be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend rejected a model load request
    #[error("Model load failed: {0}")]
    LoadFailed(String),

    /// A health probe against a model failed
    #[error("Model unhealthy: {0}")]
    ModelUnhealthy(String),

    /// No loaded-model record could be resolved for a scenario
    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    /// An operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A single inference request failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Unexpected failure inside the run coordinator
    #[error("Coordinator failure: {0}")]
    Coordinator(String),

    /// Durable storage failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors (suite files)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a bad input error
    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a load failed error
    pub fn load_failed(msg: impl Into<String>) -> Self {
        Self::LoadFailed(msg.into())
    }

    /// Create a model unhealthy error
    pub fn model_unhealthy(msg: impl Into<String>) -> Self {
        Self::ModelUnhealthy(msg.into())
    }

    /// Create a model not ready error
    pub fn model_not_ready(msg: impl Into<String>) -> Self {
        Self::ModelNotReady(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a coordinator failure
    pub fn coordinator(msg: impl Into<String>) -> Self {
        Self::Coordinator(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this error indicates a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error indicates a client-side problem
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::BadInput(_) | Error::NotFound(_))
    }

    /// Check if this error is worth surfacing in the audit log at `error` level.
    ///
    /// Bad input is surfaced to the caller immediately and never logged as an
    /// error; everything else is.
    pub fn is_loggable(&self) -> bool {
        !matches!(self, Error::BadInput(_))
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::BadInput(_) => "bad_input",
            Error::NotFound(_) => "not_found",
            Error::BackendUnavailable(_) => "backend_unavailable",
            Error::LoadFailed(_) => "load_failed",
            Error::ModelUnhealthy(_) => "model_unhealthy",
            Error::ModelNotReady(_) => "model_not_ready",
            Error::Timeout(_) => "timeout",
            Error::Inference(_) => "inference",
            Error::Coordinator(_) => "coordinator",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Other(_) => "other",
        }
    }

    /// Convert to HTTP status code (useful for REST bindings)
    pub fn to_http_status(&self) -> u16 {
        match self {
            Error::BadInput(_) => 400,                            // Bad Request
            Error::NotFound(_) => 404,                            // Not Found
            Error::Timeout(_) => 408,                             // Request Timeout
            Error::BackendUnavailable(_) => 502,                  // Bad Gateway
            Error::LoadFailed(_) | Error::ModelUnhealthy(_) => 503, // Service Unavailable
            _ => 500,                                             // Internal Server Error
        }
    }
}
